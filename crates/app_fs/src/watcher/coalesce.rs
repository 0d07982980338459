//! Per-path coalescing of raw notify events
//!
//! Raw events are classified into added/updated/deleted and merged per path:
//!
//! | earlier | later            | result  |
//! |---------|------------------|---------|
//! | Added   | Updated, Added   | Added   |
//! | Added   | Deleted          | dropped |
//! | Updated | Deleted          | Deleted |
//! | Updated | Added, Updated   | Updated |
//! | Deleted | Added, Updated   | Updated |
//! | Deleted | Deleted          | Deleted |
//!
//! A path keeps the position where it was first seen, so a new directory is
//! reported before anything inside it.

use super::{ChangeKind, FileChange, FileChangesEvent};
use crate::Uri;
use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// Accumulates changes for one batch
#[derive(Debug)]
pub struct ChangeCoalescer {
    root: PathBuf,
    entries: Vec<Option<(PathBuf, ChangeKind)>>,
    index: HashMap<PathBuf, usize>,
    first_at: Option<Instant>,
    last_at: Option<Instant>,
    hold_until: Option<Instant>,
}

impl ChangeCoalescer {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            entries: Vec::new(),
            index: HashMap::new(),
            first_at: None,
            last_at: None,
            hold_until: None,
        }
    }

    /// Is a batch in progress?
    pub fn is_pending(&self) -> bool {
        self.first_at.is_some()
    }

    /// Number of paths currently carrying a change
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Classify a raw notify event and merge it into the batch
    pub fn push_event(&mut self, event: notify::Event, now: Instant) {
        match event.kind {
            EventKind::Access(_) => {}
            EventKind::Create(_) => {
                for path in event.paths {
                    self.push_created(path, now);
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    self.push(path, ChangeKind::Deleted, now);
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => {
                    for path in event.paths {
                        self.push(path, ChangeKind::Deleted, now);
                    }
                }
                RenameMode::To => {
                    for path in event.paths {
                        self.push_created(path, now);
                    }
                }
                RenameMode::Both => {
                    let mut paths = event.paths.into_iter();
                    if let Some(from) = paths.next() {
                        self.push(from, ChangeKind::Deleted, now);
                    }
                    for to in paths {
                        self.push_created(to, now);
                    }
                }
                // Backends without rename detail: look at the disk
                RenameMode::Any | RenameMode::Other => {
                    for path in event.paths {
                        if exists(&path) {
                            self.push_created(path, now);
                        } else {
                            self.push(path, ChangeKind::Deleted, now);
                        }
                    }
                }
            },
            EventKind::Modify(_) => {
                for path in event.paths {
                    self.push(path, ChangeKind::Updated, now);
                }
            }
            EventKind::Any | EventKind::Other => {
                for path in event.paths {
                    let kind = if exists(&path) {
                        ChangeKind::Updated
                    } else {
                        ChangeKind::Deleted
                    };
                    self.push(path, kind, now);
                }
            }
        }
    }

    /// Merge a single classified change
    pub fn push(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        if path == self.root || !path.starts_with(&self.root) {
            return;
        }

        self.first_at.get_or_insert(now);
        self.last_at = Some(now);

        match self.index.get(&path).copied() {
            Some(i) => {
                let Some(previous) = self.entries[i].as_ref().map(|(_, kind)| *kind) else {
                    return;
                };
                match merge(previous, kind) {
                    Some(merged) => {
                        if let Some(entry) = self.entries[i].as_mut() {
                            entry.1 = merged;
                        }
                    }
                    None => {
                        self.entries[i] = None;
                        self.index.remove(&path);
                    }
                }
            }
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push(Some((path, kind)));
            }
        }
    }

    /// A new entry appeared; directories also report what is already inside
    fn push_created(&mut self, path: PathBuf, now: Instant) {
        let is_dir = path.is_dir();
        self.push(path.clone(), ChangeKind::Added, now);

        if is_dir {
            for entry in WalkDir::new(&path)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                self.push(entry.into_path(), ChangeKind::Added, now);
            }
        }
    }

    /// When the batch should be flushed
    ///
    /// `window` after the most recent change, but no later than `max_delay`
    /// after the first one, and never before a deferral expires.
    pub fn flush_deadline(&self, window: Duration, max_delay: Duration) -> Option<Instant> {
        let first = self.first_at?;
        let last = self.last_at.unwrap_or(first);

        let deadline = (last + window).min(first + max_delay);
        Some(match self.hold_until {
            Some(hold) => deadline.max(hold),
            None => deadline,
        })
    }

    /// Postpone the flush (the delivery queue is full)
    pub fn defer(&mut self, until: Instant) {
        self.hold_until = Some(until);
    }

    /// Take the accumulated batch, reconciled with the current disk state
    pub fn drain(&mut self) -> FileChangesEvent {
        self.index.clear();
        self.first_at = None;
        self.last_at = None;
        self.hold_until = None;

        let changes = self
            .entries
            .drain(..)
            .flatten()
            .filter_map(|(path, kind)| {
                let kind = match (kind, exists(&path)) {
                    (ChangeKind::Added, false) => return None,
                    (ChangeKind::Updated, false) => ChangeKind::Deleted,
                    (ChangeKind::Deleted, true) => ChangeKind::Updated,
                    (kind, _) => kind,
                };

                match Uri::from_file_path(&path) {
                    Ok(uri) => Some(FileChange { uri, kind }),
                    Err(e) => {
                        tracing::warn!("Dropping change for {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();

        FileChangesEvent { changes }
    }
}

fn merge(previous: ChangeKind, next: ChangeKind) -> Option<ChangeKind> {
    use ChangeKind::*;

    match (previous, next) {
        (Added, Deleted) => None,
        (Added, _) => Some(Added),
        (Updated, Deleted) => Some(Deleted),
        (Updated, _) => Some(Updated),
        (Deleted, Deleted) => Some(Deleted),
        (Deleted, _) => Some(Updated),
    }
}

fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use notify::Event;
    use std::fs;
    use tempfile::TempDir;

    fn kinds(event: &FileChangesEvent, root: &Path) -> Vec<(String, ChangeKind)> {
        let root = Uri::from_file_path(root).unwrap();
        event
            .changes
            .iter()
            .map(|c| (root.relative(&c.uri).unwrap(), c.kind))
            .collect()
    }

    #[test]
    fn test_create_then_modify_is_one_add() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"x").unwrap();

        let now = Instant::now();
        let mut coalescer = ChangeCoalescer::new(dir.path());
        coalescer.push_event(Event::new(EventKind::Create(CreateKind::File)).add_path(file.clone()), now);
        coalescer.push_event(
            Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(file.clone()),
            now,
        );
        coalescer.push_event(
            Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(file),
            now,
        );

        let event = coalescer.drain();
        assert_eq!(kinds(&event, dir.path()), vec![("a.txt".to_string(), ChangeKind::Added)]);
    }

    #[test]
    fn test_create_then_delete_is_nothing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("gone.txt");

        let now = Instant::now();
        let mut coalescer = ChangeCoalescer::new(dir.path());
        coalescer.push(file.clone(), ChangeKind::Added, now);
        coalescer.push(file, ChangeKind::Deleted, now);

        assert!(coalescer.is_empty());
        assert!(coalescer.is_pending());
        assert!(coalescer.drain().changes.is_empty());
        assert!(!coalescer.is_pending());
    }

    #[test]
    fn test_delete_then_create_is_update() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"x").unwrap();

        let now = Instant::now();
        let mut coalescer = ChangeCoalescer::new(dir.path());
        coalescer.push(file.clone(), ChangeKind::Deleted, now);
        coalescer.push(file, ChangeKind::Added, now);

        let event = coalescer.drain();
        assert_eq!(kinds(&event, dir.path()), vec![("a.txt".to_string(), ChangeKind::Updated)]);
    }

    #[test]
    fn test_modify_then_delete_is_delete() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");

        let now = Instant::now();
        let mut coalescer = ChangeCoalescer::new(dir.path());
        coalescer.push(file.clone(), ChangeKind::Updated, now);
        coalescer.push_event(Event::new(EventKind::Remove(RemoveKind::File)).add_path(file), now);

        let event = coalescer.drain();
        assert_eq!(kinds(&event, dir.path()), vec![("a.txt".to_string(), ChangeKind::Deleted)]);
    }

    #[test]
    fn test_new_directory_reports_contents_parent_first() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("foo/bar")).unwrap();
        fs::write(dir.path().join("foo/bar/baz.txt"), b"x").unwrap();

        let now = Instant::now();
        let mut coalescer = ChangeCoalescer::new(dir.path());
        coalescer.push_event(
            Event::new(EventKind::Create(CreateKind::Folder)).add_path(dir.path().join("foo")),
            now,
        );
        // The OS may still report the children afterwards
        coalescer.push_event(
            Event::new(EventKind::Create(CreateKind::File)).add_path(dir.path().join("foo/bar/baz.txt")),
            now,
        );

        let event = coalescer.drain();
        assert_eq!(
            kinds(&event, dir.path()),
            vec![
                ("foo".to_string(), ChangeKind::Added),
                ("foo/bar".to_string(), ChangeKind::Added),
                ("foo/bar/baz.txt".to_string(), ChangeKind::Added),
            ]
        );
    }

    #[test]
    fn test_rename_pair() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("old.txt");
        let to = dir.path().join("new.txt");
        fs::write(&to, b"x").unwrap();

        let mut coalescer = ChangeCoalescer::new(dir.path());
        coalescer.push_event(
            Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
                .add_path(from)
                .add_path(to),
            Instant::now(),
        );

        let event = coalescer.drain();
        assert_eq!(
            kinds(&event, dir.path()),
            vec![
                ("old.txt".to_string(), ChangeKind::Deleted),
                ("new.txt".to_string(), ChangeKind::Added),
            ]
        );
    }

    #[test]
    fn test_ignores_root_access_and_outside_paths() {
        let dir = TempDir::new().unwrap();
        let mut coalescer = ChangeCoalescer::new(dir.path());
        let now = Instant::now();

        coalescer.push(dir.path().to_path_buf(), ChangeKind::Updated, now);
        coalescer.push(PathBuf::from("/definitely/elsewhere"), ChangeKind::Added, now);
        coalescer.push_event(
            Event::new(EventKind::Access(notify::event::AccessKind::Any)).add_path(dir.path().join("a")),
            now,
        );

        assert!(!coalescer.is_pending());
        assert!(coalescer.flush_deadline(Duration::from_millis(10), Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_flush_deadline() {
        let dir = TempDir::new().unwrap();
        let mut coalescer = ChangeCoalescer::new(dir.path());
        let window = Duration::from_millis(200);
        let max_delay = Duration::from_millis(500);

        let start = Instant::now();
        coalescer.push(dir.path().join("a"), ChangeKind::Updated, start);
        assert_eq!(coalescer.flush_deadline(window, max_delay), Some(start + window));

        let later = start + Duration::from_millis(400);
        coalescer.push(dir.path().join("b"), ChangeKind::Updated, later);
        assert_eq!(coalescer.flush_deadline(window, max_delay), Some(start + max_delay));

        let hold = start + Duration::from_secs(2);
        coalescer.defer(hold);
        assert_eq!(coalescer.flush_deadline(window, max_delay), Some(hold));
    }
}
