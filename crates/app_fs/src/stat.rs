//! Stat snapshots of workspace entries

use crate::{FsError, Result, Uri};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Metadata snapshot of one file system entry
///
/// `has_children` and `children` are only ever present on directories;
/// `size` only on files. Children never carry nested children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    pub uri: Uri,

    /// Last modified timestamp (Unix epoch millis)
    pub last_modification: i64,

    pub is_directory: bool,

    /// File size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_children: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Stat>>,
}

impl Stat {
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// Compare the fields guarded by optimistic concurrency
    pub fn is_in_sync_with(&self, live: &Stat) -> bool {
        self.size == live.size && self.last_modification == live.last_modification
    }
}

/// Decoded text of a file together with its stat at read time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub stat: Stat,
    pub content: String,
}

/// Does this error mean "nothing at that path"?
pub(crate) fn is_missing(err: &std::io::Error) -> bool {
    // ENOTDIR: an ancestor is a regular file
    err.kind() == std::io::ErrorKind::NotFound || (cfg!(unix) && err.raw_os_error() == Some(20))
}

pub(crate) fn map_io(err: std::io::Error, uri: &Uri) -> FsError {
    if is_missing(&err) {
        FsError::NotFound(uri.clone())
    } else {
        FsError::Io(err)
    }
}

/// Build a stat for the entry at `uri`
pub fn stat(uri: &Uri, expand: bool) -> Result<Stat> {
    let path = uri.to_file_path()?;
    stat_path(&path, uri, expand)
}

/// Build a stat for `path`, expanding one level of children if requested
pub(crate) fn stat_path(path: &Path, uri: &Uri, expand: bool) -> Result<Stat> {
    let metadata = fs::metadata(path).map_err(|e| map_io(e, uri))?;

    let last_modification = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();

    if !metadata.is_dir() {
        return Ok(Stat {
            uri: uri.clone(),
            last_modification,
            is_directory: false,
            size: Some(metadata.len()),
            has_children: None,
            children: None,
        });
    }

    let (has_children, children) = if expand {
        let mut entries = fs::read_dir(path).map_err(|e| map_io(e, uri))?;
        let children = list_children(path, &mut entries)?;
        (!children.is_empty(), Some(children))
    } else {
        match fs::read_dir(path) {
            Ok(mut entries) => (entries.next().is_some(), None),
            // Metadata is still readable; report the directory as empty
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                tracing::warn!("Cannot list {}: {}", path.display(), e);
                (false, None)
            }
            Err(e) => return Err(map_io(e, uri)),
        }
    };

    Ok(Stat {
        uri: uri.clone(),
        last_modification,
        is_directory: true,
        size: None,
        has_children: Some(has_children),
        children,
    })
}

fn list_children(dir: &Path, entries: &mut fs::ReadDir) -> Result<Vec<Stat>> {
    let mut children = Vec::new();

    for entry in entries {
        let entry = entry?;
        let child_path = entry.path();
        let child_uri = Uri::from_file_path(&child_path)?;

        match stat_path(&child_path, &child_uri, false) {
            Ok(stat) => children.push((entry.file_name().to_string_lossy().to_string(), stat)),
            Err(FsError::NotFound(_)) => {
                // Removed while listing, or a dangling symlink
                tracing::debug!("Skipping vanished entry: {}", child_path.display());
            }
            Err(e) => return Err(e),
        }
    }

    children.sort_by(|(a, _), (b, _)| natural_sort_key(a).cmp(&natural_sort_key(b)));
    tracing::debug!("Listed {} children of {}", children.len(), dir.display());

    Ok(children.into_iter().map(|(_, stat)| stat).collect())
}

/// Generate a natural sort key (handles numbers correctly)
/// "image2.jpg" < "image10.jpg"
fn natural_sort_key(s: &str) -> Vec<NaturalSortPart> {
    let mut parts = Vec::new();
    let mut current_num = String::new();
    let mut current_str = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            if !current_str.is_empty() {
                parts.push(NaturalSortPart::Str(current_str.to_lowercase()));
                current_str.clear();
            }
            current_num.push(c);
        } else {
            if !current_num.is_empty() {
                if let Ok(n) = current_num.parse::<u64>() {
                    parts.push(NaturalSortPart::Num(n));
                }
                current_num.clear();
            }
            current_str.push(c);
        }
    }

    if !current_num.is_empty() {
        if let Ok(n) = current_num.parse::<u64>() {
            parts.push(NaturalSortPart::Num(n));
        }
    }
    if !current_str.is_empty() {
        parts.push(NaturalSortPart::Str(current_str.to_lowercase()));
    }

    parts
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NaturalSortPart {
    Num(u64),
    Str(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn uri_of(path: &Path) -> Uri {
        Uri::from_file_path(path).unwrap()
    }

    #[test]
    fn test_natural_sort() {
        let mut names = vec!["image10.jpg", "image2.jpg", "image1.jpg", "image20.jpg"];
        names.sort_by(|a, b| natural_sort_key(a).cmp(&natural_sort_key(b)));
        assert_eq!(names, vec!["image1.jpg", "image2.jpg", "image10.jpg", "image20.jpg"]);
    }

    #[test]
    fn test_file_stat() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();

        let stat = stat_path(&file, &uri_of(&file), true).unwrap();
        assert!(!stat.is_directory);
        assert_eq!(stat.size, Some(5));
        assert!(stat.has_children.is_none());
        assert!(stat.children.is_none());
        assert!(stat.last_modification > 0);
    }

    #[test]
    fn test_directory_without_expansion() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let stat = stat_path(dir.path(), &uri_of(dir.path()), false).unwrap();
        assert!(stat.is_directory);
        assert!(stat.size.is_none());
        assert_eq!(stat.has_children, Some(true));
        assert!(stat.children.is_none());
    }

    #[test]
    fn test_expansion_is_one_level_deep() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub/nested")).unwrap();
        fs::write(dir.path().join("file10.txt"), b"x").unwrap();
        fs::write(dir.path().join("file2.txt"), b"y").unwrap();

        let stat = stat_path(dir.path(), &uri_of(dir.path()), true).unwrap();
        let children = stat.children.unwrap();
        let names: Vec<_> = children.iter().filter_map(|c| c.uri.file_name()).collect();
        assert_eq!(names, vec!["file2.txt", "file10.txt", "sub"]);

        let sub = &children[2];
        assert!(sub.is_directory);
        assert_eq!(sub.has_children, Some(true));
        assert!(sub.children.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_child_does_not_break_listing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("secret.txt"), b"x").unwrap();
        fs::write(dir.path().join("open.txt"), b"y").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users read through permission bits
        let privileged = fs::read_dir(&locked).is_ok();

        let result = stat_path(dir.path(), &uri_of(dir.path()), true);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let stat = result.unwrap();
        let children = stat.children.unwrap();
        assert_eq!(children.len(), 2);

        let locked_stat = &children[0];
        assert_eq!(locked_stat.uri.file_name().as_deref(), Some("locked"));
        assert!(locked_stat.is_directory);
        assert_eq!(locked_stat.has_children, Some(privileged));
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let stat = stat_path(dir.path(), &uri_of(dir.path()), true).unwrap();
        assert_eq!(stat.has_children, Some(false));
        assert_eq!(stat.children, Some(vec![]));
    }

    #[test]
    fn test_missing_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            stat_path(&missing, &uri_of(&missing), false),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_serialized_shape() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"abc").unwrap();

        let json = serde_json::to_value(stat_path(&file, &uri_of(&file), false).unwrap()).unwrap();
        assert_eq!(json["isDirectory"], false);
        assert_eq!(json["size"], 3);
        assert!(json.get("hasChildren").is_none());
        assert!(json.get("children").is_none());
    }
}
