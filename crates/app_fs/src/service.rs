//! Async façade over one workspace root

use crate::content::ContentStore;
use crate::stat::{is_missing, stat_path};
use crate::tree::{self, MoveOptions};
use crate::watcher::{FileChangeClient, FileWatcher, WatchState, WatcherOptions};
use crate::{FileContent, FsError, Result, Stat, Uri};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// Default WHATWG encoding label for reads and writes
    pub encoding: String,
    pub watcher: WatcherOptions,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
            watcher: WatcherOptions::default(),
        }
    }
}

/// The active subscription; its dispatcher thread owns the client
#[derive(Default)]
struct ClientSlot {
    watcher: Option<FileWatcher>,
}

/// File system access scoped to a workspace root
///
/// Every file operation runs on tokio's blocking pool. Change notifications
/// for the root are sent to at most one registered client.
pub struct FileSystemService {
    root: Uri,
    root_path: PathBuf,
    store: ContentStore,
    options: ServiceOptions,
    slot: Mutex<ClientSlot>,
    disposed: AtomicBool,
}

impl FileSystemService {
    /// Open a service on an existing directory
    pub fn new<P: AsRef<Path>>(root: P, options: ServiceOptions) -> Result<Self> {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };

        let root_path = std::fs::canonicalize(&absolute).map_err(|e| {
            if is_missing(&e) {
                match Uri::from_file_path(&absolute) {
                    Ok(uri) => FsError::NotFound(uri),
                    Err(err) => err,
                }
            } else {
                FsError::Io(e)
            }
        })?;

        let root_uri = Uri::from_file_path(&root_path)?;
        if !root_path.is_dir() {
            return Err(FsError::NotADirectory(root_uri));
        }

        let store = ContentStore::new(&options.encoding)?;

        tracing::info!("Workspace root: {}", root_uri);

        Ok(Self {
            root: root_uri,
            root_path,
            store,
            options,
            slot: Mutex::new(ClientSlot::default()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Uri {
        &self.root
    }

    pub async fn get_file_stat(&self, uri: &Uri, expand: bool) -> Result<Stat> {
        let uri = uri.clone();
        blocking(move || crate::stat::stat(&uri, expand)).await
    }

    pub async fn resolve_content(&self, uri: &Uri, encoding: Option<&str>) -> Result<FileContent> {
        let store = self.store.clone();
        let uri = uri.clone();
        let encoding = encoding.map(str::to_string);
        blocking(move || store.resolve_content(&uri, encoding.as_deref())).await
    }

    pub async fn set_content(&self, stat: &Stat, content: &str, encoding: Option<&str>) -> Result<Stat> {
        let store = self.store.clone();
        let stat = stat.clone();
        let content = content.to_string();
        let encoding = encoding.map(str::to_string);
        blocking(move || store.set_content(&stat, &content, encoding.as_deref())).await
    }

    pub async fn move_entry(&self, source: &Uri, target: &Uri, overwrite: bool) -> Result<Stat> {
        let source = source.clone();
        let target = target.clone();
        blocking(move || tree::move_entry(&source, &target, MoveOptions { overwrite })).await
    }

    pub async fn copy(&self, source: &Uri, target: &Uri) -> Result<Stat> {
        let source = source.clone();
        let target = target.clone();
        blocking(move || tree::copy(&source, &target)).await
    }

    /// Stat of the root with its children
    pub async fn get_workspace_root(&self) -> Result<Stat> {
        let root = self.root.clone();
        let path = self.root_path.clone();
        blocking(move || {
            let stat = stat_path(&path, &root, true)?;
            if !stat.is_directory {
                return Err(FsError::NotADirectory(root));
            }
            Ok(stat)
        })
        .await
    }

    pub async fn create_file(
        &self,
        uri: &Uri,
        content: Option<&str>,
        encoding: Option<&str>,
    ) -> Result<Stat> {
        let store = self.store.clone();
        let uri = uri.clone();
        let content = content.map(str::to_string);
        let encoding = encoding.map(str::to_string);
        blocking(move || tree::create_file(&uri, content.as_deref(), encoding.as_deref(), &store)).await
    }

    pub async fn create_folder(&self, uri: &Uri) -> Result<Stat> {
        let uri = uri.clone();
        blocking(move || tree::create_folder(&uri)).await
    }

    pub async fn touch_file(&self, uri: &Uri) -> Result<Stat> {
        let store = self.store.clone();
        let uri = uri.clone();
        blocking(move || tree::touch_file(&uri, &store)).await
    }

    pub async fn delete(&self, uri: &Uri) -> Result<()> {
        let uri = uri.clone();
        blocking(move || tree::delete(&uri)).await
    }

    /// Detected encoding name of a file
    pub async fn get_encoding(&self, uri: &Uri) -> Result<String> {
        let store = self.store.clone();
        let uri = uri.clone();
        blocking(move || store.get_encoding(&uri)).await
    }

    /// Replace the change client
    ///
    /// Any previous subscription is stopped first. `None` leaves the service
    /// idle; `Some` starts watching the root recursively.
    pub fn set_client(&self, client: Option<Arc<dyn FileChangeClient>>) -> Result<()> {
        let mut slot = self.slot.lock();

        if let Some(mut watcher) = slot.watcher.take() {
            watcher.stop();
        }

        let Some(client) = client else {
            tracing::debug!("Change client cleared");
            return Ok(());
        };

        if self.disposed.load(Ordering::SeqCst) {
            return Err(FsError::WatchFailure("service disposed".to_string()));
        }

        slot.watcher = Some(FileWatcher::start(&self.root_path, client, self.options.watcher.clone())?);
        Ok(())
    }

    /// Is a client registered with a live watch?
    pub fn has_client(&self) -> bool {
        self.watch_state() == WatchState::Watching
    }

    pub fn watch_state(&self) -> WatchState {
        self.slot
            .lock()
            .watcher
            .as_ref()
            .map(|w| w.state())
            .unwrap_or(WatchState::Idle)
    }

    /// Stop watching and release the client
    ///
    /// No notification is delivered once this returns.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut slot = self.slot.lock();
        if let Some(mut watcher) = slot.watcher.take() {
            watcher.stop();
        }

        tracing::info!("Disposed file system service for {}", self.root);
    }
}

impl Drop for FileSystemService {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Run blocking file system work off the async executor
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FsError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileChangesEvent;
    use std::fs;
    use tempfile::TempDir;

    fn service() -> (TempDir, FileSystemService) {
        let dir = TempDir::new().unwrap();
        let service = FileSystemService::new(dir.path(), ServiceOptions::default()).unwrap();
        (dir, service)
    }

    struct Silent;

    impl FileChangeClient for Silent {
        fn on_file_changes(&self, _event: &FileChangesEvent) {}
    }

    #[test]
    fn test_new_rejects_bad_roots() {
        let dir = TempDir::new().unwrap();

        let missing = dir.path().join("missing");
        assert!(matches!(
            FileSystemService::new(&missing, ServiceOptions::default()),
            Err(FsError::NotFound(_))
        ));

        let file = dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            FileSystemService::new(&file, ServiceOptions::default()),
            Err(FsError::NotADirectory(_))
        ));

        let options = ServiceOptions {
            encoding: "nonsense".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            FileSystemService::new(dir.path(), options),
            Err(FsError::UnsupportedEncoding(_))
        ));
    }

    #[tokio::test]
    async fn test_workspace_root() {
        let (dir, service) = service();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let root = service.get_workspace_root().await.unwrap();
        assert_eq!(&root.uri, service.root());
        assert_eq!(root.has_children, Some(true));

        let names: Vec<_> = root.children.unwrap().iter().filter_map(|c| c.uri.file_name()).collect();
        assert_eq!(names, vec!["a", "b.txt"]);
    }

    #[tokio::test]
    async fn test_read_write_cycle() {
        let (_dir, service) = service();
        let uri = service.root().join("notes/today.txt");

        let created = service.create_file(&uri, Some("draft"), None).await.unwrap();
        assert_eq!(created.size, Some(5));

        let read = service.resolve_content(&uri, None).await.unwrap();
        assert_eq!(read.content, "draft");

        let written = service.set_content(&read.stat, "final version", None).await.unwrap();
        assert_eq!(written.size, Some(13));
        assert!(matches!(
            service.set_content(&created, "lost update", None).await,
            Err(FsError::OutOfSync(_))
        ));

        assert_eq!(service.resolve_content(&uri, None).await.unwrap().content, "final version");
        assert_eq!(service.get_encoding(&uri).await.unwrap(), "UTF-8");
    }

    #[tokio::test]
    async fn test_tree_operations() {
        let (_dir, service) = service();
        let root = service.root().clone();

        service.create_folder(&root.join("src")).await.unwrap();
        service.create_file(&root.join("src/main.rs"), Some("fn main() {}"), None).await.unwrap();

        let copied = service.copy(&root.join("src"), &root.join("backup")).await.unwrap();
        assert!(copied.is_directory);

        let moved = service
            .move_entry(&root.join("backup/main.rs"), &root.join("main.rs"), false)
            .await
            .unwrap();
        assert_eq!(moved.uri, root.join("main.rs"));
        assert!(matches!(
            service.move_entry(&root.join("main.rs"), &root.join("src/main.rs"), false).await,
            Err(FsError::AlreadyExists(_))
        ));

        let touched = service.touch_file(&root.join("main.rs")).await.unwrap();
        assert!(touched.last_modification > 0);

        service.delete(&root.join("src")).await.unwrap();
        assert!(matches!(
            service.get_file_stat(&root.join("src"), false).await,
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_client_lifecycle() {
        let (_dir, service) = service();
        assert_eq!(service.watch_state(), WatchState::Idle);

        service.set_client(Some(Arc::new(Silent))).unwrap();
        assert!(service.has_client());
        assert_eq!(service.watch_state(), WatchState::Watching);

        service.set_client(None).unwrap();
        assert!(!service.has_client());
        assert_eq!(service.watch_state(), WatchState::Idle);

        service.set_client(Some(Arc::new(Silent))).unwrap();
        service.dispose();
        assert_eq!(service.watch_state(), WatchState::Idle);
        assert!(matches!(
            service.set_client(Some(Arc::new(Silent))),
            Err(FsError::WatchFailure(_))
        ));
    }
}
