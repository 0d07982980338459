//! Application state management

use crate::{AppConfig, AppError};
use app_fs::{FileSystemService, Uri};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Main application state
pub struct AppState {
    /// Application configuration
    pub config: RwLock<AppConfig>,

    /// File system access for the open workspace
    pub fs: Arc<FileSystemService>,
}

impl AppState {
    /// Open `root`, or the configured workspace root, or the current directory
    pub fn new(config: AppConfig, root: Option<PathBuf>) -> Result<Self, AppError> {
        config.validate()?;

        let root = match root.or_else(|| config.general.workspace_root.clone()) {
            Some(root) => root,
            None => std::env::current_dir()
                .map_err(|e| AppError::Init(format!("no workspace root: {}", e)))?,
        };

        let fs = FileSystemService::new(&root, config.service_options())?;

        Ok(Self {
            config: RwLock::new(config),
            fs: Arc::new(fs),
        })
    }

    pub fn watch_enabled(&self) -> bool {
        self.config.read().watcher.enabled
    }

    /// Turn a command-line argument into a Uri
    ///
    /// Accepts a `scheme://` URI, an absolute path, or a path relative to the
    /// workspace root.
    pub fn resolve_uri(&self, arg: &str) -> Result<Uri, AppError> {
        if arg.contains("://") {
            return Ok(Uri::parse(arg)?);
        }

        let path = Path::new(arg);
        if path.is_absolute() {
            return Ok(Uri::from_file_path(path)?);
        }

        if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(AppError::InvalidArgument(format!(
                "{} leaves the workspace root",
                arg
            )));
        }

        Ok(self.fs.root().join(arg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> AppState {
        AppState::new(AppConfig::default(), Some(dir.path().to_path_buf())).unwrap()
    }

    #[test]
    fn test_explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.general.workspace_root = Some(dir.path().join("missing"));

        let state = AppState::new(config, Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(
            state.fs.root().to_file_path().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_configured_root_must_exist() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.general.workspace_root = Some(dir.path().join("missing"));

        assert!(matches!(
            AppState::new(config, None),
            Err(AppError::Fs(app_fs::FsError::NotFound(_)))
        ));
    }

    #[test]
    fn test_resolve_uri() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let root = state.fs.root().clone();

        assert_eq!(state.resolve_uri("a/b.txt").unwrap(), root.join("a/b.txt"));
        assert_eq!(state.resolve_uri(root.join("x").as_str()).unwrap(), root.join("x"));
        assert_eq!(
            state.resolve_uri(&dir.path().join("y").to_string_lossy()).unwrap().file_name(),
            Some("y".to_string())
        );
        assert!(matches!(
            state.resolve_uri("../escape"),
            Err(AppError::InvalidArgument(_))
        ));
    }
}
