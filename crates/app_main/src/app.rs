//! Command execution

use crate::Commands;
use anyhow::Result;
use app_core::{AppConfig, AppError, AppState};
use app_fs::{FileChangeClient, FileChangesEvent, FsError, WatchState};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

/// Load configuration, initialize logging, then execute one command
pub fn run(
    root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    log_level: Option<String>,
    command: Commands,
) -> Result<()> {
    let config = match &config_path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            eprintln!("Ignoring unreadable configuration: {}", e);
            AppConfig::default()
        }),
    };

    let level = log_level.unwrap_or_else(|| config.general.log_level.clone());
    if let Err(e) = app_log::init(&level) {
        eprintln!("Logging disabled: {}", e);
    }

    if let Err(e) = app_log::cleanup_old_logs(config.general.log_retention_days) {
        tracing::warn!("Failed to cleanup old logs: {}", e);
    }

    let state = AppState::new(config, root)?;
    tracing::debug!("wsfs {} on {}", env!("CARGO_PKG_VERSION"), state.fs.root());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(execute(&state, command));
    state.fs.dispose();
    result
}

async fn execute(state: &AppState, command: Commands) -> Result<()> {
    let fs = &state.fs;

    match command {
        Commands::Stat { path, expand } => {
            let uri = state.resolve_uri(&path)?;
            print_json(&fs.get_file_stat(&uri, expand).await?)
        }
        Commands::Cat { path, encoding } => {
            let uri = state.resolve_uri(&path)?;
            print_json(&fs.resolve_content(&uri, encoding.as_deref()).await?)
        }
        Commands::Write { path, text, encoding } => {
            let uri = state.resolve_uri(&path)?;
            let stat = match fs.get_file_stat(&uri, false).await {
                Ok(stat) => fs.set_content(&stat, &text, encoding.as_deref()).await?,
                Err(FsError::NotFound(_)) => {
                    fs.create_file(&uri, Some(&text), encoding.as_deref()).await?
                }
                Err(e) => return Err(e.into()),
            };
            print_json(&stat)
        }
        Commands::Encoding { path } => {
            let uri = state.resolve_uri(&path)?;
            let encoding = fs.get_encoding(&uri).await?;
            print_json(&serde_json::json!({ "uri": uri, "encoding": encoding }))
        }
        Commands::Mkdir { path } => {
            let uri = state.resolve_uri(&path)?;
            print_json(&fs.create_folder(&uri).await?)
        }
        Commands::Touch { path } => {
            let uri = state.resolve_uri(&path)?;
            print_json(&fs.touch_file(&uri).await?)
        }
        Commands::Rm { path } => {
            let uri = state.resolve_uri(&path)?;
            fs.delete(&uri).await?;
            print_json(&serde_json::json!({ "deleted": uri }))
        }
        Commands::Mv { source, target, overwrite } => {
            let source = state.resolve_uri(&source)?;
            let target = state.resolve_uri(&target)?;
            print_json(&fs.move_entry(&source, &target, overwrite).await?)
        }
        Commands::Cp { source, target } => {
            let source = state.resolve_uri(&source)?;
            let target = state.resolve_uri(&target)?;
            print_json(&fs.copy(&source, &target).await?)
        }
        Commands::Root => print_json(&fs.get_workspace_root().await?),
        Commands::Watch => watch(state).await,
    }
}

enum WatchMessage {
    Changes(FileChangesEvent),
    Failed(String),
}

/// Forwards batches from the dispatcher thread into the runtime
struct ForwardingClient {
    tx: UnboundedSender<WatchMessage>,
}

impl FileChangeClient for ForwardingClient {
    fn on_file_changes(&self, event: &FileChangesEvent) {
        let _ = self.tx.send(WatchMessage::Changes(event.clone()));
    }

    fn on_watch_failure(&self, error: &FsError) {
        tracing::warn!("File watch stopped: {}", error);
        let _ = self.tx.send(WatchMessage::Failed(error.to_string()));
    }
}

async fn watch(state: &AppState) -> Result<()> {
    if !state.watch_enabled() {
        return Err(AppError::Config("watching is disabled (watcher.enabled = false)".to_string()).into());
    }

    let (tx, mut rx) = unbounded_channel();
    state.fs.set_client(Some(Arc::new(ForwardingClient { tx })))?;
    tracing::info!("Watching {} (Ctrl-C to stop)", state.fs.root());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(WatchMessage::Changes(batch)) => print_json(&batch)?,
                Some(WatchMessage::Failed(reason)) => {
                    return Err(FsError::WatchFailure(reason).into());
                }
                None => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    state.fs.set_client(None)?;
    debug_assert_eq!(state.fs.watch_state(), WatchState::Idle);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Error code and message for the JSON error line
pub fn describe_error(error: &anyhow::Error) -> (&'static str, String) {
    if let Some(e) = error.downcast_ref::<AppError>() {
        return (e.code(), e.user_message());
    }
    if let Some(e) = error.downcast_ref::<FsError>() {
        return (e.code(), e.to_string());
    }
    ("Error", format!("{:#}", error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_fs::Uri;

    #[test]
    fn test_describe_error() {
        let uri = Uri::parse("file:///tmp/x").unwrap();

        let err = anyhow::Error::from(FsError::NotFound(uri.clone()));
        assert_eq!(describe_error(&err).0, "NotFound");

        let err = anyhow::Error::from(AppError::from(FsError::OutOfSync(uri)));
        let (code, message) = describe_error(&err);
        assert_eq!(code, "OutOfSync");
        assert!(message.contains("reload"));

        let err = anyhow::anyhow!("boom");
        assert_eq!(describe_error(&err), ("Error", "boom".to_string()));
    }

    #[tokio::test]
    async fn test_execute_write_creates_then_updates() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = AppState::new(AppConfig::default(), Some(dir.path().to_path_buf())).unwrap();

        let write = |text: &str| Commands::Write {
            path: "notes.txt".to_string(),
            text: text.to_string(),
            encoding: None,
        };

        execute(&state, write("first")).await.unwrap();
        execute(&state, write("second, longer")).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("notes.txt")).unwrap();
        assert_eq!(content, "second, longer");
    }

    #[tokio::test]
    async fn test_execute_reports_missing_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = AppState::new(AppConfig::default(), Some(dir.path().to_path_buf())).unwrap();

        let err = execute(&state, Commands::Rm { path: "ghost".to_string() })
            .await
            .unwrap_err();
        assert_eq!(describe_error(&err).0, "NotFound");
    }
}
