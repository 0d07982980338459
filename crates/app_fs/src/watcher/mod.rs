//! File system watcher with per-path coalescing
//!
//! One recursive notify watcher feeds a coalescer thread, which merges raw
//! events per path and flushes a batch after a quiet period. Batches travel
//! through a bounded queue to a dispatcher thread that calls the client one
//! batch at a time.

mod coalesce;

pub use coalesce::ChangeCoalescer;

use crate::{FsError, Result, Uri};
use crossbeam_channel::{self as channel, select, Receiver, Sender};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Kind of a coalesced change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub uri: Uri,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

/// One delivered batch. At most one change per URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangesEvent {
    pub changes: Vec<FileChange>,
}

/// Receiver of change notifications
///
/// Calls are serialized: the next batch is not delivered until the previous
/// call returns. Calling back into `dispose` from inside a callback is not
/// supported.
pub trait FileChangeClient: Send + Sync {
    fn on_file_changes(&self, event: &FileChangesEvent);

    /// The watch stopped and will not recover on its own
    fn on_watch_failure(&self, error: &FsError) {
        tracing::warn!("File watch stopped: {}", error);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Failed(String),
}

/// Watcher tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherOptions {
    /// Quiet period after the last raw event before a batch is flushed
    pub coalescing_window_ms: u64,

    /// Upper bound on how long a busy batch may keep growing
    pub max_batch_delay_ms: u64,

    /// Batches waiting for the client before coalescing continues instead
    pub channel_capacity: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            coalescing_window_ms: 200,
            max_batch_delay_ms: 2000,
            channel_capacity: 32,
        }
    }
}

impl WatcherOptions {
    pub fn coalescing_window(&self) -> Duration {
        Duration::from_millis(self.coalescing_window_ms)
    }

    pub fn max_batch_delay(&self) -> Duration {
        Duration::from_millis(self.max_batch_delay_ms.max(self.coalescing_window_ms))
    }
}

/// What the coalescer hands to the dispatcher
#[derive(Debug)]
enum Delivery {
    Changes(FileChangesEvent),
    Failed(FsError),
}

/// State shared between the subscription and its dispatcher
struct Shared {
    /// Held for the duration of each client call
    closed: Mutex<bool>,
    state: Mutex<WatchState>,
    /// OS watch; released on stop or on failure
    os_watcher: Mutex<Option<RecommendedWatcher>>,
}

impl Shared {
    fn new(os_watcher: Option<RecommendedWatcher>) -> Self {
        Self {
            closed: Mutex::new(false),
            state: Mutex::new(WatchState::Watching),
            os_watcher: Mutex::new(os_watcher),
        }
    }
}

/// A live subscription on one root
pub(crate) struct FileWatcher {
    root: PathBuf,
    shutdown_tx: Option<Sender<()>>,
    shared: Arc<Shared>,
}

impl FileWatcher {
    /// Watch `root` recursively and deliver batches to `client`
    pub fn start(
        root: &Path,
        client: Arc<dyn FileChangeClient>,
        options: WatcherOptions,
    ) -> Result<Self> {
        let (raw_tx, raw_rx) = channel::unbounded::<notify::Result<notify::Event>>();
        let (batch_tx, batch_rx) = channel::bounded::<Delivery>(options.channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = raw_tx.send(res);
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let shared = Arc::new(Shared::new(Some(watcher)));

        let coalesce_root = root.to_path_buf();
        thread::Builder::new()
            .name("wsfs-coalesce".to_string())
            .spawn(move || run_coalescer(coalesce_root, raw_rx, shutdown_rx, batch_tx, options))?;

        let dispatch_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("wsfs-dispatch".to_string())
            .spawn(move || run_dispatcher(batch_rx, client, dispatch_shared))?;

        tracing::info!("Watching: {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            shutdown_tx: Some(shutdown_tx),
            shared,
        })
    }

    pub fn state(&self) -> WatchState {
        self.shared.state.lock().clone()
    }

    /// Stop delivering and release the OS watch
    ///
    /// Blocks until an in-flight client call returns; no call starts after.
    pub fn stop(&mut self) {
        if self.shutdown_tx.is_none() {
            return;
        }

        *self.shared.closed.lock() = true;

        // Disconnecting wakes the coalescer
        self.shutdown_tx.take();
        self.shared.os_watcher.lock().take();

        let mut state = self.shared.state.lock();
        if *state == WatchState::Watching {
            *state = WatchState::Idle;
        }

        tracing::info!("Unwatched: {}", self.root.display());
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_coalescer(
    root: PathBuf,
    raw_rx: Receiver<notify::Result<notify::Event>>,
    shutdown_rx: Receiver<()>,
    batch_tx: Sender<Delivery>,
    options: WatcherOptions,
) {
    let window = options.coalescing_window();
    let max_delay = options.max_batch_delay();
    let mut coalescer = ChangeCoalescer::new(root);

    loop {
        let timeout = match coalescer.flush_deadline(window, max_delay) {
            Some(deadline) => channel::at(deadline),
            None => channel::never(),
        };

        select! {
            recv(shutdown_rx) -> _ => break,
            recv(raw_rx) -> msg => match msg {
                Ok(Ok(event)) => {
                    if event.need_rescan() {
                        let error = FsError::WatchFailure("event queue overflowed".to_string());
                        let _ = batch_tx.send(Delivery::Failed(error));
                        break;
                    }
                    coalescer.push_event(event, Instant::now());
                }
                Ok(Err(e)) => {
                    let _ = batch_tx.send(Delivery::Failed(e.into()));
                    break;
                }
                Err(_) => break,
            },
            recv(timeout) -> _ => {
                if batch_tx.is_full() {
                    tracing::debug!("Delivery queue full, holding {} pending changes", coalescer.len());
                    coalescer.defer(Instant::now() + window);
                    continue;
                }

                let event = coalescer.drain();
                if event.changes.is_empty() {
                    continue;
                }
                if batch_tx.send(Delivery::Changes(event)).is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Coalescer stopped");
}

fn run_dispatcher(rx: Receiver<Delivery>, client: Arc<dyn FileChangeClient>, shared: Arc<Shared>) {
    for delivery in rx.iter() {
        let closed = shared.closed.lock();
        if *closed {
            break;
        }

        match delivery {
            Delivery::Changes(event) => {
                tracing::debug!("Delivering {} changes", event.changes.len());
                client.on_file_changes(&event);
            }
            Delivery::Failed(error) => {
                tracing::error!("Watcher error: {}", error);
                *shared.state.lock() = WatchState::Failed(error.to_string());
                client.on_watch_failure(&error);
                shared.os_watcher.lock().take();
                break;
            }
        }
    }

    tracing::debug!("Dispatcher stopped");
}
