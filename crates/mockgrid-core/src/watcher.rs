//! Modification-time polling over the loader's tracked file set.
//!
//! The watcher owns a periodic loop that stats every tracked path and emits
//! a [`WatchEvent`] when a file reports a later modification time or stops
//! being statable. Consumers typically respond by re-running the loader and
//! swapping the registry.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A change notification for one tracked file
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// File that changed or disappeared
    pub path: PathBuf,
    /// Stat failure message when the file could not be inspected
    pub error: Option<String>,
}

struct LoopHandle {
    stop_tx: oneshot::Sender<()>,
    done_rx: oneshot::Receiver<()>,
}

/// Polling file watcher with a restartable lifecycle.
///
/// `start` and `stop` are re-entrant: starting twice is a no-op, stopping
/// twice is a no-op, and a fresh loop (with fresh stop/done channels) is
/// spawned on every start after a stop.
pub struct FileWatcher {
    interval: Duration,
    tracked: Arc<RwLock<HashMap<PathBuf, SystemTime>>>,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    lifecycle: Mutex<Option<LoopHandle>>,
}

impl FileWatcher {
    /// Create a watcher and the receiving end of its event channel.
    pub fn new(interval: Duration) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                interval,
                tracked: Arc::new(RwLock::new(HashMap::new())),
                events_tx,
                lifecycle: Mutex::new(None),
            },
            events_rx,
        )
    }

    /// Create a watcher with the default two-second interval.
    pub fn with_default_interval() -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        Self::new(DEFAULT_POLL_INTERVAL)
    }

    /// Replace the tracked file set, typically with the loader's output.
    pub fn track(&self, files: HashMap<PathBuf, SystemTime>) {
        *self.tracked.write() = files;
    }

    /// Number of files currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.tracked.read().len()
    }

    /// Whether the polling loop is currently running.
    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().is_some()
    }

    /// Spawn the polling loop. A no-op when already running.
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let tracked = Arc::clone(&self.tracked);
        let events_tx = self.events_tx.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick of tokio's interval fires immediately; skip it
            // so the initial state is never reported as a change.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => poll_once(&tracked, &events_tx).await,
                }
            }
            let _ = done_tx.send(());
            debug!("file watcher loop exited");
        });

        info!(interval_ms = interval.as_millis() as u64, "file watcher started");
        *lifecycle = Some(LoopHandle { stop_tx, done_rx });
    }

    /// Stop the polling loop and wait for it to exit. A no-op when not
    /// running.
    pub async fn stop(&self) {
        let handle = self.lifecycle.lock().take();
        let Some(LoopHandle { stop_tx, done_rx }) = handle else {
            return;
        };
        let _ = stop_tx.send(());
        let _ = done_rx.await;
        info!("file watcher stopped");
    }
}

async fn poll_once(
    tracked: &RwLock<HashMap<PathBuf, SystemTime>>,
    events_tx: &mpsc::UnboundedSender<WatchEvent>,
) {
    let snapshot: Vec<(PathBuf, SystemTime)> =
        tracked.read().iter().map(|(p, t)| (p.clone(), *t)).collect();

    for (path, recorded) in snapshot {
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => {
                let modified = metadata.modified().unwrap_or(recorded);
                if modified > recorded {
                    debug!(path = %path.display(), "tracked file modified");
                    tracked.write().insert(path.clone(), modified);
                    let _ = events_tx.send(WatchEvent { path, error: None });
                }
            }
            Err(e) => {
                warn!(path = %path.display(), %e, "tracked file no longer statable");
                // Drop the path so the failure is reported once; the next
                // successful reload re-seeds the tracked set.
                tracked.write().remove(&path);
                let _ = events_tx.send(WatchEvent {
                    path,
                    error: Some(e.to_string()),
                });
            }
        }
    }
}
