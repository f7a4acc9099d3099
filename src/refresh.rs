//! Background pattern refresh.
//!
//! A dedicated thread calls [`PatternStorage::refresh`] once per interval.
//! It waits on a shutdown channel with a timeout, so `stop()` wakes it
//! immediately instead of after the next tick. A refresh in progress when
//! stop is requested runs to completion; publication is its last step, so
//! the storage is never left with a partially built index.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::error::{FilterError, FilterResult};
use crate::filter::PatternStorage;

const THREAD_NAME: &str = "kyro-filter-refresh";
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to the refresh thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct RefreshWorker {
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl RefreshWorker {
    /// Spawns the refresh thread.
    ///
    /// The first refresh happens one `interval` after start; call
    /// `storage.refresh()` (or use [`PatternStorage::open`]) for an immediate
    /// load.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Internal` if the thread cannot be spawned.
    pub fn start(storage: Arc<PatternStorage>, interval: Duration) -> FilterResult<Self> {
        let interval = interval.max(MIN_INTERVAL);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let join = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match storage.refresh() {
                        Ok(stats) => tracing::trace!(
                            glob = stats.glob_patterns,
                            tagged = stats.tagged_patterns,
                            skipped = stats.skipped_patterns,
                            "refreshed patterns"
                        ),
                        Err(e) => tracing::error!(error = %e, "cannot refresh patterns"),
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| FilterError::internal(format!("failed to spawn refresh worker: {e}")))?;

        tracing::debug!(interval = ?interval, "refresh worker started");
        Ok(Self {
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }

    /// Spawns the refresh thread with the interval from the storage config.
    ///
    /// # Errors
    ///
    /// See [`RefreshWorker::start`].
    pub fn start_configured(storage: Arc<PatternStorage>) -> FilterResult<Self> {
        let interval = storage.config().refresh_interval();
        Self::start(storage, interval)
    }

    /// Returns true until the thread has been stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.join.take() {
            if handle.join().is_err() {
                tracing::error!("refresh worker panicked");
            } else {
                tracing::debug!("refresh worker stopped");
            }
        }
    }
}

impl Drop for RefreshWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
