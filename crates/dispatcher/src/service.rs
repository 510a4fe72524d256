//! Owned start/stop lifecycle around the dispatch loop.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::ProductionDispatcher;

/// Handle to a running dispatch loop.
///
/// Created once at process startup with [`start`](Self::start) and consumed
/// by [`stop`](Self::stop) at shutdown.
pub struct DispatcherService {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl DispatcherService {
    /// Spawn the dispatch loop as a background task.
    pub fn start(dispatcher: ProductionDispatcher, shutdown_timeout: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            dispatcher.run(token).await;
        });

        tracing::info!("Dispatcher service started");
        Self {
            cancel,
            handle,
            shutdown_timeout,
        }
    }

    /// Whether the loop task is still alive.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop and wait for it to exit.
    ///
    /// An assignment in flight is allowed to finish. If the loop has not
    /// exited within the shutdown timeout the task is aborted and `false`
    /// is returned.
    pub async fn stop(self) -> bool {
        self.cancel.cancel();

        let mut handle = self.handle;
        match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => {
                tracing::info!("Dispatcher service stopped");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Dispatcher task ended abnormally");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Dispatcher did not stop in time, aborting",
                );
                handle.abort();
                false
            }
        }
    }
}
