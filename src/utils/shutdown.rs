//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coordinates graceful shutdown across the server, the publishers and every
/// connection handler. Connections hang child tokens off [`Self::token`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A clone of the root cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the root token, then wait up to `timeout` for every handle.
    ///
    /// Handles still running after the timeout are aborted. Returns `true`
    /// when all tasks finished on their own.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drain = futures::future::join_all(handles);

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, aborting remaining tasks");
            for handle in aborts {
                handle.abort();
            }
            return false;
        }
        true
    }
}
