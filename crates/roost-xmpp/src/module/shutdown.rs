//! Ordered graceful shutdown of extension handlers.
//!
//! Handlers are shut down one at a time, last constructed first, so a handler
//! can still rely on the ones it was built from while tearing down. The whole
//! sequence runs on its own task under a caller-supplied deadline; when the
//! deadline expires the caller gets an error and the remaining handlers keep
//! shutting down in the background without being cancelled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::Module;

/// Failures of an ordered shutdown.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The deadline elapsed with `pending` handlers not yet shut down.
    #[error("Shutdown deadline exceeded with {pending} modules pending")]
    DeadlineExceeded { pending: usize },

    /// The shutdown task stopped without completing (it panicked).
    #[error("Shutdown task aborted")]
    Aborted,
}

/// Sequential reverse-order shutdown driver.
pub struct OrderedShutdown {
    modules: Vec<Arc<dyn Module>>,
}

impl OrderedShutdown {
    /// `modules` in construction order.
    pub fn new(modules: Vec<Arc<dyn Module>>) -> Self {
        Self { modules }
    }

    /// Shut every module down, last first, within `timeout`.
    pub async fn run(self, timeout: Duration) -> Result<(), ShutdownError> {
        let total = self.modules.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = oneshot::channel();

        let counter = Arc::clone(&completed);
        let modules = self.modules;
        tokio::spawn(async move {
            for module in modules.iter().rev() {
                debug!(module = module.name(), "Shutting down module");
                module.shutdown().await;
                counter.fetch_add(1, Ordering::SeqCst);
                info!(module = module.name(), "Module shut down");
            }
            let _ = done_tx.send(());
        });

        tokio::select! {
            result = done_rx => {
                result.map_err(|_| ShutdownError::Aborted)?;
                info!(modules = total, "All modules shut down");
                Ok(())
            }
            _ = tokio::time::sleep(timeout) => {
                let pending = total - completed.load(Ordering::SeqCst);
                warn!(
                    pending,
                    timeout_ms = timeout.as_millis() as u64,
                    "Shutdown deadline exceeded, leaving remaining modules to finish in background"
                );
                Err(ShutdownError::DeadlineExceeded { pending })
            }
        }
    }
}
