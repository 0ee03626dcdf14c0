//! Bounded pool for blocking work.
//!
//! Handlers that must call blocking code hand it to an [`OffloadExecutor`]
//! instead of stalling the async runtime. The executor caps how many such
//! jobs run at once; excess callers wait for a permit.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::trace;

use crate::error::OffloadError;

#[derive(Debug, Clone)]
pub struct OffloadExecutor {
    permits: Arc<Semaphore>,
    max_blocking: usize,
}

impl OffloadExecutor {
    /// A zero limit is raised to one.
    pub fn new(max_blocking: usize) -> Self {
        let max_blocking = max_blocking.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_blocking)),
            max_blocking,
        }
    }

    pub fn max_blocking(&self) -> usize {
        self.max_blocking
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn run<F, R>(&self, f: F) -> Result<R, OffloadError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| OffloadError::Closed)?;
        trace!(available = self.available(), "Offloading blocking work");
        let output = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await?;
        Ok(output)
    }

    /// Rejects new work; jobs already running finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}
