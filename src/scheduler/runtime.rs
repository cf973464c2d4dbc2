use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::{Scheduler, Task};

/// Schedules tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Binds to the runtime of the calling context.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().context("TokioScheduler needs a running tokio runtime")?;
        Ok(Self { runtime })
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> CancellationToken {
        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = token_clone.cancelled() => {}
                _ = tokio::time::sleep(delay) => task(),
            }
        });

        cancel_token
    }
}
