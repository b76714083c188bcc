use std::time::Duration;
use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::orchestrator::Reasoner;
use crate::session::RunTicket;
use crate::types::ReasoningResult;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(2000);

/// Re-runs failed attempts with a fixed backoff.
pub struct RetryController<R> {
    reasoner: R,
    backoff: Duration,
    use_memory: bool,
}

impl<R: Reasoner> RetryController<R> {
    pub fn new(reasoner: R) -> Self {
        Self {
            reasoner,
            backoff: DEFAULT_BACKOFF,
            use_memory: true,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_memory(mut self, use_memory: bool) -> Self {
        self.use_memory = use_memory;
        self
    }

    pub fn reasoner(&self) -> &R {
        &self.reasoner
    }

    /// Makes up to `max_retries + 1` attempts and returns the first success
    /// or the last failure. A stopped session ends the loop early.
    pub async fn attempt(&self, goal: &str, max_retries: u32, ticket: &RunTicket) -> ReasoningResult {
        let mut attempt = 1;
        loop {
            let mut result = self.reasoner.reason(goal, self.use_memory, ticket).await;
            result.attempt = attempt;
            if result.success {
                return result;
            }
            if result.error_kind == Some(ErrorKind::Cancelled) || !ticket.is_active() {
                info!(attempt, "stopped, not retrying");
                return result;
            }
            if attempt > max_retries {
                warn!(attempts = attempt, error = ?result.error, "giving up");
                return result;
            }
            warn!(attempt, error = ?result.error, backoff_ms = self.backoff.as_millis() as u64, "attempt failed, retrying");
            tokio::time::sleep(self.backoff).await;
            if !ticket.is_active() {
                return result;
            }
            attempt += 1;
        }
    }
}
