use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

use crate::cursor::CursorIndicator;
use crate::error::{AgentError, Result};

/// Process-wide agent state: whether a task is running, and the cursor
/// overlay that belongs to it.
///
/// `running` is the flag `stop` clears; `held` stays set until the run's
/// [`RunTicket`] is dropped, so a stopped run finishes unwinding before the
/// next one starts.
pub struct AgentSession {
    running: AtomicBool,
    held: AtomicBool,
    generation: AtomicU64,
    cursor: CursorIndicator,
}

impl AgentSession {
    pub fn new(cursor: CursorIndicator) -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(false),
            held: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            cursor,
        })
    }

    pub fn cursor(&self) -> &CursorIndicator {
        &self.cursor
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Marks the session as running. Fails with `AlreadyRunning` instead of
    /// queueing when another run holds the session, including a stopped run
    /// that has not yet returned.
    pub fn begin(self: &Arc<Self>) -> Result<RunTicket> {
        self.held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AgentError::AlreadyRunning)?;
        self.running.store(true, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RunTicket {
            session: Arc::clone(self),
            generation,
        })
    }

    /// Stops the current run. The run notices at its next suspension point;
    /// the cursor is hidden right away.
    pub async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("agent stopped");
        }
        self.cursor.hide().await;
    }
}

/// Proof that the holder owns the session. Dropping it releases the
/// session.
pub struct RunTicket {
    session: Arc<AgentSession>,
    generation: u64,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.session.is_running()
            && self.session.generation.load(Ordering::SeqCst) == self.generation
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AgentError::Cancelled)
        }
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        self.session.running.store(false, Ordering::SeqCst);
        self.session.held.store(false, Ordering::SeqCst);
    }
}
