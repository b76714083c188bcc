use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::bridge::{CursorCommand, PageBridge, PageCommand};

/// The on-page cursor overlay that shows where the agent is acting.
///
/// Purely cosmetic: a failed overlay command is logged and otherwise
/// ignored. Clones share the same overlay.
#[derive(Clone)]
pub struct CursorIndicator {
    bridge: PageBridge,
    visible: Arc<AtomicBool>,
}

impl CursorIndicator {
    pub fn new(bridge: PageBridge) -> Self {
        Self {
            bridge,
            visible: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub async fn show(&self) {
        self.visible.store(true, Ordering::SeqCst);
        self.send(CursorCommand::Show).await;
    }

    pub async fn hide(&self) {
        self.visible.store(false, Ordering::SeqCst);
        self.send(CursorCommand::Hide).await;
    }

    pub async fn move_to(&self, x: f64, y: f64) {
        self.send(CursorCommand::MoveTo { x, y }).await;
    }

    pub async fn pulse(&self) {
        self.send(CursorCommand::Pulse).await;
    }

    async fn send(&self, cursor: CursorCommand) {
        if let Err(err) = self.bridge.send(PageCommand::Cursor { cursor }).await {
            debug!(?cursor, error = %err, "cursor overlay update failed");
        }
    }
}
