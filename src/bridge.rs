//! Typed command/response protocol between the agent and one page context.
//!
//! Every capability the agent uses on a page is a [`PageCommand`] variant;
//! a [`PageTransport`] carries it to the page (a Chrome tab, or the
//! in-memory [`crate::simulated::SimulatedPage`]) and answers with a
//! [`PageReply`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::dom::{Document, DomTree};
use crate::error::{AgentError, Result};
use crate::locator::LocatedElement;
use crate::types::Locator;

/// Input events synthesized for an action, named as the DOM names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyntheticEvent {
    #[serde(rename = "mousedown")]
    PointerDown,
    #[serde(rename = "mouseup")]
    PointerUp,
    #[serde(rename = "click")]
    Click,
    #[serde(rename = "input")]
    Input,
    #[serde(rename = "change")]
    Change,
}

impl SyntheticEvent {
    pub fn dom_name(&self) -> &'static str {
        match self {
            SyntheticEvent::PointerDown => "mousedown",
            SyntheticEvent::PointerUp => "mouseup",
            SyntheticEvent::Click => "click",
            SyntheticEvent::Input => "input",
            SyntheticEvent::Change => "change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CursorCommand {
    Show,
    Hide,
    MoveTo { x: f64, y: f64 },
    Pulse,
}

/// Elements are addressed by absolute positional path
/// (see [`Document::absolute_path`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum PageCommand {
    CaptureDocument,
    Screenshot,
    /// Resolves a locator in the page, answered with [`PageReply::Located`].
    Locate {
        locator: Locator,
    },
    Dispatch {
        target: String,
        events: Vec<SyntheticEvent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
    },
    Focus {
        target: String,
    },
    SetValue {
        target: String,
        value: String,
    },
    ScrollTo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
    },
    ScrollIntoView {
        target: String,
    },
    Cursor {
        cursor: CursorCommand,
    },
}

impl PageCommand {
    pub fn name(&self) -> &'static str {
        match self {
            PageCommand::CaptureDocument => "captureDocument",
            PageCommand::Screenshot => "screenshot",
            PageCommand::Locate { .. } => "locate",
            PageCommand::Dispatch { .. } => "dispatch",
            PageCommand::Focus { .. } => "focus",
            PageCommand::SetValue { .. } => "setValue",
            PageCommand::ScrollTo { .. } => "scrollTo",
            PageCommand::ScrollIntoView { .. } => "scrollIntoView",
            PageCommand::Cursor { .. } => "cursor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "data", rename_all = "camelCase")]
pub enum PageReply {
    Document(DomTree),
    /// Encoded image, normally a `data:image/png;base64,` URL.
    Screenshot(String),
    Located(Option<LocatedElement>),
    Ack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub id: u64,
    #[serde(flatten)]
    pub command: PageCommand,
}

#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn request(&self, request: PageRequest) -> Result<PageReply>;
}

/// Numbered, typed access to a [`PageTransport`].
#[derive(Clone)]
pub struct PageBridge {
    transport: Arc<dyn PageTransport>,
    next_id: Arc<AtomicU64>,
}

impl PageBridge {
    pub fn new(transport: Arc<dyn PageTransport>) -> Self {
        Self {
            transport,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub async fn call(&self, command: PageCommand) -> Result<PageReply> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = command.name();
        debug!(request_id = id, command = name, "page request");
        let reply = self.transport.request(PageRequest { id, command }).await;
        if let Err(err) = &reply {
            debug!(request_id = id, command = name, error = %err, "page request failed");
        }
        reply
    }

    pub async fn capture(&self) -> Result<Document> {
        match self.call(PageCommand::CaptureDocument).await? {
            PageReply::Document(tree) => Ok(Document::from_tree(&tree)),
            other => Err(unexpected("captureDocument", &other)),
        }
    }

    pub async fn screenshot(&self) -> Result<String> {
        match self.call(PageCommand::Screenshot).await? {
            PageReply::Screenshot(image) => Ok(image),
            other => Err(unexpected("screenshot", &other)),
        }
    }

    pub async fn locate(&self, locator: &Locator) -> Result<Option<LocatedElement>> {
        let command = PageCommand::Locate {
            locator: locator.clone(),
        };
        match self.call(command).await? {
            PageReply::Located(found) => Ok(found),
            other => Err(unexpected("locate", &other)),
        }
    }

    /// Sends a command that is answered with a bare acknowledgement.
    pub async fn send(&self, command: PageCommand) -> Result<()> {
        let name = command.name();
        match self.call(command).await? {
            PageReply::Ack => Ok(()),
            other => Err(unexpected(name, &other)),
        }
    }
}

fn unexpected(command: &str, reply: &PageReply) -> AgentError {
    let kind = match reply {
        PageReply::Document(_) => "document",
        PageReply::Screenshot(_) => "screenshot",
        PageReply::Located(_) => "located",
        PageReply::Ack => "ack",
    };
    AgentError::transport(format!("unexpected {kind} reply to {command}"))
}
