//! In-memory page that answers bridge commands from a [`Document`].
//!
//! Used by the test-suite and by dry runs: it applies focus, value and
//! scroll changes to its document and records every synthesized event so
//! callers can assert on what the agent did.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::bridge::{CursorCommand, PageCommand, PageReply, PageRequest, PageTransport, SyntheticEvent};
use crate::dom::{Document, DomTree, NodeId, query};
use crate::error::{AgentError, Result};
use crate::locator::{self, LocatedElement};

pub const BLANK_SCREENSHOT: &str = "data:image/png;base64,iVBORw0KGgo=";

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub target: String,
    pub event: SyntheticEvent,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CursorState {
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub pulses: usize,
}

#[derive(Debug)]
struct State {
    document: Option<Document>,
    screenshot: String,
    focused: Option<NodeId>,
    events: Vec<DispatchedEvent>,
    commands: Vec<PageCommand>,
    cursor: CursorState,
}

#[derive(Debug)]
pub struct SimulatedPage {
    state: Mutex<State>,
}

impl SimulatedPage {
    pub fn new(tree: DomTree) -> Self {
        Self::with_document(Some(Document::from_tree(&tree)))
    }

    /// A page with no active target: every command fails with
    /// `NoActiveTarget`.
    pub fn without_target() -> Self {
        Self::with_document(None)
    }

    fn with_document(document: Option<Document>) -> Self {
        Self {
            state: Mutex::new(State {
                document,
                screenshot: BLANK_SCREENSHOT.to_string(),
                focused: None,
                events: Vec::new(),
                commands: Vec::new(),
                cursor: CursorState::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_screenshot(&self, image: &str) {
        self.lock().screenshot = image.to_string();
    }

    /// Runs `f` against the live document, e.g. to mutate it between steps.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Document) -> R) -> Option<R> {
        self.lock().document.as_mut().map(f)
    }

    pub fn document(&self) -> Option<Document> {
        self.lock().document.clone()
    }

    pub fn events(&self) -> Vec<DispatchedEvent> {
        self.lock().events.clone()
    }

    pub fn commands(&self) -> Vec<PageCommand> {
        self.lock().commands.clone()
    }

    pub fn command_count(&self, name: &str) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|c| c.name() == name)
            .count()
    }

    pub fn cursor(&self) -> CursorState {
        self.lock().cursor
    }

    /// Absolute path of the focused element.
    pub fn focused(&self) -> Option<String> {
        let state = self.lock();
        let doc = state.document.as_ref()?;
        state.focused.map(|id| doc.absolute_path(id))
    }

    /// Current form value of the first element matching `path`.
    pub fn value_at(&self, path: &str) -> Option<String> {
        let state = self.lock();
        let doc = state.document.as_ref()?;
        let id = query::evaluate_first(doc, path).ok().flatten()?;
        doc.element(id)?.value.clone()
    }
}

fn resolve(doc: &Document, target: &str) -> Result<NodeId> {
    query::evaluate_first(doc, target)
        .ok()
        .flatten()
        .ok_or_else(|| AgentError::ElementNotFound(format!("path `{target}`")))
}

/// Moves the viewport, shifting every element's viewport-relative box.
fn scroll_viewport(doc: &mut Document, x: f64, y: f64) {
    let x = x.max(0.0);
    let y = y.max(0.0);
    let dx = x - doc.viewport.scroll_x;
    let dy = y - doc.viewport.scroll_y;
    doc.viewport.scroll_x = x;
    doc.viewport.scroll_y = y;
    let ids: Vec<NodeId> = doc.elements().collect();
    for id in ids {
        if let Some(el) = doc.element_mut(id) {
            el.rect.x -= dx;
            el.rect.y -= dy;
        }
    }
}

impl State {
    fn apply(&mut self, command: PageCommand) -> Result<PageReply> {
        let Some(doc) = self.document.as_mut() else {
            return Err(AgentError::NoActiveTarget("no page is attached".into()));
        };
        match command {
            PageCommand::CaptureDocument => return Ok(PageReply::Document(doc.to_tree())),
            PageCommand::Screenshot => return Ok(PageReply::Screenshot(self.screenshot.clone())),
            PageCommand::Locate { locator: wanted } => {
                let found = locator::locate(doc, &wanted)
                    .and_then(|id| LocatedElement::from_node(doc, id));
                return Ok(PageReply::Located(found));
            }
            PageCommand::Dispatch {
                target,
                events,
                x,
                y,
            } => {
                resolve(doc, &target)?;
                self.events.extend(events.into_iter().map(|event| DispatchedEvent {
                    target: target.clone(),
                    event,
                    x,
                    y,
                }));
            }
            PageCommand::Focus { target } => {
                self.focused = Some(resolve(doc, &target)?);
            }
            PageCommand::SetValue { target, value } => {
                let id = resolve(doc, &target)?;
                if let Some(el) = doc.element_mut(id) {
                    el.value = Some(value);
                }
            }
            PageCommand::ScrollTo { x, y } => {
                let x = x.unwrap_or(doc.viewport.scroll_x);
                let y = y.unwrap_or(doc.viewport.scroll_y);
                scroll_viewport(doc, x, y);
            }
            PageCommand::ScrollIntoView { target } => {
                let id = resolve(doc, &target)?;
                let rect = doc.element(id).map(|el| el.rect).unwrap_or_default();
                let top = rect.y + doc.viewport.scroll_y;
                let centered = top + rect.height / 2.0 - doc.viewport.height / 2.0;
                let scroll_x = doc.viewport.scroll_x;
                scroll_viewport(doc, scroll_x, centered);
            }
            PageCommand::Cursor { cursor } => match cursor {
                CursorCommand::Show => self.cursor.visible = true,
                CursorCommand::Hide => self.cursor.visible = false,
                CursorCommand::MoveTo { x, y } => {
                    self.cursor.x = x;
                    self.cursor.y = y;
                }
                CursorCommand::Pulse => self.cursor.pulses += 1,
            },
        }
        Ok(PageReply::Ack)
    }
}

#[async_trait]
impl PageTransport for SimulatedPage {
    async fn request(&self, request: PageRequest) -> Result<PageReply> {
        let mut state = self.lock();
        state.commands.push(request.command.clone());
        state.apply(request.command)
    }
}
