use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bridge::PageBridge;
use crate::dom::query;
use crate::dom::{Document, NodeId};
use crate::error::Result;
use crate::types::{BoundingBox, Locator};

const FOCUSABLE_TAGS: [&str; 5] = ["button", "input", "select", "textarea", "iframe"];
const TEXT_ENTRY_TAGS: [&str; 2] = ["input", "textarea"];

/// Resolves `locator` against `doc` with standard CSS and XPath semantics.
/// Unparseable locators resolve to nothing, the same as locators that
/// match nothing.
pub fn locate(doc: &Document, locator: &Locator) -> Option<NodeId> {
    let found = match locator {
        Locator::Query(selector) => query::select_first(doc, selector),
        Locator::Path(path) => query::evaluate_first(doc, path),
    };
    found.unwrap_or_else(|err| {
        warn!(error = %err, "unusable locator");
        None
    })
}

/// What the executor needs to know about a resolved element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedElement {
    /// Absolute positional path that addresses the element in page commands.
    pub path: String,
    pub tag: String,
    pub rect: BoundingBox,
    pub focusable: bool,
    pub text_entry: bool,
}

impl LocatedElement {
    pub fn from_node(doc: &Document, id: NodeId) -> Option<Self> {
        let el = doc.element(id)?;
        let disabled = el.attr("disabled").is_some();
        let focusable = !disabled
            && (FOCUSABLE_TAGS.contains(&el.tag.as_str())
                || (el.tag == "a" && el.attr("href").is_some())
                || el.attr("tabindex").is_some()
                || el
                    .attr("contenteditable")
                    .is_some_and(|v| v.is_empty() || v.eq_ignore_ascii_case("true")));
        Some(Self {
            path: doc.absolute_path(id),
            tag: el.tag.clone(),
            rect: el.rect,
            focusable,
            text_entry: TEXT_ENTRY_TAGS.contains(&el.tag.as_str()),
        })
    }

    pub fn center(&self) -> (f64, f64) {
        self.rect.center()
    }
}

/// Finds elements on the live page. Every lookup is resolved by the page
/// itself, so results track DOM mutations between calls.
#[derive(Clone)]
pub struct ElementLocator {
    bridge: PageBridge,
}

impl ElementLocator {
    pub fn new(bridge: PageBridge) -> Self {
        Self { bridge }
    }

    pub async fn find(&self, locator: &Locator) -> Result<Option<LocatedElement>> {
        let found = self.bridge.locate(locator).await?;
        debug!(%locator, found = found.as_ref().map(|el| el.path.as_str()), "locate");
        Ok(found)
    }
}
