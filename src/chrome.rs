//! [`PageTransport`] over a headless_chrome tab.
//!
//! Documents are captured by a script that serializes the live DOM into a
//! [`DomTree`]; every other command is handed to a bridge script that
//! resolves its target by XPath and acts on it in the page. Locators are
//! resolved there too, with `document.querySelector` and
//! `document.evaluate`.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use headless_chrome::Tab;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::bridge::{PageCommand, PageReply, PageRequest, PageTransport};
use crate::dom::DomTree;
use crate::error::{AgentError, Result};
use crate::locator::LocatedElement;

/// Serializes the page into the `DomTree` JSON shape. Non-rendering
/// elements and the agent's own cursor overlay are left out.
const CAPTURE_JS: &str = r#"
(() => {
  const SKIP = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE']);
  const FORM = new Set(['INPUT', 'TEXTAREA', 'SELECT']);
  function capture(el) {
    const r = el.getBoundingClientRect();
    const attributes = {};
    for (const a of el.attributes) attributes[a.name.toLowerCase()] = a.value;
    const node = {
      tag: el.tagName.toLowerCase(),
      attributes,
      rect: { x: r.x, y: r.y, width: r.width, height: r.height },
      children: [],
    };
    if (FORM.has(el.tagName) && typeof el.value === 'string') node.value = el.value;
    for (const child of el.childNodes) {
      if (child.nodeType === Node.TEXT_NODE) {
        if (child.data.length) node.children.push(child.data);
      } else if (child.nodeType === Node.ELEMENT_NODE
          && !SKIP.has(child.tagName)
          && child.id !== 'surf-agent-cursor') {
        node.children.push(capture(child));
      }
    }
    return node;
  }
  return JSON.stringify({
    url: location.href,
    title: document.title,
    viewport: {
      scrollX: window.scrollX,
      scrollY: window.scrollY,
      width: window.innerWidth,
      height: window.innerHeight,
    },
    root: capture(document.documentElement),
  });
})()
"#;

/// Applies one serialized `PageCommand`. Answers `{"ok":true}`,
/// `{"ok":true,"located":...}` for locate, or `{"missing":"<path>"}`.
const BRIDGE_JS: &str = r#"
(command) => {
  const find = (path) => document.evaluate(
    path, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
  const absolutePath = (el) => {
    const parts = [];
    for (let node = el; node; node = node.parentElement) {
      let index = 1;
      for (let s = node.previousElementSibling; s; s = s.previousElementSibling) {
        if (s.tagName === node.tagName) index++;
      }
      const tag = node.tagName.toLowerCase();
      parts.unshift(index > 1 ? tag + '[' + index + ']' : tag);
    }
    return '/' + parts.join('/');
  };
  const describe = (el) => {
    const tag = el.tagName.toLowerCase();
    const r = el.getBoundingClientRect();
    const editable = el.getAttribute('contenteditable');
    const focusable = !el.hasAttribute('disabled') && (
      ['button', 'input', 'select', 'textarea', 'iframe'].includes(tag)
      || (tag === 'a' && el.hasAttribute('href'))
      || el.hasAttribute('tabindex')
      || (editable !== null && (editable === '' || editable.toLowerCase() === 'true')));
    return {
      path: absolutePath(el),
      tag,
      rect: { x: r.x, y: r.y, width: r.width, height: r.height },
      focusable,
      textEntry: tag === 'input' || tag === 'textarea',
    };
  };
  const ok = JSON.stringify({ ok: true });
  const missing = JSON.stringify({ missing: command.target || '' });
  const overlay = () => {
    let el = document.getElementById('surf-agent-cursor');
    if (!el) {
      el = document.createElement('div');
      el.id = 'surf-agent-cursor';
      Object.assign(el.style, {
        position: 'fixed', left: '0px', top: '0px', width: '20px', height: '20px',
        marginLeft: '-10px', marginTop: '-10px', borderRadius: '50%',
        background: 'rgba(59, 130, 246, 0.5)', border: '2px solid #2563eb',
        pointerEvents: 'none', zIndex: '2147483647', display: 'none',
        transition: 'left 0.3s ease, top 0.3s ease',
      });
      document.documentElement.appendChild(el);
    }
    return el;
  };
  switch (command.command) {
    case 'locate': {
      let el = null;
      try {
        el = command.locator.kind === 'path'
          ? find(command.locator.value)
          : document.querySelector(command.locator.value);
      } catch (e) {
        el = null;
      }
      const usable = el instanceof Element && el.id !== 'surf-agent-cursor';
      return JSON.stringify({ ok: true, located: usable ? describe(el) : null });
    }
    case 'dispatch': {
      const el = find(command.target);
      if (!el) return missing;
      for (const name of command.events) {
        const init = { bubbles: true, cancelable: true };
        const event = name.startsWith('mouse') || name === 'click'
          ? new MouseEvent(name, { ...init, view: window, clientX: command.x, clientY: command.y })
          : new Event(name, init);
        el.dispatchEvent(event);
      }
      return ok;
    }
    case 'focus': {
      const el = find(command.target);
      if (!el) return missing;
      el.focus();
      return ok;
    }
    case 'setValue': {
      const el = find(command.target);
      if (!el) return missing;
      el.value = command.value;
      return ok;
    }
    case 'scrollTo':
      window.scrollTo({
        left: command.x ?? window.scrollX,
        top: command.y ?? window.scrollY,
        behavior: 'smooth',
      });
      return ok;
    case 'scrollIntoView': {
      const el = find(command.target);
      if (!el) return missing;
      el.scrollIntoView({ behavior: 'smooth', block: 'center' });
      return ok;
    }
    case 'cursor': {
      const el = overlay();
      const c = command.cursor;
      if (c.action === 'show') el.style.display = 'block';
      if (c.action === 'hide') el.style.display = 'none';
      if (c.action === 'moveTo') { el.style.left = c.x + 'px'; el.style.top = c.y + 'px'; }
      if (c.action === 'pulse') {
        el.animate([{ transform: 'scale(1)' }, { transform: 'scale(1.6)' }, { transform: 'scale(1)' }],
          { duration: 300 });
      }
      return ok;
    }
    default:
      return JSON.stringify({ error: 'unknown command ' + command.command });
  }
}
"#;

#[derive(Deserialize)]
struct BridgeAnswer {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    located: Option<LocatedElement>,
    #[serde(default)]
    missing: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A Chrome tab seen as a page. Without a tab every command fails with
/// `NoActiveTarget`.
pub struct ChromePage {
    tab: Mutex<Option<Arc<Tab>>>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self {
            tab: Mutex::new(Some(tab)),
        }
    }

    pub fn detached() -> Self {
        Self {
            tab: Mutex::new(None),
        }
    }

    pub fn set_tab(&self, tab: Option<Arc<Tab>>) {
        *self.tab.lock().unwrap_or_else(PoisonError::into_inner) = tab;
    }

    fn tab(&self) -> Result<Arc<Tab>> {
        self.tab
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AgentError::NoActiveTarget("No tab ID".into()))
    }
}

/// Runs blocking DevTools calls off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| AgentError::transport(format!("browser task failed: {err}")))?
        .map_err(|err| AgentError::transport(format!("{err:#}")))
}

fn string_value(value: Option<serde_json::Value>) -> Result<String> {
    match value {
        Some(serde_json::Value::String(text)) => Ok(text),
        other => Err(AgentError::transport(format!(
            "page script returned {other:?} instead of a string"
        ))),
    }
}

impl ChromePage {
    async fn capture(tab: Arc<Tab>) -> Result<DomTree> {
        let raw = blocking(move || Ok(tab.evaluate(CAPTURE_JS, false)?.value)).await?;
        let json = string_value(raw)?;
        debug!(bytes = json.len(), "document captured");
        serde_json::from_str(&json)
            .map_err(|err| AgentError::transport(format!("malformed document capture: {err}")))
    }

    async fn screenshot(tab: Arc<Tab>) -> Result<String> {
        let png = blocking(move || {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
    }

    async fn bridge(tab: Arc<Tab>, command: &PageCommand) -> Result<PageReply> {
        let payload = serde_json::to_string(command)
            .map_err(|err| AgentError::transport(err.to_string()))?;
        let script = format!("({BRIDGE_JS})({payload})");
        let raw = blocking(move || Ok(tab.evaluate(&script, false)?.value)).await?;
        let answer: BridgeAnswer = serde_json::from_str(&string_value(raw)?)
            .map_err(|err| AgentError::transport(format!("malformed bridge answer: {err}")))?;
        if let Some(path) = answer.missing {
            return Err(AgentError::ElementNotFound(format!("path `{path}`")));
        }
        if let Some(error) = answer.error {
            return Err(AgentError::transport(error));
        }
        if !answer.ok {
            return Err(AgentError::transport("bridge script did not acknowledge"));
        }
        match command {
            PageCommand::Locate { .. } => Ok(PageReply::Located(answer.located)),
            _ => Ok(PageReply::Ack),
        }
    }
}

#[async_trait]
impl PageTransport for ChromePage {
    async fn request(&self, request: PageRequest) -> Result<PageReply> {
        let tab = self.tab()?;
        match request.command {
            PageCommand::CaptureDocument => Self::capture(tab).await.map(PageReply::Document),
            PageCommand::Screenshot => Self::screenshot(tab).await.map(PageReply::Screenshot),
            command => Self::bridge(tab, &command).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::PageBridge;

    #[tokio::test]
    async fn detached_page_has_no_target() {
        let bridge = PageBridge::new(Arc::new(ChromePage::detached()));
        let err = bridge.capture().await.unwrap_err();
        assert!(matches!(err, AgentError::NoActiveTarget(_)));
    }

    #[test]
    fn bridge_answers_parse() {
        let answer: BridgeAnswer = serde_json::from_str(r#"{"missing":"/html/body/a"}"#).unwrap();
        assert_eq!(answer.missing.as_deref(), Some("/html/body/a"));
        assert!(!answer.ok);

        let answer: BridgeAnswer = serde_json::from_str(
            r#"{"ok":true,"located":{"path":"/html/body/form/button[2]","tag":"button",
                "rect":{"x":10,"y":20,"width":80,"height":30},"focusable":true,"textEntry":false}}"#,
        )
        .unwrap();
        let located = answer.located.unwrap();
        assert_eq!(located.path, "/html/body/form/button[2]");
        assert_eq!(located.center(), (50.0, 35.0));
        assert!(located.focusable && !located.text_entry);

        let answer: BridgeAnswer = serde_json::from_str(r#"{"ok":true,"located":null}"#).unwrap();
        assert!(answer.ok && answer.located.is_none());
    }
}
