use std::time::Duration;
use tracing::{debug, info};

use crate::bridge::{PageBridge, PageCommand, SyntheticEvent};
use crate::error::{AgentError, Result};
use crate::locator::{ElementLocator, LocatedElement};
use crate::types::{ActionStep, Locator};

/// Applies single primitive actions to the page, synthesizing the events a
/// real user interaction would produce.
#[derive(Clone)]
pub struct ActionExecutor {
    bridge: PageBridge,
    locator: ElementLocator,
    default_wait: Duration,
}

impl ActionExecutor {
    pub fn new(bridge: PageBridge, default_wait: Duration) -> Self {
        Self {
            locator: ElementLocator::new(bridge.clone()),
            bridge,
            default_wait,
        }
    }

    pub fn locator(&self) -> &ElementLocator {
        &self.locator
    }

    /// Wait duration for a planned wait, falling back to the default.
    pub fn wait_duration(&self, millis: Option<u64>) -> Duration {
        millis.map(Duration::from_millis).unwrap_or(self.default_wait)
    }

    pub async fn apply(&self, step: &ActionStep) -> Result<()> {
        match step {
            ActionStep::Click { locator, .. } => self.click(locator.as_ref()).await,
            ActionStep::Type { locator, value, .. } => self.type_text(locator.as_ref(), value).await,
            ActionStep::Scroll { locator, x, y, .. } => {
                self.scroll(locator.as_ref(), *x, *y).await
            }
            ActionStep::Wait { millis, .. } => {
                tokio::time::sleep(self.wait_duration(*millis)).await;
                Ok(())
            }
            // Analysis never touches the page; the engine handles it.
            ActionStep::Analyze { .. } => Ok(()),
        }
    }

    async fn require(&self, locator: Option<&Locator>) -> Result<LocatedElement> {
        let Some(locator) = locator else {
            return Err(AgentError::ElementNotFound("a step without a locator".into()));
        };
        self.locator
            .find(locator)
            .await?
            .ok_or_else(|| AgentError::ElementNotFound(locator.to_string()))
    }

    async fn click(&self, locator: Option<&Locator>) -> Result<()> {
        let element = self.require(locator).await?;
        let (x, y) = element.center();
        info!(target = %element.path, x, y, "click");
        self.bridge
            .send(PageCommand::Dispatch {
                target: element.path.clone(),
                events: vec![
                    SyntheticEvent::PointerDown,
                    SyntheticEvent::PointerUp,
                    SyntheticEvent::Click,
                ],
                x: Some(x),
                y: Some(y),
            })
            .await?;
        if element.focusable {
            self.bridge
                .send(PageCommand::Focus {
                    target: element.path,
                })
                .await?;
        }
        Ok(())
    }

    async fn type_text(&self, locator: Option<&Locator>, value: &str) -> Result<()> {
        let element = self.require(locator).await?;
        if !element.text_entry {
            return Err(AgentError::NotAnInputElement(format!(
                "<{}> at {}",
                element.tag, element.path
            )));
        }
        info!(target = %element.path, chars = value.chars().count(), "type");
        self.bridge
            .send(PageCommand::Focus {
                target: element.path.clone(),
            })
            .await?;
        self.bridge
            .send(PageCommand::SetValue {
                target: element.path.clone(),
                value: value.to_string(),
            })
            .await?;
        self.bridge
            .send(PageCommand::Dispatch {
                target: element.path,
                events: vec![SyntheticEvent::Input, SyntheticEvent::Change],
                x: None,
                y: None,
            })
            .await
    }

    async fn scroll(&self, locator: Option<&Locator>, x: Option<f64>, y: Option<f64>) -> Result<()> {
        if x.is_some() || y.is_some() {
            info!(?x, ?y, "scroll to coordinates");
            return self.bridge.send(PageCommand::ScrollTo { x, y }).await;
        }
        let Some(locator) = locator else {
            debug!("scroll without coordinates or target, nothing to do");
            return Ok(());
        };
        match self.locator.find(locator).await? {
            Some(element) => {
                info!(target = %element.path, "scroll into view");
                self.bridge
                    .send(PageCommand::ScrollIntoView {
                        target: element.path,
                    })
                    .await
            }
            None => {
                debug!(%locator, "scroll target not found, nothing to do");
                Ok(())
            }
        }
    }
}
