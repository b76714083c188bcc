use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::actions::ActionExecutor;
use crate::bridge::PageBridge;
use crate::clients::{VisionClient, VisionRequest};
use crate::cursor::CursorIndicator;
use crate::error::Result;
use crate::session::RunTicket;
use crate::types::{ActionStep, ExecutionPlan, ExecutionResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineTiming {
    /// Pause between moving the cursor and acting.
    pub settle: Duration,
    /// Pause after every executed page action.
    pub step: Duration,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(300),
            step: Duration::from_millis(500),
        }
    }
}

/// Runs a plan's steps in order and reports how far it got.
pub struct ExecutionEngine {
    bridge: PageBridge,
    executor: ActionExecutor,
    vision: Arc<dyn VisionClient>,
    cursor: CursorIndicator,
    user_id: String,
    timing: EngineTiming,
}

impl ExecutionEngine {
    pub fn new(
        bridge: PageBridge,
        executor: ActionExecutor,
        vision: Arc<dyn VisionClient>,
        cursor: CursorIndicator,
        user_id: impl Into<String>,
        timing: EngineTiming,
    ) -> Self {
        Self {
            bridge,
            executor,
            vision,
            cursor,
            user_id: user_id.into(),
            timing,
        }
    }

    /// Executes `plan`. Never fails outward: the first failing step ends the
    /// run and its error is carried on the result.
    pub async fn run(&self, plan: &ExecutionPlan, ticket: &RunTicket) -> ExecutionResult {
        let mut result = ExecutionResult::new(plan.steps.len());
        self.cursor.show().await;
        let outcome = self.run_steps(plan, ticket, &mut result).await;
        self.cursor.hide().await;
        match outcome {
            Ok(()) => result.success = true,
            Err(err) => {
                info!(
                    completed = result.completed_steps,
                    total = result.total_steps,
                    error = %err,
                    "execution stopped"
                );
                result.record_error(&err);
            }
        }
        result
    }

    async fn run_steps(
        &self,
        plan: &ExecutionPlan,
        ticket: &RunTicket,
        result: &mut ExecutionResult,
    ) -> Result<()> {
        for (index, step) in plan.steps.iter().enumerate() {
            ticket.ensure_active()?;
            debug!(step = index, kind = %step.kind(), rationale = step.rationale(), "executing step");
            match step {
                ActionStep::Analyze { rationale } => {
                    let task = if rationale.trim().is_empty() {
                        format!("Analyze page to accomplish: {}", plan.goal)
                    } else {
                        rationale.clone()
                    };
                    let screenshot = self.bridge.screenshot().await?;
                    let analysis = self
                        .vision
                        .analyze(&VisionRequest {
                            user_id: self.user_id.clone(),
                            dom_elements: Vec::new(),
                            screenshot,
                            task,
                        })
                        .await?;
                    result.final_state = Some(analysis.text().to_string());
                }
                ActionStep::Wait { millis, .. } => {
                    tokio::time::sleep(self.executor.wait_duration(*millis)).await;
                }
                other => {
                    if let Some(locator) = other.locator()
                        && let Some(element) = self.executor.locator().find(locator).await?
                    {
                        let (x, y) = element.center();
                        self.cursor.move_to(x, y).await;
                        tokio::time::sleep(self.timing.settle).await;
                        self.cursor.pulse().await;
                    }
                    self.executor.apply(other).await?;
                    result.completed_steps += 1;
                    tokio::time::sleep(self.timing.step).await;
                    continue;
                }
            }
            result.completed_steps += 1;
        }
        Ok(())
    }
}
