use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{Instrument, info, info_span, warn};

use crate::bridge::PageBridge;
use crate::clients::{MemoryClient, PlanClient, PlanRequest, VisionClient, VisionRequest};
use crate::engine::ExecutionEngine;
use crate::error::{AgentError, Result};
use crate::session::RunTicket;
use crate::snapshot;
use crate::types::{ElementDescriptor, ExecutionResult, MemoryEntry, ReasoningResult};

/// One full attempt at a goal.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, goal: &str, use_memory: bool, ticket: &RunTicket) -> ReasoningResult;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub user_id: String,
    pub confidence_threshold: f64,
    pub snapshot_limit: usize,
    /// Descriptors sent to the planner.
    pub context_limit: usize,
    /// Descriptors stored with a memory entry.
    pub memory_context_limit: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            user_id: "web-user".into(),
            confidence_threshold: 0.3,
            snapshot_limit: snapshot::DEFAULT_MAX_ELEMENTS,
            context_limit: 50,
            memory_context_limit: 10,
        }
    }
}

/// Runs recall, analyze, plan, act and learn in that order.
pub struct Orchestrator {
    bridge: PageBridge,
    engine: ExecutionEngine,
    planner: Arc<dyn PlanClient>,
    vision: Arc<dyn VisionClient>,
    memory: Arc<dyn MemoryClient>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        bridge: PageBridge,
        engine: ExecutionEngine,
        planner: Arc<dyn PlanClient>,
        vision: Arc<dyn VisionClient>,
        memory: Arc<dyn MemoryClient>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            bridge,
            engine,
            planner,
            vision,
            memory,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    async fn recall(&self, goal: &str) {
        let past = self.memory.recall(&self.settings.user_id, goal).await;
        if let Some(top) = past.first()
            && top.success
        {
            info!(task = %top.task, actions = top.actions.len(), "a similar task succeeded before");
        }
    }

    /// ANALYZE, PLAN and ACT. Fills `result` as phases complete and returns
    /// the execution report, or the error that ended the attempt early.
    async fn run_phases(
        &self,
        goal: &str,
        ticket: &RunTicket,
        result: &mut ReasoningResult,
        elements: &mut Vec<ElementDescriptor>,
    ) -> Result<ExecutionResult> {
        ticket.ensure_active()?;
        let doc = self.bridge.capture().await?;
        *elements = snapshot::extract(&doc, self.settings.snapshot_limit);
        let screenshot = self.bridge.screenshot().await?;
        let analysis = self
            .vision
            .analyze(&VisionRequest {
                user_id: self.settings.user_id.clone(),
                dom_elements: elements.clone(),
                screenshot,
                task: format!("Analyze page to accomplish: {goal}"),
            })
            .await?;
        info!(phase = "analyze", elements = elements.len(), "page analyzed");
        result.analysis = Some(analysis.text().to_string());

        ticket.ensure_active()?;
        let dom = &elements[..elements.len().min(self.settings.context_limit)];
        let context = json!({
            "dom": dom,
            "vision": analysis.to_context(),
            "url": doc.url,
        });
        let plan = self
            .planner
            .plan(&PlanRequest {
                user_id: self.settings.user_id.clone(),
                goal: goal.to_string(),
                context: context.to_string(),
                url: doc.url.clone(),
            })
            .await?;
        info!(
            phase = "plan",
            steps = plan.steps.len(),
            confidence = plan.confidence,
            "plan ready"
        );
        result.plan = Some(plan.clone());
        if plan.confidence < self.settings.confidence_threshold {
            return Err(AgentError::LowConfidencePlan {
                confidence: plan.confidence,
                threshold: self.settings.confidence_threshold,
            });
        }

        ticket.ensure_active()?;
        Ok(self.engine.run(&plan, ticket).await)
    }

    /// Attempts that reached ACT record the plan's page actions and the
    /// snapshot whatever the outcome; earlier failures record neither.
    async fn learn(&self, result: &ReasoningResult, elements: Vec<ElementDescriptor>) {
        let (actions, dom_context) = match (&result.plan, &result.execution) {
            (Some(plan), Some(_)) => (
                plan.steps.iter().filter_map(|s| s.to_recorded()).collect(),
                elements
                    .into_iter()
                    .take(self.settings.memory_context_limit)
                    .collect(),
            ),
            _ => (Vec::new(), Vec::new()),
        };
        let entry = MemoryEntry {
            task: result.goal.clone(),
            actions,
            dom_context,
            success: result.success,
            timestamp: now_millis(),
        };
        if let Err(err) = self.memory.store(&self.settings.user_id, &entry).await {
            warn!(error = %err, "failed to store memory");
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[async_trait]
impl Reasoner for Orchestrator {
    async fn reason(&self, goal: &str, use_memory: bool, ticket: &RunTicket) -> ReasoningResult {
        let span = info_span!("attempt", goal = %goal, generation = ticket.generation());
        async move {
            let mut result = ReasoningResult::new(goal);
            if use_memory {
                self.recall(goal).await;
            }

            let mut elements = Vec::new();
            match self.run_phases(goal, ticket, &mut result, &mut elements).await {
                Ok(execution) => {
                    result.success = execution.success;
                    if !execution.success {
                        result.error = execution.error.clone();
                        result.error_kind = execution.error_kind;
                    }
                    result.execution = Some(execution);
                }
                Err(err) => {
                    warn!(error = %err, "attempt failed");
                    result.record_error(&err);
                }
            }

            if use_memory {
                self.learn(&result, elements).await;
                result.learned = true;
            }
            info!(success = result.success, "attempt finished");
            result
        }
        .instrument(span)
        .await
    }
}
