use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{ApiClient, Envelope, strip_code_fences};
use crate::error::{AgentError, Result};
use crate::types::ExecutionPlan;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub user_id: String,
    pub goal: String,
    /// JSON text: `{dom, vision, url}`.
    pub context: String,
    pub url: String,
}

#[async_trait]
pub trait PlanClient: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<ExecutionPlan>;
}

pub struct HttpPlanClient {
    api: ApiClient,
}

impl HttpPlanClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PlanClient for HttpPlanClient {
    async fn plan(&self, request: &PlanRequest) -> Result<ExecutionPlan> {
        let envelope: Envelope = self.api.post("/api/plan", request).await?;
        if !envelope.success {
            return Err(AgentError::transport(
                envelope.error.unwrap_or_else(|| "Planning failed".into()),
            ));
        }
        let plan = envelope
            .data
            .and_then(|mut data| data.get_mut("plan").map(Value::take))
            .ok_or_else(|| AgentError::transport("Planning failed: response has no plan"))?;
        let plan = parse_plan(plan, &request.goal)?;
        info!(steps = plan.steps.len(), confidence = plan.confidence, "plan received");
        Ok(plan)
    }
}

/// Accepts a plan object or a JSON string holding one. A plan without a
/// goal inherits the requested goal.
pub fn parse_plan(plan: Value, goal: &str) -> Result<ExecutionPlan> {
    let parsed = match plan {
        Value::String(text) => {
            let cleaned = strip_code_fences(&text);
            debug!(plan = cleaned, "plan delivered as text");
            serde_json::from_str::<ExecutionPlan>(cleaned)
        }
        other => serde_json::from_value::<ExecutionPlan>(other),
    };
    let mut plan = parsed.map_err(|err| AgentError::InvalidPlan(err.to_string()))?;
    if plan.goal.trim().is_empty() {
        plan.goal = goal.to_string();
    }
    Ok(plan.normalized())
}
