use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt::Write as _;
use tracing::debug;

use super::{ApiClient, Envelope, strip_code_fences};
use crate::error::{AgentError, Result};
use crate::types::ElementDescriptor;

pub const DEFAULT_SUMMARY_LIMIT: usize = 20;
const SUMMARY_TEXT_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct VisionRequest {
    pub user_id: String,
    pub dom_elements: Vec<ElementDescriptor>,
    /// Screenshot as a `data:` URL.
    pub screenshot: String,
    pub task: String,
}

/// An action the vision model proposes. Advisory only; plans come from the
/// planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    #[serde(default, rename = "type", alias = "action")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, alias = "rationale")]
    pub reasoning: String,
}

/// What the vision model said about the page.
#[derive(Debug, Clone, PartialEq)]
pub enum VisionAnalysis {
    /// The model answered with the requested JSON shape.
    Structured {
        analysis: String,
        suggested_actions: Vec<SuggestedAction>,
    },
    /// Any other answer, kept verbatim.
    Freeform(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuredBody {
    analysis: String,
    #[serde(default)]
    suggested_actions: Vec<SuggestedAction>,
}

impl VisionAnalysis {
    pub fn text(&self) -> &str {
        match self {
            VisionAnalysis::Structured { analysis, .. } => analysis,
            VisionAnalysis::Freeform(text) => text,
        }
    }

    pub fn suggested_actions(&self) -> &[SuggestedAction] {
        match self {
            VisionAnalysis::Structured {
                suggested_actions, ..
            } => suggested_actions,
            VisionAnalysis::Freeform(_) => &[],
        }
    }

    /// `{analysis, suggestedActions}` form handed to the planner.
    pub fn to_context(&self) -> Value {
        json!({
            "analysis": self.text(),
            "suggestedActions": self.suggested_actions(),
        })
    }
}

/// Parses the model's answer. Never fails: anything that is not the
/// structured shape is kept as free text.
pub fn parse_analysis(raw: &str) -> VisionAnalysis {
    match serde_json::from_str::<StructuredBody>(strip_code_fences(raw)) {
        Ok(body) => VisionAnalysis::Structured {
            analysis: body.analysis,
            suggested_actions: body.suggested_actions,
        },
        Err(err) => {
            debug!(error = %err, "vision answer is free text");
            VisionAnalysis::Freeform(raw.to_string())
        }
    }
}

/// Prompt sent with the screenshot: the task and a numbered summary of the
/// first `limit` elements.
pub fn build_prompt(task: &str, elements: &[ElementDescriptor], limit: usize) -> String {
    let mut summary = String::new();
    for (i, el) in elements.iter().take(limit).enumerate() {
        if i > 0 {
            summary.push('\n');
        }
        let text: String = el
            .text
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(SUMMARY_TEXT_CHARS)
            .collect();
        let _ = write!(summary, "{}. {}", i + 1, el.tag);
        if let Some(id) = &el.id {
            let _ = write!(summary, "#{id}");
        }
        let _ = write!(summary, " - \"{text}\"");
    }
    format!(
        "Task: {task}\n\n\
         Available interactive elements:\n{summary}\n\n\
         Analyze this webpage screenshot and provide:\n\
         1. What you see on the page\n\
         2. Which elements are relevant to the task\n\
         3. Suggested actions to complete the task\n\n\
         Format response as JSON with: {{ analysis: string, suggestedActions: [{{ type, selector, value, reasoning }}] }}"
    )
}

#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn analyze(&self, request: &VisionRequest) -> Result<VisionAnalysis>;
}

pub struct HttpVisionClient {
    api: ApiClient,
    summary_limit: usize,
}

impl HttpVisionClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }

    pub fn with_summary_limit(mut self, limit: usize) -> Self {
        self.summary_limit = limit;
        self
    }
}

#[async_trait]
impl VisionClient for HttpVisionClient {
    async fn analyze(&self, request: &VisionRequest) -> Result<VisionAnalysis> {
        let body = json!({
            "userId": request.user_id,
            "imageData": request.screenshot,
            "prompt": build_prompt(&request.task, &request.dom_elements, self.summary_limit),
        });
        let envelope: Envelope = self
            .api
            .post("/api/vision", &body)
            .await
            .map_err(|err| AgentError::transport(format!("Vision analysis failed: {err}")))?;
        let analysis = match envelope.data.as_ref().and_then(|d| d.get("analysis")) {
            Some(Value::String(text)) => parse_analysis(text),
            Some(other) => parse_analysis(&other.to_string()),
            None => VisionAnalysis::Freeform(String::new()),
        };
        Ok(analysis)
    }
}
