use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AgentError, ErrorKind};

/// Layout rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// One interactive element as seen in a page snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(rename = "xpath")]
    pub path: String,
    pub selector: String,
    pub is_interactive: bool,
    pub bounding_box: BoundingBox,
}

/// A reference used to find an element again at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Locator {
    /// CSS selector, first match wins.
    Query(String),
    /// XPath such as `/html/body/div[2]/a` or `//*[@id="x"]`.
    Path(String),
}

impl Locator {
    /// Models sometimes put a path in the selector slot; a leading `/` is
    /// never valid query syntax so it is read as a path.
    pub fn from_selector(selector: &str) -> Self {
        let trimmed = selector.trim();
        if trimmed.starts_with('/') {
            Locator::Path(trimmed.to_string())
        } else {
            Locator::Query(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Locator::Query(q) => q,
            Locator::Path(p) => p,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Query(q) => write!(f, "query `{q}`"),
            Locator::Path(p) => write!(f, "path `{p}`"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Click,
    Type,
    Scroll,
    Wait,
    Analyze,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Click => "click",
            StepKind::Type => "type",
            StepKind::Scroll => "scroll",
            StepKind::Wait => "wait",
            StepKind::Analyze => "analyze",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step of an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireStep", into = "WireStep")]
pub enum ActionStep {
    Click {
        locator: Option<Locator>,
        rationale: String,
    },
    Type {
        locator: Option<Locator>,
        value: String,
        rationale: String,
    },
    Scroll {
        locator: Option<Locator>,
        x: Option<f64>,
        y: Option<f64>,
        rationale: String,
    },
    /// `millis` is `None` when the plan gave no usable duration.
    Wait {
        millis: Option<u64>,
        rationale: String,
    },
    Analyze {
        rationale: String,
    },
}

impl ActionStep {
    pub fn click(selector: &str) -> Self {
        ActionStep::Click {
            locator: Some(Locator::from_selector(selector)),
            rationale: String::new(),
        }
    }

    pub fn type_text(selector: &str, value: &str) -> Self {
        ActionStep::Type {
            locator: Some(Locator::from_selector(selector)),
            value: value.to_string(),
            rationale: String::new(),
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            ActionStep::Click { .. } => StepKind::Click,
            ActionStep::Type { .. } => StepKind::Type,
            ActionStep::Scroll { .. } => StepKind::Scroll,
            ActionStep::Wait { .. } => StepKind::Wait,
            ActionStep::Analyze { .. } => StepKind::Analyze,
        }
    }

    pub fn locator(&self) -> Option<&Locator> {
        match self {
            ActionStep::Click { locator, .. }
            | ActionStep::Type { locator, .. }
            | ActionStep::Scroll { locator, .. } => locator.as_ref(),
            ActionStep::Wait { .. } | ActionStep::Analyze { .. } => None,
        }
    }

    pub fn rationale(&self) -> &str {
        match self {
            ActionStep::Click { rationale, .. }
            | ActionStep::Type { rationale, .. }
            | ActionStep::Scroll { rationale, .. }
            | ActionStep::Wait { rationale, .. }
            | ActionStep::Analyze { rationale } => rationale,
        }
    }

    /// The memory form of this step. Analyze and wait steps are not page
    /// actions and yield `None`.
    pub fn to_recorded(&self) -> Option<RecordedAction> {
        let wire = WireStep::from(self.clone());
        let kind = match self.kind() {
            StepKind::Analyze | StepKind::Wait => return None,
            kind => kind,
        };
        Some(RecordedAction {
            kind,
            selector: wire.selector,
            xpath: wire.xpath,
            value: wire.value.and_then(|v| v.as_str().map(String::from)),
            x: wire.x,
            y: wire.y,
        })
    }
}

/// JSON shape of a step as exchanged with the planning service.
#[doc(hidden)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireStep {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    y: Option<f64>,
    #[serde(default, alias = "rationale")]
    reasoning: Option<String>,
}

impl WireStep {
    fn locator(&self) -> Option<Locator> {
        if let Some(selector) = non_empty(&self.selector) {
            return Some(Locator::from_selector(selector));
        }
        non_empty(&self.xpath).map(|p| Locator::Path(p.to_string()))
    }

    fn value_text(&self) -> Option<String> {
        match &self.value {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Reads the leading decimal digits of `raw`, ignoring surrounding
/// whitespace, so `"1500"`, `" 250ms"` and `"2.5"` give 1500, 250 and 2.
pub fn parse_millis(raw: &str) -> Option<u64> {
    let digits: String = raw
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

impl TryFrom<WireStep> for ActionStep {
    type Error = String;

    fn try_from(wire: WireStep) -> Result<Self, Self::Error> {
        let rationale = wire.reasoning.clone().unwrap_or_default();
        let locator = wire.locator();
        let step = match wire.kind.trim().to_ascii_lowercase().as_str() {
            "click" => ActionStep::Click { locator, rationale },
            "type" => ActionStep::Type {
                locator,
                value: wire.value_text().unwrap_or_default(),
                rationale,
            },
            "scroll" => ActionStep::Scroll {
                locator,
                x: wire.x,
                y: wire.y,
                rationale,
            },
            "wait" => ActionStep::Wait {
                millis: wire.value_text().as_deref().and_then(parse_millis),
                rationale,
            },
            "analyze" => ActionStep::Analyze { rationale },
            other => return Err(format!("unknown step type `{other}`")),
        };
        Ok(step)
    }
}

impl From<ActionStep> for WireStep {
    fn from(step: ActionStep) -> Self {
        let kind = step.kind().as_str().to_string();
        let mut wire = WireStep {
            kind,
            ..WireStep::default()
        };
        let locator = step.locator().cloned();
        match locator {
            Some(Locator::Query(q)) => wire.selector = Some(q),
            Some(Locator::Path(p)) => wire.xpath = Some(p),
            None => {}
        }
        match step {
            ActionStep::Type {
                value, rationale, ..
            } => {
                wire.value = Some(serde_json::Value::String(value));
                wire.reasoning = Some(rationale);
            }
            ActionStep::Scroll { x, y, rationale, .. } => {
                wire.x = x;
                wire.y = y;
                wire.reasoning = Some(rationale);
            }
            ActionStep::Wait { millis, rationale } => {
                wire.value = millis.map(|ms| serde_json::Value::String(ms.to_string()));
                wire.reasoning = Some(rationale);
            }
            ActionStep::Click { rationale, .. } | ActionStep::Analyze { rationale } => {
                wire.reasoning = Some(rationale);
            }
        }
        wire
    }
}

/// Ordered steps produced by one planning call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub steps: Vec<ActionStep>,
    #[serde(default)]
    pub confidence: f64,
}

impl ExecutionPlan {
    pub fn new(goal: impl Into<String>, steps: Vec<ActionStep>, confidence: f64) -> Self {
        Self {
            goal: goal.into(),
            steps,
            confidence,
        }
        .normalized()
    }

    /// Clamps confidence into `[0, 1]`; non-finite values become 0.
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// Step-level report of one plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub completed_steps: usize,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<String>,
}

impl ExecutionResult {
    pub fn new(total_steps: usize) -> Self {
        Self {
            success: false,
            completed_steps: 0,
            total_steps,
            error: None,
            error_kind: None,
            final_state: None,
        }
    }

    pub fn record_error(&mut self, err: &AgentError) {
        self.success = false;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
    }
}

/// A page action as stored in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAction {
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl fmt::Display for RecordedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(target) = self.selector.as_deref().or(self.xpath.as_deref()) {
            write!(f, " {target}")?;
        }
        match self.value.as_deref() {
            Some(value) if !value.is_empty() => write!(f, " = {value}"),
            _ => Ok(()),
        }
    }
}

/// One remembered attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub task: String,
    #[serde(default)]
    pub actions: Vec<RecordedAction>,
    #[serde(default)]
    pub dom_context: Vec<ElementDescriptor>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub timestamp: u64,
}

impl MemoryEntry {
    /// Human-readable line block stored next to the entry.
    pub fn summary(&self) -> String {
        let actions = self
            .actions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Task: {}\nActions: {}\nResult: {}",
            self.task,
            actions,
            if self.success { "Success" } else { "Failed" }
        )
    }
}

/// Outcome of one orchestrator attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningResult {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionResult>,
    pub learned: bool,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub attempt: u32,
}

impl ReasoningResult {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            analysis: None,
            plan: None,
            execution: None,
            learned: false,
            success: false,
            error: None,
            error_kind: None,
            attempt: 1,
        }
    }

    pub fn record_error(&mut self, err: &AgentError) {
        self.success = false;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
    }
}
