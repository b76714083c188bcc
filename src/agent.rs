use std::sync::Arc;
use tracing::info;

use crate::actions::ActionExecutor;
use crate::bridge::{PageBridge, PageTransport};
use crate::clients::{
    ApiClient, HttpMemoryClient, HttpPlanClient, HttpVisionClient, MemoryClient, PlanClient,
    VisionClient,
};
use crate::config::AgentConfig;
use crate::cursor::CursorIndicator;
use crate::engine::{EngineTiming, ExecutionEngine};
use crate::error::{AgentError, Result};
use crate::orchestrator::{Orchestrator, OrchestratorSettings, Reasoner};
use crate::retry::RetryController;
use crate::session::AgentSession;
use crate::snapshot;
use crate::types::{ElementDescriptor, ReasoningResult};

const MAX_GOAL_CHARS: usize = 10_000;

/// Removes angle brackets, trims, and caps the length of a user goal.
pub fn sanitize_goal(raw: &str) -> String {
    raw.replace(['<', '>'], "")
        .trim()
        .chars()
        .take(MAX_GOAL_CHARS)
        .collect()
}

/// The remote collaborators an [`Agent`] talks to.
#[derive(Clone)]
pub struct Clients {
    pub planner: Arc<dyn PlanClient>,
    pub vision: Arc<dyn VisionClient>,
    pub memory: Arc<dyn MemoryClient>,
}

impl Clients {
    /// HTTP clients for the configured API base.
    pub fn http(config: &AgentConfig) -> Result<Self> {
        let api = ApiClient::new(&config.api_base, config.api_key.clone())?;
        Ok(Self {
            planner: Arc::new(HttpPlanClient::new(api.clone())),
            vision: Arc::new(
                HttpVisionClient::new(api.clone()).with_summary_limit(config.vision_summary_limit),
            ),
            memory: Arc::new(HttpMemoryClient::new(api)),
        })
    }
}

/// Entry point: one page, one session, one task at a time.
pub struct Agent {
    config: AgentConfig,
    bridge: PageBridge,
    session: Arc<AgentSession>,
    retry: RetryController<Orchestrator>,
}

impl Agent {
    pub fn new(config: AgentConfig, transport: Arc<dyn PageTransport>, clients: Clients) -> Self {
        let bridge = PageBridge::new(transport);
        let cursor = CursorIndicator::new(bridge.clone());
        let session = AgentSession::new(cursor.clone());
        let engine = ExecutionEngine::new(
            bridge.clone(),
            ActionExecutor::new(bridge.clone(), config.default_wait()),
            clients.vision.clone(),
            cursor,
            config.user_id.clone(),
            EngineTiming {
                settle: config.settle_delay(),
                step: config.step_delay(),
            },
        );
        let orchestrator = Orchestrator::new(
            bridge.clone(),
            engine,
            clients.planner,
            clients.vision,
            clients.memory,
            OrchestratorSettings {
                user_id: config.user_id.clone(),
                confidence_threshold: config.confidence_threshold,
                snapshot_limit: config.snapshot_limit,
                context_limit: config.context_limit,
                memory_context_limit: config.memory_context_limit,
            },
        );
        let retry = RetryController::new(orchestrator)
            .with_backoff(config.retry_backoff())
            .with_memory(config.use_memory);
        Self {
            config,
            bridge,
            session,
            retry,
        }
    }

    /// An agent backed by the HTTP plan, vision and memory endpoints.
    pub fn with_http_clients(config: AgentConfig, transport: Arc<dyn PageTransport>) -> Result<Self> {
        config.validate()?;
        let clients = Clients::http(&config)?;
        Ok(Self::new(config, transport, clients))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<AgentSession> {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Runs `goal` with retries. Fails only when another run is active or
    /// the goal is empty; every other failure is reported on the result.
    pub async fn run(&self, goal: &str) -> Result<ReasoningResult> {
        let goal = checked_goal(goal)?;
        let ticket = self.session.begin()?;
        info!(goal = %goal, max_retries = self.config.max_retries, "run started");
        Ok(self
            .retry
            .attempt(&goal, self.config.max_retries, &ticket)
            .await)
    }

    /// A single attempt without retries.
    pub async fn run_once(&self, goal: &str, use_memory: bool) -> Result<ReasoningResult> {
        let goal = checked_goal(goal)?;
        let ticket = self.session.begin()?;
        Ok(self.retry.reasoner().reason(&goal, use_memory, &ticket).await)
    }

    pub async fn stop(&self) {
        self.session.stop().await;
    }

    /// Interactive elements on the current page.
    pub async fn snapshot(&self, max_elements: usize) -> Result<Vec<ElementDescriptor>> {
        let doc = self.bridge.capture().await?;
        Ok(snapshot::extract(&doc, max_elements))
    }
}

fn checked_goal(raw: &str) -> Result<String> {
    let goal = sanitize_goal(raw);
    if goal.is_empty() {
        return Err(AgentError::InvalidPlan("the goal is empty".into()));
    }
    Ok(goal)
}
