use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use surf_agent::agent::Clients;
use surf_agent::bridge::PageCommand;
use surf_agent::clients::{
    InMemoryMemory, MemoryClient, PlanClient, PlanRequest, VisionAnalysis, VisionClient,
    VisionRequest,
};
use surf_agent::dom::{DomElement, DomTree};
use surf_agent::error::Result;
use surf_agent::simulated::SimulatedPage;
use surf_agent::{
    ActionStep, Agent, AgentConfig, AgentError, ErrorKind, ExecutionPlan, MemoryEntry,
};

fn login_page() -> DomTree {
    DomTree::new(
        "https://app.test/login",
        DomElement::new("html").child(
            DomElement::new("body").rect(0.0, 0.0, 1280.0, 800.0).child(
                DomElement::new("form")
                    .rect(100.0, 100.0, 400.0, 200.0)
                    .child(
                        DomElement::new("input")
                            .id("user")
                            .attr("type", "text")
                            .rect(120.0, 120.0, 200.0, 30.0),
                    )
                    .child(
                        DomElement::new("button")
                            .id("login")
                            .rect(120.0, 170.0, 100.0, 40.0)
                            .text("Log in"),
                    ),
            ),
        ),
    )
    .title("Login")
}

#[derive(Default)]
struct FakePlanner {
    plans: Mutex<VecDeque<Result<ExecutionPlan>>>,
    requests: Mutex<Vec<PlanRequest>>,
    gate: Option<Arc<Notify>>,
}

impl FakePlanner {
    fn answering(plans: Vec<Result<ExecutionPlan>>) -> Self {
        Self {
            plans: Mutex::new(plans.into()),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PlanClient for FakePlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<ExecutionPlan> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::transport("Planning failed")))
    }
}

struct FakeVision {
    answer: VisionAnalysis,
}

#[async_trait]
impl VisionClient for FakeVision {
    async fn analyze(&self, _request: &VisionRequest) -> Result<VisionAnalysis> {
        Ok(self.answer.clone())
    }
}

/// Recalls one past success and refuses every write.
#[derive(Default)]
struct UnwritableMemory {
    writes: Mutex<usize>,
}

#[async_trait]
impl MemoryClient for UnwritableMemory {
    async fn store(&self, _user_id: &str, _entry: &MemoryEntry) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        Err(AgentError::transport("Memory storage failed"))
    }

    async fn recall(&self, _user_id: &str, query: &str) -> Vec<MemoryEntry> {
        vec![MemoryEntry {
            task: query.to_string(),
            actions: Vec::new(),
            dom_context: Vec::new(),
            success: true,
            timestamp: 1,
        }]
    }
}

struct Harness {
    page: Arc<SimulatedPage>,
    planner: Arc<FakePlanner>,
    memory: Arc<InMemoryMemory>,
    agent: Arc<Agent>,
}

fn build(
    planner: Arc<FakePlanner>,
    memory: Arc<dyn MemoryClient>,
    max_retries: u32,
) -> (Arc<SimulatedPage>, Arc<Agent>) {
    let page = Arc::new(SimulatedPage::new(login_page()));
    let clients = Clients {
        planner,
        vision: Arc::new(FakeVision {
            answer: VisionAnalysis::Freeform("a login form".into()),
        }),
        memory,
    };
    let config = AgentConfig {
        max_retries,
        ..AgentConfig::default()
    };
    let agent = Arc::new(Agent::new(config, page.clone(), clients));
    (page, agent)
}

fn harness(planner: FakePlanner, max_retries: u32) -> Harness {
    let planner = Arc::new(planner);
    let memory = Arc::new(InMemoryMemory::new());
    let (page, agent) = build(planner.clone(), memory.clone(), max_retries);
    Harness {
        page,
        planner,
        memory,
        agent,
    }
}

fn plan(steps: Vec<ActionStep>, confidence: f64) -> ExecutionPlan {
    ExecutionPlan::new("log in", steps, confidence)
}

#[tokio::test(start_paused = true)]
async fn confident_click_plan_succeeds_and_is_remembered() {
    let h = harness(
        FakePlanner::answering(vec![Ok(plan(vec![ActionStep::click("#login")], 0.9))]),
        2,
    );
    let result = h.agent.run("log in").await.unwrap();

    assert!(result.success, "{result:?}");
    let execution = result.execution.unwrap();
    assert_eq!((execution.completed_steps, execution.total_steps), (1, 1));
    assert_eq!(result.attempt, 1);
    assert!(result.learned);
    assert_eq!(result.analysis.as_deref(), Some("a login form"));

    let clicks: Vec<_> = h
        .page
        .events()
        .into_iter()
        .map(|e| (e.target, e.event.dom_name()))
        .collect();
    assert_eq!(
        clicks,
        [
            ("/html/body/form/button".to_string(), "mousedown"),
            ("/html/body/form/button".to_string(), "mouseup"),
            ("/html/body/form/button".to_string(), "click"),
        ]
    );
    assert!(!h.page.cursor().visible);
    assert!(!h.agent.is_running());

    let entries = h.memory.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].success);
    assert_eq!(entries[0].actions[0].to_string(), "click #login");
    assert_eq!(entries[0].dom_context.len(), 2);
    assert_eq!(
        entries[0].summary(),
        "Task: log in\nActions: click #login\nResult: Success"
    );
}

#[tokio::test(start_paused = true)]
async fn low_confidence_plan_never_touches_the_page() {
    let h = harness(
        FakePlanner::answering(vec![Ok(plan(vec![ActionStep::click("#login")], 0.1))]),
        0,
    );
    let result = h.agent.run("log in").await.unwrap();

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::LowConfidencePlan));
    assert!(result.error.unwrap().starts_with("LowConfidencePlan"));
    assert!(result.execution.is_none());
    assert!(h.page.commands().iter().all(|c| !matches!(
        c,
        PageCommand::Dispatch { .. } | PageCommand::Cursor { .. }
    )));

    let entries = h.memory.entries();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
    assert!(entries[0].actions.is_empty() && entries[0].dom_context.is_empty());
}

#[tokio::test(start_paused = true)]
async fn typing_into_a_button_fails_without_progress() {
    let h = harness(
        FakePlanner::answering(vec![Ok(plan(
            vec![
                ActionStep::type_text("#login", "ada"),
                ActionStep::click("#login"),
            ],
            0.9,
        ))]),
        0,
    );
    let result = h.agent.run("log in").await.unwrap();

    let execution = result.execution.clone().unwrap();
    assert!(!execution.success);
    assert_eq!(execution.completed_steps, 0);
    assert_eq!(execution.error_kind, Some(ErrorKind::NotAnInputElement));
    assert_eq!(result.error_kind, Some(ErrorKind::NotAnInputElement));
    assert!(h.page.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_execution_is_remembered_with_its_plan() {
    let h = harness(
        FakePlanner::answering(vec![Ok(plan(
            vec![
                ActionStep::click("#login"),
                ActionStep::Wait {
                    millis: Some(100),
                    rationale: String::new(),
                },
                ActionStep::click("#missing"),
            ],
            0.9,
        ))]),
        0,
    );
    let result = h.agent.run("log in").await.unwrap();

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::ElementNotFound));
    assert_eq!(result.execution.as_ref().unwrap().completed_steps, 2);
    assert!(result.learned);

    let entries = h.memory.entries();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
    let actions: Vec<String> = entries[0].actions.iter().map(|a| a.to_string()).collect();
    assert_eq!(actions, ["click #login", "click #missing"]);
    assert_eq!(entries[0].dom_context.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn memory_write_failure_keeps_a_successful_attempt() {
    let planner = Arc::new(FakePlanner::answering(vec![Ok(plan(
        vec![ActionStep::click("#login")],
        0.9,
    ))]));
    let memory = Arc::new(UnwritableMemory::default());
    let (page, agent) = build(planner.clone(), memory.clone(), 2);
    let result = agent.run("log in").await.unwrap();

    assert!(result.success, "{result:?}");
    assert!(result.learned);
    assert_eq!(result.attempt, 1);
    assert!(result.error.is_none());
    assert_eq!(*memory.writes.lock().unwrap(), 1);
    assert_eq!(planner.calls(), 1);
    assert_eq!(page.events().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn empty_recall_leaves_the_attempt_unaffected() {
    let h = harness(
        FakePlanner::answering(vec![Ok(plan(vec![ActionStep::click("#login")], 0.9))]),
        0,
    );
    assert!(h.memory.entries().is_empty());
    let result = h.agent.run("log in").await.unwrap();
    assert!(result.success);
    assert_eq!(h.planner.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn planner_selectors_follow_css_semantics() {
    let h = harness(
        FakePlanner::answering(vec![Ok(plan(
            vec![
                ActionStep::type_text("input[type=\"TEXT\" i]:not([disabled])", "ada"),
                ActionStep::click("form > button:nth-of-type(1)"),
            ],
            0.9,
        ))]),
        0,
    );
    let result = h.agent.run("log in").await.unwrap();

    assert!(result.success, "{result:?}");
    assert_eq!(h.page.value_at("/html/body/form/input").as_deref(), Some("ada"));
    let targets: Vec<String> = h.page.events().into_iter().map(|e| e.target).collect();
    assert!(targets.contains(&"/html/body/form/button".to_string()));
    assert!(targets.contains(&"/html/body/form/input".to_string()));
}

#[tokio::test(start_paused = true)]
async fn failing_attempts_are_retried_with_backoff() {
    let h = harness(FakePlanner::default(), 2);
    let start = tokio::time::Instant::now();
    let result = h.agent.run("log in").await.unwrap();

    assert!(!result.success);
    assert_eq!(result.attempt, 3);
    assert_eq!(result.error_kind, Some(ErrorKind::TransportFailure));
    assert_eq!(h.planner.calls(), 3);
    assert_eq!(h.memory.entries().len(), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(4000));
}

#[tokio::test(start_paused = true)]
async fn second_run_is_rejected_while_first_continues() {
    let gate = Arc::new(Notify::new());
    let planner = FakePlanner {
        gate: Some(gate.clone()),
        ..FakePlanner::answering(vec![Ok(plan(vec![ActionStep::click("#login")], 0.9))])
    };
    let h = harness(planner, 0);

    let agent = h.agent.clone();
    let first = tokio::spawn(async move { agent.run("log in").await });
    while h.planner.calls() == 0 {
        tokio::task::yield_now().await;
    }
    assert!(h.agent.is_running());
    let err = h.agent.run("something else").await.unwrap_err();
    assert_eq!(err, AgentError::AlreadyRunning);

    gate.notify_one();
    let result = first.await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(h.planner.calls(), 1);
    assert!(!h.agent.is_running());
}

#[tokio::test(start_paused = true)]
async fn stop_during_planning_cancels_and_frees_the_session_on_return() {
    let gate = Arc::new(Notify::new());
    let planner = FakePlanner {
        gate: Some(gate.clone()),
        ..FakePlanner::answering(vec![
            Ok(plan(vec![ActionStep::click("#login")], 0.9)),
            Ok(plan(vec![ActionStep::click("#login")], 0.9)),
        ])
    };
    let h = harness(planner, 2);

    let agent = h.agent.clone();
    let run = tokio::spawn(async move { agent.run("log in").await });
    while h.planner.calls() == 0 {
        tokio::task::yield_now().await;
    }
    h.agent.stop().await;
    assert!(!h.agent.is_running());
    let err = h.agent.run("log in").await.unwrap_err();
    assert_eq!(err, AgentError::AlreadyRunning);
    gate.notify_one();

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(result.attempt, 1);
    assert_eq!(h.planner.calls(), 1);
    assert!(h.page.events().is_empty());

    gate.notify_one();
    let next = h.agent.run("log in").await.unwrap();
    assert!(next.success, "{next:?}");
    assert_eq!(next.attempt, 1);
    assert_eq!(h.planner.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn planner_sees_snapshot_and_freeform_vision() {
    let h = harness(
        FakePlanner::answering(vec![Ok(plan(Vec::new(), 0.9))]),
        0,
    );
    let result = h.agent.run("  log <in>  ").await.unwrap();
    assert!(result.success);
    assert_eq!(result.goal, "log in");

    let request = h.planner.requests.lock().unwrap()[0].clone();
    assert_eq!(request.goal, "log in");
    assert_eq!(request.user_id, "web-user");
    assert_eq!(request.url, "https://app.test/login");
    let context: serde_json::Value = serde_json::from_str(&request.context).unwrap();
    assert_eq!(context["vision"]["analysis"], "a login form");
    assert_eq!(context["vision"]["suggestedActions"], serde_json::json!([]));
    assert_eq!(context["dom"][0]["xpath"], "//*[@id=\"user\"]");
    assert_eq!(context["dom"][1]["selector"], "#login");
    assert_eq!(context["url"], "https://app.test/login");
}

#[tokio::test]
async fn snapshot_lists_interactive_elements() {
    let h = harness(FakePlanner::default(), 0);
    let elements = h.agent.snapshot(1).await.unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].tag, "input");
}
