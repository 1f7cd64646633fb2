//! 编排器集成测试：多回合对话驱动槽位、计划与执行

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use tripmind::core::{ErrorKind, RecoveryAction, TripError, TripOrchestrator, TurnStatus};
use tripmind::dialogue::{
    Intent, IntentDecision, KeywordClassifier, SemanticClassifier, SlotExtraction, SlotName,
    TripContext,
};
use tripmind::memory::Message;
use tripmind::planning::{PlanExecutor, StepKind, StepStatus};
use tripmind::session::{MemoryThreadStore, SqliteThreadStore, ThreadId, ThreadState, ThreadStore};
use tripmind::tools::{Tool, ToolExecutor, ToolRegistry};

const FULL_REQUEST: &str = "Plan a trip to Goa from Delhi on 2025-12-10 for 4 days, 2 people";

#[derive(Clone)]
enum Reply {
    Value(Value),
    Fail(&'static str),
    Slow(u64, Value),
}

struct ScriptedTool {
    name: &'static str,
    reply: Reply,
    calls: Arc<AtomicUsize>,
    last_args: Arc<std::sync::Mutex<Option<Value>>>,
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "scripted test tool"
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = Some(args);
        match &self.reply {
            Reply::Value(v) => Ok(v.clone()),
            Reply::Fail(e) => Err(e.to_string()),
            Reply::Slow(ms, v) => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(v.clone())
            }
        }
    }
}

fn offer(price: u32) -> Value {
    json!({
        "price": price,
        "currency": "USD",
        "departure_airport": "DEL",
        "arrival_airport": "GOI",
        "departure_time": "2025-12-10T06:00",
        "airline": "IndiGo"
    })
}

struct Harness {
    calls: Arc<AtomicUsize>,
    flight_args: Arc<std::sync::Mutex<Option<Value>>>,
    registry: ToolRegistry,
}

impl Harness {
    fn new(flights: Reply) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let flight_args = Arc::new(std::sync::Mutex::new(None));
        let mut registry = ToolRegistry::new();
        let replies = [
            ("flight_search", flights),
            ("weather", Reply::Value(json!("Sunny, 31°C"))),
            ("activities", Reply::Value(json!("1. Beach walk\n2. Spice farm"))),
            ("nearby_places", Reply::Value(json!("Fort Aguada"))),
            ("budget_estimator", Reply::Value(json!("Estimated total: USD 900"))),
            ("itinerary_assembler", Reply::Value(json!("Day 1: arrive in Goa"))),
        ];
        for (name, reply) in replies {
            let last_args = if name == "flight_search" {
                flight_args.clone()
            } else {
                Arc::new(std::sync::Mutex::new(None))
            };
            registry.register(ScriptedTool {
                name,
                reply,
                calls: calls.clone(),
                last_args,
            });
        }
        Self {
            calls,
            flight_args,
            registry,
        }
    }

    fn orchestrator(
        self,
        store: Arc<dyn ThreadStore>,
        timeout: Duration,
    ) -> (
        TripOrchestrator,
        Arc<AtomicUsize>,
        Arc<std::sync::Mutex<Option<Value>>>,
    ) {
        let tools = ToolExecutor::new(self.registry, 15).with_timeout(timeout);
        let orchestrator = TripOrchestrator::new(
            Arc::new(KeywordClassifier::new()),
            PlanExecutor::new(tools),
            store,
        );
        (orchestrator, self.calls, self.flight_args)
    }
}

fn default_setup(flights: Reply) -> (TripOrchestrator, Arc<AtomicUsize>, Arc<MemoryThreadStore>) {
    let store = Arc::new(MemoryThreadStore::new());
    let (orchestrator, calls, _) =
        Harness::new(flights).orchestrator(store.clone(), Duration::from_secs(5));
    (orchestrator, calls, store)
}

async fn context_of(store: &MemoryThreadStore, thread_id: &str) -> TripContext {
    store.load(thread_id).await.unwrap().unwrap().context
}

#[tokio::test]
async fn test_missing_traveler_count_is_asked_before_any_step() {
    let (orch, calls, _) = default_setup(Reply::Value(json!([offer(120)])));

    let resp = orch
        .handle_turn(None, "Plan a trip to Goa from Delhi on 2025-12-10 for 4 days")
        .await;
    assert!(resp.thread_id.starts_with("thread_"));
    assert_eq!(resp.status, TurnStatus::NeedsSlot);
    assert_eq!(resp.missing.as_ref().unwrap().slot, SlotName::TravelerCount);
    assert!(resp.steps.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let resp = orch.handle_turn(Some(&resp.thread_id), "2").await;
    assert_eq!(resp.status, TurnStatus::Executed);
    assert!(resp.steps.iter().all(|s| s.status == StepStatus::Done));
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_cheapest_fare_becomes_flight_cost() {
    let (orch, _, store) = default_setup(Reply::Value(json!([offer(120), offer(95)])));

    let resp = orch.handle_turn(None, FULL_REQUEST).await;
    assert_eq!(resp.status, TurnStatus::Executed);
    assert!(resp.replanned);
    let flights = resp.steps.iter().find(|s| s.kind == StepKind::Flights).unwrap();
    assert_eq!(flights.status, StepStatus::Done);
    assert!(resp.issues.is_empty());
    assert_eq!(resp.itinerary.as_deref(), Some("Day 1: arrive in Goa"));

    let ctx = context_of(&store, &resp.thread_id).await;
    assert_eq!(ctx.flight_cost(), Some(95.0));
    assert_eq!(ctx.flight_currency(), Some("USD"));
}

#[tokio::test]
async fn test_flight_timeout_is_reported_and_run_completes() {
    let store = Arc::new(MemoryThreadStore::new());
    let (orch, _, _) = Harness::new(Reply::Slow(500, json!([offer(99)])))
        .orchestrator(store.clone(), Duration::from_millis(50));

    let resp = orch.handle_turn(None, FULL_REQUEST).await;
    assert_eq!(resp.status, TurnStatus::Executed);

    let flights = resp.steps.iter().find(|s| s.kind == StepKind::Flights).unwrap();
    assert_eq!(flights.status, StepStatus::Error);
    assert_eq!(flights.error_kind, Some(ErrorKind::NetworkError));
    assert!(resp
        .steps
        .iter()
        .filter(|s| s.kind != StepKind::Flights)
        .all(|s| s.status == StepStatus::Done));
    assert_eq!(resp.issues.len(), 1);
    assert!(resp.issues[0].starts_with("flights"));
    assert!(resp.summary.unwrap().contains("flights"));

    let ctx = context_of(&store, &resp.thread_id).await;
    assert!(ctx.flight_cost().is_none());
}

#[tokio::test]
async fn test_unchanged_plan_is_not_rerun() {
    let (orch, calls, _) = default_setup(Reply::Fail("connection reset by peer"));

    let first = orch.handle_turn(None, FULL_REQUEST).await;
    let after_first = calls.load(Ordering::SeqCst);
    assert_eq!(after_first, 6);

    let second = orch.handle_turn(Some(&first.thread_id), "thanks!").await;
    assert_eq!(second.status, TurnStatus::Executed);
    assert!(!second.replanned);
    assert_eq!(calls.load(Ordering::SeqCst), after_first);
    assert_eq!(first.issues, second.issues);
    assert_eq!(first.summary, second.summary);
    assert_eq!(first.steps, second.steps);
}

#[tokio::test]
async fn test_destination_correction_rebuilds_plan() {
    let store = Arc::new(MemoryThreadStore::new());
    let (orch, calls, flight_args) = Harness::new(Reply::Value(json!([offer(120), offer(95)])))
        .orchestrator(store.clone(), Duration::from_secs(5));

    let first = orch.handle_turn(None, FULL_REQUEST).await;
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    let second = orch
        .handle_turn(Some(&first.thread_id), "Actually, make it a trip to Jaipur")
        .await;
    assert_eq!(second.status, TurnStatus::Executed);
    assert!(second.replanned);
    assert_eq!(calls.load(Ordering::SeqCst), 12);
    let args = flight_args.lock().unwrap().clone().unwrap();
    assert_eq!(args["destination"], json!("Jaipur"));

    let ctx = context_of(&store, &first.thread_id).await;
    assert_eq!(ctx.destination(), Some("Jaipur"));
    assert_eq!(ctx.origin_city(), Some("Delhi"));
}

#[tokio::test]
async fn test_loose_date_requires_confirmation() {
    let (orch, calls, store) = default_setup(Reply::Value(json!([offer(120)])));

    let resp = orch
        .handle_turn(
            None,
            "Plan a trip to Goa from Delhi on 10 December 2025 for 4 days, 2 people",
        )
        .await;
    assert_eq!(resp.status, TurnStatus::NeedsSlot);
    let missing = resp.missing.clone().unwrap();
    assert_eq!(missing.slot, SlotName::StartDate);
    assert_eq!(missing.proposal.map(|d| d.to_string()).as_deref(), Some("2025-12-10"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let resp = orch.handle_turn(Some(&resp.thread_id), "yes").await;
    assert_eq!(resp.status, TurnStatus::Executed);
    let ctx = context_of(&store, &resp.thread_id).await;
    assert_eq!(
        ctx.committed_start_date().map(|d| d.to_string()).as_deref(),
        Some("2025-12-10")
    );
}

#[tokio::test]
async fn test_chat_does_not_start_planning() {
    let (orch, calls, store) = default_setup(Reply::Value(json!([offer(120)])));
    let resp = orch.handle_turn(None, "hello there").await;
    assert_eq!(resp.status, TurnStatus::Conversation);
    assert_eq!(resp.intent, Some(Intent::Chat));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let state = store.load(&resp.thread_id).await.unwrap().unwrap();
    assert_eq!(state.history.len(), 2);
    assert!(state.plan.is_none());
}

struct BrokenClassifier;

#[async_trait]
impl SemanticClassifier for BrokenClassifier {
    async fn classify_intent(
        &self,
        _text: &str,
        _history: &[Message],
    ) -> Result<IntentDecision, TripError> {
        Ok(IntentDecision {
            intent: Intent::Plan,
            ready_to_plan: true,
        })
    }

    async fn extract_slots(
        &self,
        _text: &str,
        _context: &TripContext,
    ) -> Result<SlotExtraction, TripError> {
        Err(TripError::Classifier("model returned garbage".into()))
    }
}

#[tokio::test]
async fn test_classifier_failure_is_recovered() {
    let tools = ToolExecutor::new(ToolRegistry::new(), 1);
    let orch = TripOrchestrator::new(
        Arc::new(BrokenClassifier),
        PlanExecutor::new(tools),
        Arc::new(MemoryThreadStore::new()),
    );
    let resp = orch.handle_turn(Some("thread_fixed"), "plan something").await;
    assert_eq!(resp.status, TurnStatus::Recovered);
    assert_eq!(resp.thread_id, "thread_fixed");
    assert!(resp.summary.is_some());
}

#[tokio::test]
async fn test_sqlite_thread_resumes_across_orchestrators() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threads.db");

    let thread_id = {
        let store: Arc<dyn ThreadStore> = Arc::new(SqliteThreadStore::open(&path).unwrap());
        let (orch, _, _) = Harness::new(Reply::Value(json!([offer(120)])))
            .orchestrator(store, Duration::from_secs(5));
        let resp = orch
            .handle_turn(None, "Plan a trip to Goa from Delhi on 2025-12-10 for 4 days")
            .await;
        assert_eq!(resp.status, TurnStatus::NeedsSlot);
        resp.thread_id
    };

    let store: Arc<dyn ThreadStore> = Arc::new(SqliteThreadStore::open(&path).unwrap());
    let (orch, calls, _) = Harness::new(Reply::Value(json!([offer(120)])))
        .orchestrator(store.clone(), Duration::from_secs(5));
    let resp = orch.handle_turn(Some(&thread_id), "3").await;
    assert_eq!(resp.status, TurnStatus::Executed);
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    let state = store.load(&thread_id).await.unwrap().unwrap();
    assert_eq!(state.context.traveler_count(), Some(3));
    assert_eq!(state.context.flight_cost(), Some(120.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_turns_on_same_thread_are_serialized() {
    let store = Arc::new(MemoryThreadStore::new());
    let (orch, _, _) = Harness::new(Reply::Slow(50, json!([offer(120)])))
        .orchestrator(store.clone(), Duration::from_secs(5));
    let orch = Arc::new(orch);

    let a = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.handle_turn(Some("thread_shared"), FULL_REQUEST).await })
    };
    let b = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.handle_turn(Some("thread_shared"), "thanks").await })
    };
    a.await.unwrap();
    b.await.unwrap();

    let state = store.load("thread_shared").await.unwrap().unwrap();
    assert_eq!(state.history.len(), 4);
}

#[tokio::test]
async fn test_rejected_date_correction_keeps_plan() {
    let (orch, calls, store) = default_setup(Reply::Value(json!([offer(120)])));
    let first = orch.handle_turn(None, FULL_REQUEST).await;
    assert_eq!(first.status, TurnStatus::Executed);

    let second = orch
        .handle_turn(Some(&first.thread_id), "Actually change the date to 31/02/2025")
        .await;
    assert_eq!(second.status, TurnStatus::Executed);
    assert!(!second.replanned);
    assert_eq!(second.rejected.len(), 1);
    assert!(second.rejected[0].starts_with("start_date"));
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    let ctx = context_of(&store, &first.thread_id).await;
    assert_eq!(
        ctx.committed_start_date().map(|d| d.to_string()).as_deref(),
        Some("2025-12-10")
    );
}

#[tokio::test]
async fn test_loose_date_correction_confirmed_before_replan() {
    let (orch, calls, store) = default_setup(Reply::Value(json!([offer(120)])));
    let first = orch.handle_turn(None, FULL_REQUEST).await;

    let second = orch
        .handle_turn(Some(&first.thread_id), "Actually change it to 20 December 2025")
        .await;
    assert_eq!(second.status, TurnStatus::NeedsSlot);
    let missing = second.missing.clone().unwrap();
    assert_eq!(missing.slot, SlotName::StartDate);
    assert_eq!(missing.proposal.map(|d| d.to_string()).as_deref(), Some("2025-12-20"));
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    let ctx = context_of(&store, &first.thread_id).await;
    assert_eq!(
        ctx.committed_start_date().map(|d| d.to_string()).as_deref(),
        Some("2025-12-10")
    );

    let third = orch.handle_turn(Some(&first.thread_id), "yes").await;
    assert_eq!(third.status, TurnStatus::Executed);
    assert!(third.replanned);
    assert_eq!(calls.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn test_follow_up_question_answered_from_results() {
    let (orch, calls, _) = default_setup(Reply::Value(json!([offer(120), offer(95)])));
    let first = orch.handle_turn(None, FULL_REQUEST).await;

    let weather = orch
        .handle_turn(Some(&first.thread_id), "How's the weather there?")
        .await;
    assert_eq!(weather.status, TurnStatus::Answer);
    let answer = weather.answer.unwrap();
    assert_eq!(answer.topic, StepKind::Weather);
    assert_eq!(answer.status, Some(StepStatus::Done));
    assert_eq!(answer.result.unwrap()["summary"], json!("Sunny, 31°C"));

    let flights = orch
        .handle_turn(Some(&first.thread_id), "Which airline is cheapest?")
        .await;
    let answer = flights.answer.unwrap();
    assert_eq!(answer.topic, StepKind::Flights);
    assert_eq!(answer.result.unwrap()["min_price"], json!(95.0));
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_follow_up_on_failed_step_reports_error() {
    let (orch, _, _) = default_setup(Reply::Fail("connection timed out"));
    let first = orch.handle_turn(None, FULL_REQUEST).await;
    let resp = orch
        .handle_turn(Some(&first.thread_id), "any flight options?")
        .await;
    assert_eq!(resp.status, TurnStatus::Answer);
    let answer = resp.answer.unwrap();
    assert_eq!(answer.status, Some(StepStatus::Error));
    assert!(answer.error.unwrap().starts_with("flights: network_error"));
    assert!(answer.result.is_none());
}

struct ReadOnlyStore;

#[async_trait]
impl ThreadStore for ReadOnlyStore {
    async fn load(&self, _thread_id: &str) -> Result<Option<ThreadState>, TripError> {
        Ok(None)
    }

    async fn save(&self, _state: &ThreadState) -> Result<(), TripError> {
        Err(TripError::Store("disk full".into()))
    }

    async fn delete(&self, _thread_id: &str) -> Result<bool, TripError> {
        Ok(false)
    }

    async fn thread_ids(&self) -> Result<Vec<ThreadId>, TripError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_save_failure_still_returns_turn() {
    let (orch, calls, _) = Harness::new(Reply::Value(json!([offer(120)])))
        .orchestrator(Arc::new(ReadOnlyStore), Duration::from_secs(5));
    let resp = orch.handle_turn(None, FULL_REQUEST).await;
    assert_eq!(resp.status, TurnStatus::Executed);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(
        resp.recovery,
        Some(RecoveryAction::ContinueUnsaved {
            reason: "Store error: disk full".to_string()
        })
    );
}
