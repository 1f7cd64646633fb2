//! 行程编排器：单回合主控
//!
//! 一条用户消息 = 一个回合：读取线程快照 → 意图分类 → 槽位抽取并写入上下文 →
//! 缺必填槽位则追问；计划已完成且行程未变时，追问直接用结果映射作答；
//! 否则重新规划（签名变化时丢弃旧结果）并执行计划 → 保存快照。
//! 同一线程的回合通过每线程一把 tokio Mutex 串行化，回合内部不再加锁。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use crate::config::{load_config_or_default, AppConfig};
use crate::core::recovery::RecoveryAction;
use crate::core::state::{step_views, TurnResponse, TurnStatus};
use crate::core::{RecoveryEngine, TaskScheduler, TripError};
use crate::dialogue::{
    Intent, KeywordClassifier, SemanticClassifier, SetOutcome, SlotExtraction, SlotSource,
    TripContext, REQUIRED_SLOT_ORDER,
};
use crate::memory::Message;
use crate::planning::{answer_inquiry, inquiry_topic, PlanExecutor, ReplanDecision};
use crate::session::{create_thread_store, new_thread_id, ThreadState, ThreadStore};
use crate::tools::{register_mock_tools, ToolCache, ToolExecutor, ToolRegistry};

type TurnLock = Arc<tokio::sync::Mutex<()>>;

pub struct TripOrchestrator {
    classifier: Arc<dyn SemanticClassifier>,
    executor: PlanExecutor,
    store: Arc<dyn ThreadStore>,
    recovery: RecoveryEngine,
    turn_locks: Mutex<HashMap<String, TurnLock>>,
    max_context_turns: usize,
}

impl TripOrchestrator {
    pub fn new(
        classifier: Arc<dyn SemanticClassifier>,
        executor: PlanExecutor,
        store: Arc<dyn ThreadStore>,
    ) -> Self {
        Self {
            classifier,
            executor,
            store,
            recovery: RecoveryEngine::new(),
            turn_locks: Mutex::new(HashMap::new()),
            max_context_turns: 20,
        }
    }

    pub fn with_max_context_turns(mut self, turns: usize) -> Self {
        self.max_context_turns = turns;
        self
    }

    pub fn store(&self) -> &Arc<dyn ThreadStore> {
        &self.store
    }

    fn turn_lock(&self, thread_id: &str) -> TurnLock {
        let mut locks = self.turn_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// 处理一条用户消息；thread_id 为 None 时创建新线程。永不返回错误。
    pub async fn handle_turn(&self, thread_id: Option<&str>, text: &str) -> TurnResponse {
        let thread_id = thread_id
            .map(str::to_string)
            .unwrap_or_else(new_thread_id);
        let lock = self.turn_lock(&thread_id);
        let response = {
            let _guard = lock.lock().await;
            match self.process(&thread_id, text).await {
                Ok(response) => response,
                Err(err) => {
                    let context = match self.store.load(&thread_id).await {
                        Ok(Some(state)) => Some(state.context),
                        _ => None,
                    };
                    let action = self.recovery.handle(&err, context.as_ref());
                    recovered_response(&thread_id, action)
                }
            }
        };
        drop(lock);
        self.release_turn_lock(&thread_id);
        response
    }

    /// 没有其它回合持有或等待时移除该线程的锁
    fn release_turn_lock(&self, thread_id: &str) {
        let mut locks = self.turn_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(thread_id);
        }
    }

    async fn process(&self, thread_id: &str, text: &str) -> Result<TurnResponse, TripError> {
        let mut state = match self.store.load(thread_id).await? {
            Some(state) => state,
            None => {
                tracing::info!(thread_id, "new thread");
                ThreadState::new(thread_id, self.max_context_turns)
            }
        };
        state.history.push(Message::user(text));

        let decision = self
            .classifier
            .classify_intent(text, state.history.messages())
            .await?;
        tracing::debug!(
            intent = ?decision.intent,
            ready = decision.ready_to_plan,
            "intent classified"
        );

        let mut response = TurnResponse::new(thread_id, TurnStatus::Conversation);
        let signature_before = state.context.signature();
        response.intent = Some(decision.intent);

        let engaged = state.context.planning_engaged();
        if decision.intent == Intent::Plan || decision.ready_to_plan || engaged {
            let extraction = self.classifier.extract_slots(text, &state.context).await?;
            response.rejected = apply_extraction(&mut state.context, &extraction);
        }

        if !state.context.planning_engaged() && decision.intent != Intent::Plan {
            state.history.push(Message::assistant("(conversation)"));
            response.recovery = self.save(&mut state).await;
            return Ok(response);
        }

        if let Some(missing) = state.context.next_missing(&REQUIRED_SLOT_ORDER) {
            state.context.mark_asked(missing.slot);
            tracing::info!(
                slot = %missing.slot,
                proposal = ?missing.proposal,
                "asking for missing slot"
            );
            state
                .history
                .push(Message::assistant(format!("(asked for {})", missing.slot)));
            response.status = TurnStatus::NeedsSlot;
            response.missing = Some(missing);
            if let Some(plan) = &state.plan {
                response.steps = step_views(plan);
            }
            response.recovery = self.save(&mut state).await;
            return Ok(response);
        }

        if let Some(pending) = state.context.pending_date_correction() {
            tracing::info!(proposal = ?pending.proposal, "awaiting date correction confirmation");
            state
                .history
                .push(Message::assistant("(asked to confirm start_date)"));
            response.status = TurnStatus::NeedsSlot;
            response.missing = Some(pending);
            if let Some(plan) = &state.plan {
                response.steps = step_views(plan);
            }
            response.recovery = self.save(&mut state).await;
            return Ok(response);
        }

        let settled = state.context.signature() == signature_before
            && state.plan.as_ref().is_some_and(|plan| plan.is_complete());
        if let (true, Some(topic), Some(plan)) = (settled, inquiry_topic(text), &state.plan) {
            tracing::info!(topic = %topic, "answering from stored results");
            response.status = TurnStatus::Answer;
            response.steps = step_views(plan);
            response.answer = Some(answer_inquiry(plan, &state.results, topic));
            state
                .history
                .push(Message::assistant(format!("(answered {topic})")));
            response.recovery = self.save(&mut state).await;
            return Ok(response);
        }

        let previous = state.plan.take();
        let (mut plan, replan) = state.replanner.replan(&state.context, previous);
        if replan == ReplanDecision::Rebuilt {
            state.results.clear();
            state.context.clear_derived();
            response.replanned = true;
        }

        let report = self
            .executor
            .execute(&mut plan, &mut state.context, &mut state.results)
            .await;
        tracing::info!(
            steps = plan.steps.len(),
            issues = report.issues.len(),
            tool_calls = report.tool_calls,
            "plan executed"
        );
        state
            .history
            .push(Message::assistant(report.summary.clone()));

        response.status = TurnStatus::Executed;
        response = response.with_execution(&plan, report);
        state.plan = Some(plan);
        response.recovery = self.save(&mut state).await;
        Ok(response)
    }

    /// 保存失败不影响本回合输出，只在响应中带上 ContinueUnsaved
    async fn save(&self, state: &mut ThreadState) -> Option<RecoveryAction> {
        state.updated_at = Utc::now();
        match self.store.save(state).await {
            Ok(()) => None,
            Err(e) => Some(self.recovery.handle_save_failure(&e)),
        }
    }
}

/// 按顺序写入抽取结果；返回被拒绝的原因
fn apply_extraction(context: &mut TripContext, extraction: &SlotExtraction) -> Vec<String> {
    let mut rejected = Vec::new();
    for item in &extraction.slots {
        let outcome = if extraction.is_correction {
            context.correct(item.slot, item.value.clone(), item.source)
        } else {
            context.set(item.slot, item.value.clone(), item.source)
        };
        match outcome {
            SetOutcome::Committed => {
                tracing::debug!(slot = %item.slot, value = %item.value, "slot committed")
            }
            SetOutcome::Proposed(date) => {
                tracing::debug!(date = %date, "start date proposed, awaiting confirmation")
            }
            SetOutcome::Ignored => {}
            SetOutcome::Rejected(reason) => {
                tracing::debug!(slot = %item.slot, reason = %reason, "slot value rejected");
                rejected.push(format!("{}: {reason}", item.slot));
            }
        }
    }
    if extraction.confirms_proposed_date {
        context.confirm_proposed_date(SlotSource::User);
    } else if extraction.declines_proposed_date && context.discard_proposed_date() {
        tracing::debug!("proposed start date declined");
    }
    rejected
}

fn recovered_response(thread_id: &str, action: RecoveryAction) -> TurnResponse {
    let mut response = TurnResponse::new(thread_id, TurnStatus::Recovered);
    response.summary = Some(action.reason().to_string());
    if let RecoveryAction::RetryWithHint { missing, .. } = &action {
        response.missing = missing.clone();
    }
    response.recovery = Some(action);
    response
}

/// 按配置组装编排器：离线工具、缓存、调度器、存储后端
pub fn create_orchestrator(config_path: Option<PathBuf>) -> Result<TripOrchestrator, TripError> {
    let cfg = load_config_or_default(config_path);
    build_orchestrator(&cfg)
}

pub fn build_orchestrator(cfg: &AppConfig) -> Result<TripOrchestrator, TripError> {
    let mut registry = ToolRegistry::new();
    register_mock_tools(&mut registry);
    tracing::info!(tools = ?registry.tool_names(), "tools registered");

    let mut tools = ToolExecutor::new(registry, cfg.planner.step_timeout_secs)
        .with_scheduler(TaskScheduler::new(cfg.planner.max_concurrent_steps));
    if cfg.tools.cache_capacity > 0 {
        tools = tools.with_cache(ToolCache::new(
            cfg.tools.cache_capacity,
            cfg.tools.cache_ttl_secs.map(Duration::from_secs),
        ));
    }

    let store = create_thread_store(&cfg.store)?;
    Ok(TripOrchestrator::new(
        Arc::new(KeywordClassifier::new()),
        PlanExecutor::new(tools),
        store,
    )
    .with_max_context_turns(cfg.app.max_context_turns))
}
