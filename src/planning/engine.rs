//! 计划执行引擎
//!
//! 依赖并行执行：所有待执行的非 assemble 步骤在同一波中并发派发（受调度器许可数与单步超时约束），
//! 参数取派发时刻的上下文（budget 读到什么 flight_cost 就用什么）；本波结束后按计划顺序逐个
//! 把结果写回上下文与结果映射。assemble 依赖结果映射，放在第二波单独执行。
//!
//! 单个步骤失败只记录在该步骤上，不会中断运行；已终止的步骤永不重跑。

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use crate::core::error::ErrorKind;
use crate::dialogue::TripContext;
use crate::planning::events::PlanEvent;
use crate::planning::types::{Plan, PlanStep, ResultMap, StepKind, StepStatus};
use crate::tools::{
    cheapest_offer, is_structural_error, validate_flights, validate_weather, BatchCall,
    ToolExecutor, ToolResult,
};

/// 活动结果中传给预算工具的最多条目数
const MAX_BUDGET_ACTIVITIES: usize = 8;

/// 一次执行的结构化结果，措辞交给上层渲染
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// 所有步骤均已终止
    pub complete: bool,
    pub done: Vec<StepKind>,
    pub running: Vec<StepKind>,
    pub pending: Vec<StepKind>,
    pub issues: Vec<String>,
    /// 进度文本或汇总文本
    pub summary: String,
    /// assemble 的输出
    pub itinerary: Option<String>,
    /// 本次实际发起的工具调用次数
    pub tool_calls: usize,
}

pub struct PlanExecutor {
    tools: ToolExecutor,
    events: Option<mpsc::UnboundedSender<PlanEvent>>,
}

impl PlanExecutor {
    pub fn new(tools: ToolExecutor) -> Self {
        Self {
            tools,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<PlanEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    /// 执行计划中所有待执行步骤，直到全部终止
    pub async fn execute(
        &self,
        plan: &mut Plan,
        context: &mut TripContext,
        results: &mut ResultMap,
    ) -> ExecutionReport {
        let mut tool_calls = 0;
        tool_calls += self
            .run_wave(plan, context, results, |kind| kind != StepKind::Assemble)
            .await;
        tool_calls += self
            .run_wave(plan, context, results, |kind| kind == StepKind::Assemble)
            .await;

        let report = report(plan, results, tool_calls);
        self.emit(PlanEvent::Progress {
            text: report.summary.clone(),
        });
        if report.complete && tool_calls > 0 {
            self.emit(PlanEvent::RunComplete {
                done: report.done.len(),
                failed: plan.with_status(StepStatus::Error).len(),
                skipped: plan.with_status(StepStatus::Skipped).len(),
            });
        }
        report
    }

    /// 派发一波满足过滤条件的 pending 步骤，返回发起的调用数
    async fn run_wave(
        &self,
        plan: &mut Plan,
        context: &mut TripContext,
        results: &mut ResultMap,
        include: impl Fn(StepKind) -> bool,
    ) -> usize {
        let mut calls = Vec::new();
        for step in plan.steps.iter_mut() {
            if step.status != StepStatus::Pending || !include(step.kind) {
                continue;
            }
            let tool = step.kind.tool_name();
            if !self.tools.has_tool(tool) {
                tracing::warn!(step = %step.kind, tool, "tool not registered, skipping step");
                step.status = StepStatus::Skipped;
                step.error = Some(format!("tool '{tool}' not available"));
                self.emit(finished_event(step, 0));
                continue;
            }
            step.status = StepStatus::Running;
            self.emit(PlanEvent::StepStarted {
                id: step.id,
                kind: step.kind,
            });
            calls.push(BatchCall::new(
                step.kind.output_key(),
                tool,
                step_args(step.kind, context, results),
            ));
        }
        if calls.is_empty() {
            return 0;
        }

        let dispatched = calls.len();
        let mut outcomes: HashMap<String, ToolResult> = self.tools.run_batch(calls).await;

        for step in plan.steps.iter_mut() {
            if step.status != StepStatus::Running {
                continue;
            }
            let result = outcomes.remove(step.kind.output_key()).unwrap_or_else(|| {
                ToolResult::failure(
                    step.kind.tool_name(),
                    ErrorKind::ExternalFailure,
                    "no result returned",
                    0,
                )
            });
            apply_result(step, &result, context, results);
            self.emit(finished_event(step, result.meta.latency_ms));
        }
        dispatched
    }

    fn emit(&self, event: PlanEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

fn finished_event(step: &PlanStep, latency_ms: u64) -> PlanEvent {
    PlanEvent::StepFinished {
        id: step.id,
        kind: step.kind,
        status: step.status,
        error_kind: step.error_kind,
        latency_ms,
    }
}

/// 按步骤种类组装工具参数（读取派发时刻的上下文）
fn step_args(kind: StepKind, context: &TripContext, results: &ResultMap) -> Value {
    let destination = context.destination().unwrap_or_default();
    let date = context
        .committed_start_date()
        .map(|d| d.to_string())
        .unwrap_or_default();
    match kind {
        StepKind::Flights => json!({
            "origin": context.origin_city().unwrap_or_default(),
            "destination": destination,
            "date": date,
            "travelers": context.traveler_count().unwrap_or(1),
        }),
        StepKind::Weather => json!({ "city": destination, "date": date }),
        StepKind::Activities => json!({
            "city": destination,
            "interests": context.interests(),
        }),
        StepKind::Nearby => json!({ "city": destination }),
        StepKind::Budget => {
            let days = context.duration_days().unwrap_or(1);
            let mut args = Map::new();
            args.insert("destination".into(), json!(destination));
            args.insert("days".into(), json!(days));
            args.insert("nights".into(), json!(days.saturating_sub(1).max(1)));
            args.insert("travelers".into(), json!(context.traveler_count().unwrap_or(1)));
            args.insert("activities".into(), json!(activity_lines(results)));
            if let Some(currency) = context.currency() {
                args.insert("currency".into(), json!(currency));
            }
            if let Some(cost) = context.flight_cost() {
                args.insert("flight_cost".into(), json!(cost));
                args.insert(
                    "flight_currency".into(),
                    json!(context.flight_currency().unwrap_or("USD")),
                );
            }
            Value::Object(args)
        }
        StepKind::Assemble => json!({
            "trip": context.summary_json(),
            "weather": context.weather_snapshot().map(|w| w.summary.clone()),
            "results": results,
        }),
    }
}

/// 从已收集的活动文本中取出条目（去掉编号与项目符号）
fn activity_lines(results: &ResultMap) -> Vec<String> {
    let Some(text) = results
        .get(StepKind::Activities.output_key())
        .and_then(Value::as_str)
    else {
        return Vec::new();
    };
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')', '-', '*', '•'])
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .take(MAX_BUDGET_ACTIVITIES)
        .collect()
}

fn fail(step: &mut PlanStep, kind: ErrorKind, error: impl Into<String>) {
    let error = error.into();
    tracing::warn!(step = %step.kind, error_kind = %kind, error = %error, "step failed");
    step.status = StepStatus::Error;
    step.error = Some(error);
    step.error_kind = Some(kind);
}

/// 把工具结果写回步骤状态、上下文派生字段与结果映射
fn apply_result(
    step: &mut PlanStep,
    result: &ToolResult,
    context: &mut TripContext,
    results: &mut ResultMap,
) {
    step.metadata.insert("tool".into(), json!(result.meta.tool));
    step.metadata.insert("latency_ms".into(), json!(result.meta.latency_ms));
    if result.meta.cached {
        step.metadata.insert("cached".into(), json!(true));
    }

    if !result.ok {
        fail(
            step,
            result.error_kind.unwrap_or(ErrorKind::ExternalFailure),
            result.error.clone().unwrap_or_else(|| "tool failed".to_string()),
        );
        return;
    }

    let key = step.kind.output_key().to_string();
    match step.kind {
        StepKind::Flights => {
            let validation = validate_flights(&result.payload);
            step.metadata.insert("offers".into(), json!(validation.offers.len()));
            if !validation.errors.is_empty() {
                step.metadata.insert("item_errors".into(), json!(validation.errors));
            }
            let Some(cheapest) = cheapest_offer(&validation.offers) else {
                if validation.errors.is_empty() {
                    fail(step, ErrorKind::ExternalFailure, "no flight offers returned");
                } else if validation.errors.iter().all(|e| is_structural_error(e)) {
                    fail(step, ErrorKind::ValidationError, validation.errors.join("; "));
                } else {
                    let provider: Vec<&str> = validation
                        .errors
                        .iter()
                        .filter(|e| !is_structural_error(e))
                        .map(String::as_str)
                        .collect();
                    fail(step, ErrorKind::ExternalFailure, provider.join("; "));
                }
                return;
            };
            context.record_flight_cost(cheapest.price, &cheapest.currency);
            results.insert(
                key,
                json!({
                    "min_price": cheapest.price,
                    "currency": cheapest.currency,
                    "offers": validation.offers,
                    "errors": validation.errors,
                }),
            );
        }
        StepKind::Weather => {
            let date = context.committed_start_date().map(|d| d.to_string());
            let city = context.destination().map(str::to_string);
            match validate_weather(&result.payload, date.as_deref(), city.as_deref()) {
                Ok(snapshot) => {
                    results.insert(
                        key,
                        json!({
                            "date": snapshot.date,
                            "city": snapshot.city,
                            "summary": snapshot.summary,
                        }),
                    );
                    context.record_weather(snapshot);
                }
                Err(e) => {
                    fail(step, ErrorKind::ValidationError, e);
                    return;
                }
            }
        }
        _ => {
            if result.payload.is_null() {
                fail(step, ErrorKind::ValidationError, "empty_payload");
                return;
            }
            results.insert(key, result.payload.clone());
        }
    }
    step.status = StepStatus::Done;
    tracing::debug!(step = %step.kind, "step done");
}

/// 从计划与结果映射派生报告；只读，多次调用结果一致
pub fn report(plan: &Plan, results: &ResultMap, tool_calls: usize) -> ExecutionReport {
    let done = plan.with_status(StepStatus::Done);
    let running = plan.with_status(StepStatus::Running);
    let pending = plan.with_status(StepStatus::Pending);
    let issues = plan.issues();
    let complete = plan.is_complete();

    let summary = if complete {
        aggregate_summary(plan, &issues)
    } else {
        progress_line(&done, &running, &pending)
    };

    ExecutionReport {
        complete,
        done,
        running,
        pending,
        issues,
        summary,
        itinerary: results
            .get(StepKind::Assemble.output_key())
            .and_then(Value::as_str)
            .map(str::to_string),
        tool_calls,
    }
}

fn join_kinds(kinds: &[StepKind]) -> String {
    if kinds.is_empty() {
        return "none".to_string();
    }
    kinds.iter().map(StepKind::as_str).collect::<Vec<_>>().join(", ")
}

/// 运行中的进度文本
pub fn progress_line(done: &[StepKind], running: &[StepKind], pending: &[StepKind]) -> String {
    format!(
        "done: {} | running: {} | pending: {}",
        join_kinds(done),
        join_kinds(running),
        join_kinds(pending)
    )
}

fn aggregate_summary(plan: &Plan, issues: &[String]) -> String {
    let total = plan.steps.len();
    if issues.is_empty() {
        return format!("All {total} steps completed.");
    }
    let ok = plan.with_status(StepStatus::Done).len();
    let mut out = format!("{ok} of {total} steps completed. Issues:");
    for issue in issues {
        out.push_str("\n- ");
        out.push_str(issue);
    }
    out
}
