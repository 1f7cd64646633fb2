//! 计划执行过程事件（可序列化为 JSON 供流式界面展示）

use serde::Serialize;

use crate::core::error::ErrorKind;
use crate::planning::types::{StepKind, StepStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    /// 步骤被派发
    StepStarted { id: usize, kind: StepKind },
    /// 步骤进入终态
    StepFinished {
        id: usize,
        kind: StepKind,
        status: StepStatus,
        error_kind: Option<ErrorKind>,
        latency_ms: u64,
    },
    /// 进度文本
    Progress { text: String },
    /// 本次运行结束
    RunComplete { done: usize, failed: usize, skipped: usize },
}
