//! 回合结果：编排器只给出结构化状态（缺失槽位、逐步状态、问题列表），措辞交给渲染层

use serde::Serialize;

use crate::core::error::ErrorKind;
use crate::core::recovery::RecoveryAction;
use crate::dialogue::{Intent, MissingSlot};
use crate::planning::{ExecutionReport, InquiryAnswer, Plan, StepKind, StepStatus};

/// 回合结果类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// 闲聊 / 探索，未进入规划
    Conversation,
    /// 还缺必填槽位，需要追问
    NeedsSlot,
    /// 计划已执行（全部步骤终止）
    Executed,
    /// 对已完成计划的追问，直接用结果映射作答
    Answer,
    /// 回合内出现意外错误，已兜底
    Recovered,
}

/// 单个步骤的投影
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepView {
    pub id: usize,
    pub kind: StepKind,
    pub status: StepStatus,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

/// 一个用户回合的结构化输出
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnResponse {
    pub thread_id: String,
    pub status: TurnStatus,
    pub intent: Option<Intent>,
    /// 下一个需要追问的槽位（含待确认的提议日期）
    pub missing: Option<MissingSlot>,
    pub steps: Vec<StepView>,
    pub issues: Vec<String>,
    /// 进度或汇总文本
    pub summary: Option<String>,
    pub itinerary: Option<String>,
    /// 本回合被拒绝的槽位值及原因
    pub rejected: Vec<String>,
    /// 本回合是否重建了计划
    pub replanned: bool,
    pub answer: Option<InquiryAnswer>,
    /// 兜底动作：回合失败，或结果未能持久化
    pub recovery: Option<RecoveryAction>,
}

impl TurnResponse {
    pub fn new(thread_id: impl Into<String>, status: TurnStatus) -> Self {
        Self {
            thread_id: thread_id.into(),
            status,
            intent: None,
            missing: None,
            steps: Vec::new(),
            issues: Vec::new(),
            summary: None,
            itinerary: None,
            rejected: Vec::new(),
            replanned: false,
            answer: None,
            recovery: None,
        }
    }

    /// 合并计划投影与执行报告
    pub fn with_execution(mut self, plan: &Plan, report: ExecutionReport) -> Self {
        self.steps = step_views(plan);
        self.issues = report.issues;
        self.summary = Some(report.summary);
        self.itinerary = report.itinerary;
        self
    }
}

pub fn step_views(plan: &Plan) -> Vec<StepView> {
    plan.steps
        .iter()
        .map(|s| StepView {
            id: s.id,
            kind: s.kind,
            status: s.status,
            error: s.error.clone(),
            error_kind: s.error_kind,
        })
        .collect()
}
