//! 计划类型定义
//!
//! Plan 是按固定顺序过滤后的 PlanStep 列表；步骤一旦进入终态（done / error / skipped），
//! 在该计划实例内不再变化，只有重建计划才会得到新的 pending 步骤。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::ErrorKind;
use crate::dialogue::{ContextKey, TripSignature};
use crate::tools;

/// 结果映射：步骤输出键 → 校验后的结果（BTreeMap 保证遍历顺序稳定）
pub type ResultMap = BTreeMap<String, Value>;

/// 步骤种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Flights,
    Weather,
    Activities,
    Nearby,
    Budget,
    Assemble,
}

impl StepKind {
    /// 固定的步骤顺序，构建计划时只过滤不重排
    pub const ORDER: [StepKind; 6] = [
        Self::Flights,
        Self::Weather,
        Self::Activities,
        Self::Nearby,
        Self::Budget,
        Self::Assemble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flights => "flights",
            Self::Weather => "weather",
            Self::Activities => "activities",
            Self::Nearby => "nearby",
            Self::Budget => "budget",
            Self::Assemble => "assemble",
        }
    }

    /// 结果映射中的键
    pub fn output_key(&self) -> &'static str {
        self.as_str()
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Flights => tools::FLIGHT_SEARCH,
            Self::Weather => tools::WEATHER,
            Self::Activities => tools::ACTIVITIES,
            Self::Nearby => tools::NEARBY_PLACES,
            Self::Budget => tools::BUDGET_ESTIMATOR,
            Self::Assemble => tools::ITINERARY_ASSEMBLER,
        }
    }

    /// 准入条件：所需上下文键全部存在
    pub fn requires(&self) -> &'static [ContextKey] {
        match self {
            Self::Flights => &[
                ContextKey::OriginCity,
                ContextKey::Destination,
                ContextKey::CommittedStartDate,
            ],
            Self::Weather => &[ContextKey::Destination, ContextKey::CommittedStartDate],
            Self::Activities | Self::Nearby => &[ContextKey::Destination],
            Self::Budget => &[ContextKey::Destination, ContextKey::DurationDays],
            Self::Assemble => &[],
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Done,
    Skipped,
    Error,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// 1..N，过滤后顺序分配
    pub id: usize,
    pub kind: StepKind,
    pub requires: Vec<ContextKey>,
    pub status: StepStatus,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PlanStep {
    pub fn new(id: usize, kind: StepKind) -> Self {
        Self {
            id,
            kind,
            requires: kind.requires().to_vec(),
            status: StepStatus::Pending,
            error: None,
            error_kind: None,
            metadata: Map::new(),
        }
    }

    /// 问题列表中的一行，例如 "flights: network_error: timeout"
    pub fn issue_line(&self) -> Option<String> {
        match self.status {
            StepStatus::Error => {
                let err = self.error.as_deref().unwrap_or("failed");
                Some(match self.error_kind {
                    Some(kind) => format!("{}: {kind}: {err}", self.kind),
                    None => format!("{}: {err}", self.kind),
                })
            }
            StepStatus::Skipped => Some(format!(
                "{}: skipped ({})",
                self.kind,
                self.error.as_deref().unwrap_or("not available")
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    /// 构建时的上下文签名
    pub signature: TripSignature,
}

impl Plan {
    pub fn step(&self, kind: StepKind) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(|s| s.kind).collect()
    }

    /// 所有步骤均已终止
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    pub fn with_status(&self, status: StepStatus) -> Vec<StepKind> {
        self.steps
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.kind)
            .collect()
    }

    pub fn issues(&self) -> Vec<String> {
        self.steps.iter().filter_map(PlanStep::issue_line).collect()
    }
}
