//! 重新规划
//!
//! 比较上下文签名（出发地、目的地、已确认日期、天数、人数）与上次构建时的签名：
//! 不同则丢弃旧计划整体重建；相同则原样返回旧计划，不做任何步骤级修改。

use serde::{Deserialize, Serialize};

use crate::dialogue::{TripContext, TripSignature};
use crate::planning::builder::build_plan;
use crate::planning::types::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplanDecision {
    /// 签名未变，沿用旧计划
    Kept,
    /// 新建或签名变化后重建
    Rebuilt,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Replanner {
    last_signature: Option<TripSignature>,
}

impl Replanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_signature(&self) -> Option<&TripSignature> {
        self.last_signature.as_ref()
    }

    pub fn replan(
        &mut self,
        context: &TripContext,
        previous: Option<Plan>,
    ) -> (Plan, ReplanDecision) {
        let signature = context.signature();
        if let Some(plan) = previous {
            if self.last_signature.as_ref() == Some(&signature) {
                return (plan, ReplanDecision::Kept);
            }
            tracing::info!(
                previous = ?self.last_signature,
                current = ?signature,
                "trip signature changed, rebuilding plan"
            );
        }
        let plan = build_plan(context);
        self.last_signature = Some(signature);
        (plan, ReplanDecision::Rebuilt)
    }
}
