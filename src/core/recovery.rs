//! 错误恢复引擎
//!
//! 回合边界的兜底：把协作方越界、存储失败等 TripError 映射为恢复动作，
//! 回合永远以一个响应结束，而不是把错误抛给调用方。

use serde::Serialize;

use crate::core::TripError;
use crate::dialogue::{MissingSlot, TripContext, REQUIRED_SLOT_ORDER};

/// 恢复动作
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// 请用户重试，并附上仍然缺少的信息
    RetryWithHint {
        reason: String,
        missing: Option<MissingSlot>,
    },
    /// 状态已更新但未能持久化，本回合继续
    ContinueUnsaved { reason: String },
}

impl RecoveryAction {
    pub fn reason(&self) -> &str {
        match self {
            Self::RetryWithHint { reason, .. } | Self::ContinueUnsaved { reason } => reason,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// context 为出错前最后一次可读到的上下文，没有则视为空
    pub fn handle(&self, err: &TripError, context: Option<&TripContext>) -> RecoveryAction {
        let missing = context.and_then(|c| c.next_missing(&REQUIRED_SLOT_ORDER));
        match err {
            TripError::Classifier(msg) => {
                tracing::warn!(error = %msg, "classifier failed, asking user to rephrase");
                RecoveryAction::RetryWithHint {
                    reason: "could not understand the message".to_string(),
                    missing,
                }
            }
            TripError::Store(_) | TripError::Sqlite(_) | TripError::Serialization(_) => {
                tracing::error!(error = %err, "thread store failure");
                RecoveryAction::RetryWithHint {
                    reason: "conversation state unavailable".to_string(),
                    missing,
                }
            }
            TripError::SchedulerClosed => {
                tracing::error!(error = %err, "orchestrator misconfigured");
                RecoveryAction::RetryWithHint {
                    reason: "planner unavailable".to_string(),
                    missing,
                }
            }
        }
    }

    /// 保存失败时使用：回合结果仍然返回给用户
    pub fn handle_save_failure(&self, err: &TripError) -> RecoveryAction {
        tracing::warn!(error = %err, "failed to persist thread state");
        RecoveryAction::ContinueUnsaved {
            reason: err.to_string(),
        }
    }
}
