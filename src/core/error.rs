//! 编排器错误类型与工具错误分类
//!
//! TripError 用于基础设施调用（分类器、存储、调度）；步骤级失败不走 Err，
//! 而是以 ErrorKind + 文本记录在 PlanStep 上，由 RecoveryEngine 在回合边界兜底。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 回合处理过程中可能出现的错误（协作方越界、存储失败等）
#[derive(Error, Debug)]
pub enum TripError {
    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Scheduler closed")]
    SchedulerClosed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// 工具失败的分类（仅作为元数据，不改变控制流）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 超时、连接失败
    NetworkError,
    /// 参数不合法
    InvalidInput,
    /// 其它外部失败（含提供方在「成功」响应中嵌入的错误）
    ExternalFailure,
    /// 工具返回的结构无法被校验器转换
    ValidationError,
}

impl ErrorKind {
    /// 根据错误文本归类：网络/超时标记 > 非法输入标记 > 默认外部失败
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        if ["timeout", "timed out", "connection", "network"]
            .iter()
            .any(|marker| lower.contains(marker))
        {
            return Self::NetworkError;
        }
        if ["invalid", "valueerror", "malformed"]
            .iter()
            .any(|marker| lower.contains(marker))
        {
            return Self::InvalidInput;
        }
        Self::ExternalFailure
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::InvalidInput => "invalid_input",
            Self::ExternalFailure => "external_failure",
            Self::ValidationError => "validation_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_network_markers() {
        assert_eq!(ErrorKind::classify("Request Timeout after 15s"), ErrorKind::NetworkError);
        assert_eq!(ErrorKind::classify("connection refused"), ErrorKind::NetworkError);
    }

    #[test]
    fn test_classify_invalid_input() {
        assert_eq!(ErrorKind::classify("Invalid date format"), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_classify_defaults_to_external_failure() {
        assert_eq!(ErrorKind::classify("quota exhausted"), ErrorKind::ExternalFailure);
        assert_eq!(ErrorKind::ExternalFailure.to_string(), "external_failure");
    }
}
