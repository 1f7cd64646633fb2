//! 工具执行器
//!
//! 持有 ToolRegistry、单次调用超时、可选缓存与并发调度器。run(tool, args) 永不返回 Err：
//! 成功、提供方报错、超时、未注册都统一为 ToolResult，并带上错误分类与耗时元数据；
//! 每次调用输出结构化审计日志（JSON）。run_batch 并发执行一组具名调用。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;

use crate::core::error::ErrorKind;
use crate::core::TaskScheduler;
use crate::tools::{ToolCache, ToolRegistry};

/// 调用元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMeta {
    pub tool: String,
    pub latency_ms: u64,
    #[serde(default)]
    pub cached: bool,
}

/// 统一的调用结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    /// 失败时为 Null
    pub payload: Value,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub meta: ToolMeta,
}

impl ToolResult {
    pub fn success(tool: &str, payload: Value, latency_ms: u64, cached: bool) -> Self {
        Self {
            ok: true,
            payload,
            error: None,
            error_kind: None,
            meta: ToolMeta {
                tool: tool.to_string(),
                latency_ms,
                cached,
            },
        }
    }

    pub fn failure(tool: &str, kind: ErrorKind, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            ok: false,
            payload: Value::Null,
            error: Some(error.into()),
            error_kind: Some(kind),
            meta: ToolMeta {
                tool: tool.to_string(),
                latency_ms,
                cached: false,
            },
        }
    }

    /// "network_error: timeout" 形式，用于问题列表
    pub fn describe_error(&self) -> Option<String> {
        let err = self.error.as_deref()?;
        Some(match self.error_kind {
            Some(kind) => format!("{kind}: {err}"),
            None => err.to_string(),
        })
    }
}

/// run_batch 的一项：key 为结果映射中的名字
#[derive(Debug, Clone)]
pub struct BatchCall {
    pub key: String,
    pub tool: String,
    pub args: Value,
}

impl BatchCall {
    pub fn new(key: impl Into<String>, tool: impl Into<String>, args: Value) -> Self {
        Self {
            key: key.into(),
            tool: tool.into(),
            args,
        }
    }
}

/// 工具执行器：可 Clone（内部均为 Arc），便于在 tokio::spawn 中使用
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    cache: Option<Arc<ToolCache>>,
    scheduler: Option<TaskScheduler>,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry: Arc::new(registry),
            timeout: Duration::from_secs(timeout_secs),
            cache: None,
            scheduler: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache(mut self, cache: ToolCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// 设置后 run_batch 中每个调用先取得并发许可
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 执行指定工具；超时记为 network_error，提供方错误按文本分类；输出 JSON 审计日志
    pub async fn run(&self, tool_name: &str, args: Value) -> ToolResult {
        let start = Instant::now();
        let preview = args_preview(&args);

        let Some(tool) = self.registry.get(tool_name) else {
            let result = ToolResult::failure(
                tool_name,
                ErrorKind::InvalidInput,
                format!("unknown tool: {tool_name}"),
                0,
            );
            audit(&result, "unknown", &preview);
            return result;
        };

        let cache_key = self.cache.as_ref().map(|_| ToolCache::key(tool_name, &args));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(hit) = cache.get(key) {
                let result = ToolResult::success(tool_name, hit, elapsed_ms(start), true);
                audit(&result, "cached", &preview);
                return result;
            }
        }

        let outcome = timeout(self.timeout, tool.call(args)).await;
        let latency_ms = elapsed_ms(start);
        let (result, label) = match outcome {
            Ok(Ok(payload)) => {
                if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
                    cache.put(key, payload.clone());
                }
                (ToolResult::success(tool_name, payload, latency_ms, false), "ok")
            }
            Ok(Err(e)) => (
                ToolResult::failure(tool_name, ErrorKind::classify(&e), e, latency_ms),
                "error",
            ),
            Err(_) => (
                ToolResult::failure(tool_name, ErrorKind::NetworkError, "timeout", latency_ms),
                "timeout",
            ),
        };
        audit(&result, label, &preview);
        result
    }

    /// 并发执行一组调用，结果按 key 返回；单个调用 panic 不影响其余调用
    pub async fn run_batch(&self, calls: Vec<BatchCall>) -> HashMap<String, ToolResult> {
        let mut keys = Vec::with_capacity(calls.len());
        let mut handles = Vec::with_capacity(calls.len());

        for call in calls {
            let exec = self.clone();
            keys.push((call.key, call.tool.clone()));
            handles.push(tokio::spawn(async move {
                let _permit = match &exec.scheduler {
                    Some(scheduler) => match scheduler.acquire_tool().await {
                        Ok(permit) => Some(permit),
                        Err(e) => {
                            return ToolResult::failure(
                                &call.tool,
                                ErrorKind::ExternalFailure,
                                e.to_string(),
                                0,
                            )
                        }
                    },
                    None => None,
                };
                exec.run(&call.tool, call.args).await
            }));
        }

        let joined = join_all(handles).await;
        keys.into_iter()
            .zip(joined)
            .map(|((key, tool), res)| {
                let result = res.unwrap_or_else(|e| {
                    tracing::warn!(tool = %tool, error = %e, "tool task aborted");
                    ToolResult::failure(
                        &tool,
                        ErrorKind::ExternalFailure,
                        format!("task failed: {e}"),
                        0,
                    )
                });
                (key, result)
            })
            .collect()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn audit(result: &ToolResult, outcome: &str, args_preview: &str) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": result.meta.tool,
        "ok": result.ok,
        "outcome": outcome,
        "error_kind": result.error_kind.map(|k| k.as_str()),
        "duration_ms": result.meta.latency_ms,
        "cached": result.meta.cached,
        "args_preview": args_preview,
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
