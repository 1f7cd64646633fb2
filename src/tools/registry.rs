//! 工具注册表
//!
//! 每个数据提供方（航班、天气、活动、周边、预算、行程组装）实现 Tool trait，
//! 由 ToolRegistry 按名注册与查找；ToolExecutor 在调用时加超时、缓存与审计日志。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 工具 trait：返回原始 JSON（结构松散，由 validate 模块负责收紧）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 注册名
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 执行工具；Err 为提供方的错误文本，用于错误分类
    async fn call(&self, args: Value) -> Result<Value, String>;
}

/// 按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        tracing::debug!(tool = %name, description = tool.description(), "tool registered");
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}
