//! 任务调度：步骤工作池
//!
//! 回合内并发执行的计划步骤共享一个 Semaphore，限制同时在途的工具调用数（默认 3）。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::core::TripError;

/// 有界工作池：克隆后共享同一组许可
#[derive(Clone, Debug)]
pub struct TaskScheduler {
    /// 工具并发限制
    tool_semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl TaskScheduler {
    pub fn new(max_concurrent_tools: usize) -> Self {
        let max_concurrent = max_concurrent_tools.max(1);
        Self {
            tool_semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// 获取工具执行许可；许可随返回值 drop 归还
    pub async fn acquire_tool(&self) -> Result<OwnedSemaphorePermit, TripError> {
        self.tool_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TripError::SchedulerClosed)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available(&self) -> usize {
        self.tool_semaphore.available_permits()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(3)
    }
}
