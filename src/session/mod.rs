//! 会话线程存储抽象层
//!
//! 按线程 ID 保存一次对话的完整快照（行程上下文、当前计划、结果映射、重规划签名、历史），
//! 支持内存与 SQLite 两种实现。

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{StoreBackend, StoreSection};
use crate::core::TripError;
use crate::dialogue::TripContext;
use crate::memory::ConversationMemory;
use crate::planning::{Plan, Replanner, ResultMap};

pub use memory::MemoryThreadStore;
pub use sqlite::SqliteThreadStore;

pub type ThreadId = String;

/// 新线程 ID：thread_<uuid>
pub fn new_thread_id() -> ThreadId {
    format!("thread_{}", uuid::Uuid::new_v4())
}

/// 单个线程的持久化状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadState {
    pub thread_id: ThreadId,
    pub context: TripContext,
    pub plan: Option<Plan>,
    #[serde(default)]
    pub results: ResultMap,
    #[serde(default)]
    pub replanner: Replanner,
    pub history: ConversationMemory,
    pub updated_at: DateTime<Utc>,
}

impl ThreadState {
    pub fn new(thread_id: impl Into<ThreadId>, max_turns: usize) -> Self {
        Self {
            thread_id: thread_id.into(),
            context: TripContext::new(),
            plan: None,
            results: ResultMap::new(),
            replanner: Replanner::new(),
            history: ConversationMemory::new(max_turns),
            updated_at: Utc::now(),
        }
    }
}

/// 线程存储接口
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// 读取线程快照，不存在返回 None
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>, TripError>;

    /// 覆盖写入线程快照
    async fn save(&self, state: &ThreadState) -> Result<(), TripError>;

    async fn delete(&self, thread_id: &str) -> Result<bool, TripError>;

    async fn thread_ids(&self) -> Result<Vec<ThreadId>, TripError>;
}

/// 按配置创建存储后端
pub fn create_thread_store(cfg: &StoreSection) -> Result<Arc<dyn ThreadStore>, TripError> {
    match cfg.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryThreadStore::new())),
        StoreBackend::Sqlite => {
            if let Some(parent) = cfg.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| TripError::Store(format!("create {}: {e}", parent.display())))?;
            }
            tracing::info!(path = %cfg.db_path.display(), "using sqlite thread store");
            Ok(Arc::new(SqliteThreadStore::open(&cfg.db_path)?))
        }
    }
}
