//! SQLite 线程存储
//!
//! 每个线程一行，state 列保存 ThreadState 的 JSON 快照；服务重启后可恢复对话。
//! rusqlite 为同步接口，所有访问放到 spawn_blocking 中执行。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{ThreadId, ThreadState, ThreadStore};
use crate::core::TripError;

pub struct SqliteThreadStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteThreadStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TripError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, TripError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, TripError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS trip_threads (
                thread_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, TripError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, TripError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| TripError::Store("sqlite connection poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| TripError::Store(format!("sqlite task failed: {e}")))?
    }
}

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>, TripError> {
        let id = thread_id.to_string();
        let raw: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT state FROM trip_threads WHERE thread_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &ThreadState) -> Result<(), TripError> {
        let json = serde_json::to_string(state)?;
        let id = state.thread_id.clone();
        let updated_at = state.updated_at.to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO trip_threads (thread_id, state, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(thread_id) DO UPDATE
                 SET state = excluded.state, updated_at = excluded.updated_at",
                params![id, json, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, TripError> {
        let id = thread_id.to_string();
        self.with_conn(move |conn| {
            let n = conn.execute("DELETE FROM trip_threads WHERE thread_id = ?1", params![id])?;
            Ok(n > 0)
        })
        .await
    }

    async fn thread_ids(&self) -> Result<Vec<ThreadId>, TripError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT thread_id FROM trip_threads ORDER BY thread_id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }
}
