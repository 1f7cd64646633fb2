//! 内存线程存储

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ThreadId, ThreadState, ThreadStore};
use crate::core::TripError;

#[derive(Default)]
pub struct MemoryThreadStore {
    threads: RwLock<HashMap<ThreadId, ThreadState>>,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>, TripError> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn save(&self, state: &ThreadState) -> Result<(), TripError> {
        self.threads
            .write()
            .await
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, TripError> {
        Ok(self.threads.write().await.remove(thread_id).is_some())
    }

    async fn thread_ids(&self) -> Result<Vec<ThreadId>, TripError> {
        let mut ids: Vec<ThreadId> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = MemoryThreadStore::new();
        assert!(store.load("t1").await.unwrap().is_none());

        let state = ThreadState::new("t1", 10);
        store.save(&state).await.unwrap();
        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded.thread_id, "t1");
        assert_eq!(store.thread_ids().await.unwrap(), vec!["t1".to_string()]);

        assert!(store.delete("t1").await.unwrap());
        assert!(!store.delete("t1").await.unwrap());
    }
}
