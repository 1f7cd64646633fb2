//! 工具结果缓存
//!
//! 键为「工具名 + 规范化参数」，容量有界（按插入顺序淘汰最旧条目），可选 TTL。
//! 由 ToolExecutor 持有，只缓存成功结果。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

pub struct ToolCache {
    capacity: usize,
    ttl: Option<Duration>,
    inner: Mutex<Inner>,
}

impl ToolCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// serde_json 的 Map 默认按键排序，to_string 即为规范形式
    pub fn key(tool: &str, args: &Value) -> String {
        format!("{tool}:{args}")
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match inner.entries.get(key) {
            Some(entry) => self
                .ttl
                .map(|ttl| entry.inserted_at.elapsed() > ttl)
                .unwrap_or(false),
            None => return None,
        };
        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }
        inner.entries.get(key).map(|e| e.value.clone())
    }

    pub fn put(&self, key: String, value: Value) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
