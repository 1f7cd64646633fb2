//! tripmind - 对话式行程规划编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、回合状态、任务调度、回合编排
//! - **dialogue**: 行程上下文、槽位追踪与来源、语义分类器接缝
//! - **memory**: 线程内对话历史
//! - **planning**: 计划构建、重新规划、并行执行引擎
//! - **session**: 线程快照存储（内存 / SQLite）
//! - **tools**: 工具注册、调用包装、结果校验、缓存与离线提供方

pub mod config;
pub mod core;
pub mod dialogue;
pub mod memory;
pub mod observability;
pub mod planning;
pub mod session;
pub mod tools;

pub use crate::core::{create_orchestrator, TripOrchestrator, TurnResponse, TurnStatus};
