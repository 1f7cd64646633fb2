//! 记忆层：会话线程内的短期对话历史

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
