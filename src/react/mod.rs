//! 对话轮次层：后端无关的工具调用循环与系统提示词

pub mod loop_;
pub mod prompt;

pub use loop_::{AgentLoop, ChatAdapter, EMPTY_REPLY_MESSAGE, MAX_ROUNDS, ROUND_LIMIT_MESSAGE};
pub use prompt::{SystemPrompt, DEFAULT_SYSTEM_PROMPT};
