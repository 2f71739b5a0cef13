//! LLM 层：后端抽象与实现（Gemini / Anthropic / 脚本化 Mock）

pub mod anthropic;
pub mod gemini;
pub mod mock;
pub mod traits;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use mock::ScriptedProvider;
pub use traits::{
    AdapterResult, ChatProvider, GenerateRequest, TokenUsage, ToolCall, ToolResult, TurnItem,
};
