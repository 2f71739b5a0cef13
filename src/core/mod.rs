//! 核心编排层：错误类型与失败分类、双后端容灾编排器

pub mod error;
pub mod orchestrator;

pub use error::{
    classify, AgentError, Classification, FailureClass, FailureReason, LlmError, ToolError,
};
pub use orchestrator::FallbackOrchestrator;
