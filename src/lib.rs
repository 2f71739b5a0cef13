//! Aide - Rust 个人自动化助手
//!
//! 模块划分：
//! - **agent**: 运行时装配（配置 + 凭证 -> FallbackOrchestrator）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、失败分类、双后端容灾编排器
//! - **llm**: 模型后端抽象与实现（Gemini / Anthropic / 脚本化 Mock）
//! - **memory**: 会话记忆（TTL、条数上限、防抖快照持久化）
//! - **observability**: tracing 初始化
//! - **react**: 后端无关的工具调用循环与系统提示词
//! - **tools**: 工具定义与校验、分组与路由、schema 翻译、执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use core::{AgentError, FallbackOrchestrator};
pub use react::{AgentLoop, ChatAdapter};
