//! 模型后端抽象
//!
//! 每个后端只负责请求构建与响应解析：输入一轮完整的对话内容（TurnItem 序列）与工具子集，
//! 输出 AdapterResult（最终文本或一组工具调用）。多轮循环由 react::AgentLoop 统一驱动。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::LlmError;
use crate::tools::ToolDefinition;

/// 模型请求的一次工具调用
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// 后端给出的调用 id（Gemini 不提供，由适配器生成）
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// 工具调用结果，content 为 JSON 字符串（成功 payload 或 `{"error": ...}`）
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub content: String,
}

/// 一轮对话中累积的内容项
#[derive(Debug, Clone, PartialEq)]
pub enum TurnItem {
    User(String),
    Assistant(String),
    /// 模型发出的工具调用（可能附带一段文本）
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// 与上一条 ToolCalls 一一对应的结果
    ToolResults(Vec<ToolResult>),
}

/// 单次模型调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterResult {
    FinalText(String),
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
}

/// 单次模型调用的输入
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub system: &'a str,
    pub items: &'a [TurnItem],
    pub tools: &'a [ToolDefinition],
}

/// 模型后端
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<AdapterResult, LlmError>;

    /// 累计 token 使用：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    prompt_tokens: Arc<AtomicU64>,
    completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

/// 工具结果转为结构化 JSON：非 JSON 文本包成 `{"result": text}`
pub(crate) fn tool_result_value(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(v @ Value::Object(_)) => v,
        Ok(other) => serde_json::json!({ "result": other }),
        Err(_) => serde_json::json!({ "result": content }),
    }
}

/// 截断后端返回的错误正文，避免日志与错误信息过长
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 1000;
    if body.chars().count() > MAX {
        format!("{}...[truncated]", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
