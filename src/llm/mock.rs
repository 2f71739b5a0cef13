//! 脚本化后端（用于测试，无需 API）
//!
//! 按顺序返回预设结果；队列耗尽后重复 `repeat`（若设置），否则返回错误。
//! 记录调用次数与每次收到的请求内容，便于断言循环行为。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::LlmError;
use crate::llm::{AdapterResult, ChatProvider, GenerateRequest, TurnItem};

pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Result<AdapterResult, LlmError>>>,
    repeat: Option<Result<AdapterResult, LlmError>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<TurnItem>>>,
    seen_tools: Mutex<Vec<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, script: Vec<Result<AdapterResult, LlmError>>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            seen_tools: Mutex::new(Vec::new()),
        }
    }

    /// 每次都返回同一个结果
    pub fn repeating(name: impl Into<String>, result: Result<AdapterResult, LlmError>) -> Self {
        Self {
            repeat: Some(result),
            ..Self::new(name, Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 第 n 次调用收到的内容项
    pub fn request_items(&self, n: usize) -> Option<Vec<TurnItem>> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(n)
            .cloned()
    }

    /// 第 n 次调用收到的工具名
    pub fn request_tools(&self, n: usize) -> Option<Vec<String>> {
        self.seen_tools
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(n)
            .cloned()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<AdapterResult, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.items.to_vec());
        self.seen_tools
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.tools.iter().map(|t| t.name.clone()).collect());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match (next, &self.repeat) {
            (Some(result), _) => result,
            (None, Some(result)) => result.clone(),
            (None, None) => Err(LlmError::Other(format!("{}: script exhausted", self.name))),
        }
    }
}
