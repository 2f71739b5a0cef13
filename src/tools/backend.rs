//! 工具执行边界
//!
//! ToolBackend 是所有具体集成（日历、邮件、任务、云盘、笔记、联系人、子智能体）的唯一入口。
//! 编排层只看到 `invoke(name, args) -> JSON`，不关心集成内部。

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::tools::ToolArgs;

/// 工具后端：执行已校验参数的工具调用
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn invoke(&self, name: &str, args: ToolArgs) -> Result<Value, String>;
}

#[derive(Serialize)]
struct RemoteToolRequest<'a> {
    tool: &'a str,
    args: Value,
}

/// 远程工具后端：把调用以 `{"tool": ..., "args": {...}}` POST 到集成服务
pub struct RemoteToolBackend {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl RemoteToolBackend {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
            token,
        }
    }
}

#[async_trait]
impl ToolBackend for RemoteToolBackend {
    async fn invoke(&self, name: &str, args: ToolArgs) -> Result<Value, String> {
        let body = RemoteToolRequest {
            tool: name,
            args: args.to_value(),
        };
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        let text = response.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("tool endpoint returned {status}: {text}"));
        }

        let value: Value =
            serde_json::from_str(&text).unwrap_or_else(|_| serde_json::json!({ "result": text }));
        // 集成服务自己报告的失败
        if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
            return Err(err.to_string());
        }
        Ok(value)
    }
}

/// 未配置集成服务时使用：所有调用都返回错误，由模型向用户说明
#[derive(Debug, Default)]
pub struct OfflineToolBackend;

#[async_trait]
impl ToolBackend for OfflineToolBackend {
    async fn invoke(&self, name: &str, _args: ToolArgs) -> Result<Value, String> {
        Err(format!(
            "{name} is not available: no tool endpoint is configured"
        ))
    }
}
