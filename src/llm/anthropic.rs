//! Anthropic Messages API 后端（备用后端）
//!
//! `POST {base_url}/v1/messages`，`x-api-key` + `anthropic-version` 头。
//! 工具调用为 assistant 消息中的 `tool_use` 块，结果以 user 消息中的 `tool_result` 块回传。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::LlmError;
use crate::llm::traits::truncate_body;
use crate::llm::{AdapterResult, ChatProvider, GenerateRequest, TokenUsage, ToolCall, TurnItem};
use crate::tools::{to_provider_schema, ProviderKind};

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Anthropic 客户端
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    pub usage: TokenUsage,
}

impl AnthropicProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<&str>,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url
                .unwrap_or(DEFAULT_ANTHROPIC_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            max_tokens,
            usage: TokenUsage::new(),
        }
    }

    fn build_request<'a>(&'a self, request: &GenerateRequest<'a>) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: request.system,
            messages: request.items.iter().map(to_message).collect(),
            tools: to_provider_schema(ProviderKind::Anthropic, request.tools),
        }
    }

    fn parse_response(&self, response: MessagesResponse) -> AdapterResult {
        if let Some(u) = &response.usage {
            self.usage.add(u.input_tokens, u.output_tokens);
            tracing::debug!(
                prompt = u.input_tokens,
                completion = u.output_tokens,
                "anthropic token usage"
            );
        }

        let mut text = String::new();
        let mut calls = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::ToolUse { id, name, input } => calls.push(ToolCall {
                    id,
                    name,
                    args: input,
                }),
                ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
            }
        }

        if calls.is_empty() {
            tracing::debug!(stop_reason = ?response.stop_reason, "anthropic final text");
            AdapterResult::FinalText(text)
        } else {
            tracing::debug!("Anthropic returned {} tool calls", calls.len());
            AdapterResult::ToolCalls {
                text: (!text.is_empty()).then_some(text),
                calls,
            }
        }
    }
}

fn to_message(item: &TurnItem) -> AnthropicMessage {
    match item {
        TurnItem::User(text) => AnthropicMessage {
            role: "user",
            content: MessageContent::Text(text.clone()),
        },
        TurnItem::Assistant(text) => AnthropicMessage {
            role: "assistant",
            content: MessageContent::Text(text.clone()),
        },
        TurnItem::ToolCalls { text, calls } => {
            let mut blocks: Vec<ContentBlock> = text
                .iter()
                .map(|t| ContentBlock::Text { text: t.clone() })
                .collect();
            blocks.extend(calls.iter().map(|c| ContentBlock::ToolUse {
                id: c.id.clone(),
                name: c.name.clone(),
                // input 必须是对象
                input: if c.args.is_object() {
                    c.args.clone()
                } else {
                    Value::Object(Default::default())
                },
            }));
            AnthropicMessage {
                role: "assistant",
                content: MessageContent::Blocks(blocks),
            }
        }
        TurnItem::ToolResults(results) => AnthropicMessage {
            role: "user",
            content: MessageContent::Blocks(
                results
                    .iter()
                    .map(|r| ContentBlock::ToolResult {
                        tool_use_id: r.call_id.clone(),
                        content: r.content.clone(),
                    })
                    .collect(),
            ),
        },
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<AdapterResult, LlmError> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::Credentials {
                provider: PROVIDER.to_string(),
                message: "ANTHROPIC_API_KEY is not set".to_string(),
            });
        }

        let body = self.build_request(&request);
        tracing::debug!(model = %self.model, tools = request.tools.len(), "anthropic messages");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, e))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, e))?;
        if !status.is_success() {
            tracing::error!("Anthropic API error {}: {}", status, truncate_body(&raw));
            return Err(LlmError::Api {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body: truncate_body(&raw),
            });
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&raw).map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                message: format!("{e}: {}", truncate_body(&raw)),
            })?;
        Ok(self.parse_response(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::llm::ToolResult;
    use crate::tools::catalog;

    fn provider(key: &str) -> AnthropicProvider {
        AnthropicProvider::new(key, DEFAULT_ANTHROPIC_MODEL, None, DEFAULT_MAX_TOKENS, 5)
    }

    #[test]
    fn test_request_shape() {
        let registry = catalog::default_registry();
        let items = vec![
            TurnItem::User("what's on today?".to_string()),
            TurnItem::ToolCalls {
                text: Some("Checking.".to_string()),
                calls: vec![ToolCall {
                    id: "toolu_1".to_string(),
                    name: "list_events".to_string(),
                    args: Value::Null,
                }],
            },
            TurnItem::ToolResults(vec![ToolResult {
                call_id: "toolu_1".to_string(),
                name: "list_events".to_string(),
                content: r#"{"events":[]}"#.to_string(),
            }]),
        ];
        let p = provider("k");
        let body = serde_json::to_value(p.build_request(&GenerateRequest {
            system: "be brief",
            items: &items,
            tools: registry.all(),
        }))
        .unwrap();

        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"][0]["content"], "what's on today?");
        assert_eq!(body["messages"][1]["content"][0]["type"], "text");
        assert_eq!(body["messages"][1]["content"][1]["type"], "tool_use");
        assert_eq!(body["messages"][1]["content"][1]["input"], json!({}));
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(
            body["tools"].as_array().unwrap().len(),
            registry.all().len()
        );
    }

    #[test]
    fn test_parse_tool_use_and_text() {
        let p = provider("k");
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_9", "name": "search_notes", "input": {"query": "rust"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 40, "output_tokens": 8}
        }))
        .unwrap();

        match p.parse_response(response) {
            AdapterResult::ToolCalls { text, calls } => {
                assert_eq!(text.as_deref(), Some("Let me look."));
                assert_eq!(calls[0].id, "toolu_9");
                assert_eq!(calls[0].args["query"], "rust");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
        assert_eq!(p.token_usage(), (40, 8, 48));
    }

    #[test]
    fn test_parse_ignores_unknown_blocks() {
        let p = provider("k");
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Done."}
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(
            p.parse_response(response),
            AdapterResult::FinalText("Done.".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_credentials_error() {
        let err = provider("")
            .generate(GenerateRequest {
                system: "",
                items: &[],
                tools: &[],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Credentials { .. }));
    }
}
