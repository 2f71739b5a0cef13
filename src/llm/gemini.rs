//! Google Gemini 后端（主后端）
//!
//! `POST {base_url}/models/{model}:generateContent?key=...`。工具以 `functionDeclarations` 声明，
//! 模型返回 `functionCall` part；Gemini 不提供调用 id，这里为每个调用生成 uuid，
//! 结果以 `functionResponse` part 回传。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::LlmError;
use crate::llm::traits::{tool_result_value, truncate_body};
use crate::llm::{AdapterResult, ChatProvider, GenerateRequest, TokenUsage, ToolCall, TurnItem};
use crate::tools::{to_provider_schema, ProviderKind};

const PROVIDER: &str = "gemini";

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

/// Gemini 客户端
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    pub usage: TokenUsage,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<&str>,
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
                .unwrap_or(DEFAULT_GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            usage: TokenUsage::new(),
        }
    }

    fn build_request(&self, request: &GenerateRequest<'_>) -> GeminiRequest {
        let contents = request.items.iter().map(to_content).collect();
        let system_instruction = (!request.system.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(request.system)],
        });
        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTool {
                function_declarations: to_provider_schema(ProviderKind::Gemini, request.tools),
            }]
        };
        GeminiRequest {
            contents,
            system_instruction,
            tools,
        }
    }

    fn parse_response(&self, response: GeminiResponse) -> Result<AdapterResult, LlmError> {
        if let Some(u) = &response.usage_metadata {
            let prompt = u.prompt_token_count.unwrap_or(0);
            let completion = u.candidates_token_count.unwrap_or(0);
            self.usage.add(prompt, completion);
            tracing::debug!(prompt, completion, "gemini token usage");
        }

        let Some(candidate) = response.candidates.into_iter().next() else {
            let feedback = response
                .prompt_feedback
                .map(|f| f.to_string())
                .unwrap_or_default();
            return Err(LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                message: format!("response has no candidates {feedback}"),
            });
        };

        let mut text = String::new();
        let mut calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(fc) = part.function_call {
                calls.push(ToolCall {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: fc.name,
                    args: fc.args,
                });
            }
        }

        if calls.is_empty() {
            if text.is_empty() {
                tracing::debug!(finish_reason = ?candidate.finish_reason, "gemini returned empty text");
            }
            Ok(AdapterResult::FinalText(text))
        } else {
            tracing::debug!("Gemini returned {} tool calls", calls.len());
            Ok(AdapterResult::ToolCalls {
                text: (!text.is_empty()).then_some(text),
                calls,
            })
        }
    }
}

fn to_content(item: &TurnItem) -> GeminiContent {
    match item {
        TurnItem::User(text) => GeminiContent {
            role: Some("user"),
            parts: vec![GeminiPart::text(text.as_str())],
        },
        TurnItem::Assistant(text) => GeminiContent {
            role: Some("model"),
            parts: vec![GeminiPart::text(text.as_str())],
        },
        TurnItem::ToolCalls { text, calls } => {
            let mut parts: Vec<GeminiPart> = text.iter().map(|t| GeminiPart::text(t.as_str())).collect();
            parts.extend(calls.iter().map(|c| GeminiPart {
                function_call: Some(GeminiFunctionCall {
                    name: c.name.clone(),
                    args: c.args.clone(),
                }),
                ..GeminiPart::default()
            }));
            GeminiContent {
                role: Some("model"),
                parts,
            }
        }
        TurnItem::ToolResults(results) => GeminiContent {
            role: Some("user"),
            parts: results
                .iter()
                .map(|r| GeminiPart {
                    function_response: Some(GeminiFunctionResponse {
                        name: r.name.clone(),
                        response: tool_result_value(&r.content),
                    }),
                    ..GeminiPart::default()
                })
                .collect(),
        },
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
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
                message: "GEMINI_API_KEY is empty".to_string(),
            });
        }

        let body = self.build_request(&request);
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        tracing::debug!(model = %self.model, tools = request.tools.len(), "gemini generateContent");

        // URL 带 key，错误信息中去掉 URL
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, e.without_url()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, e.without_url()))?;
        if !status.is_success() {
            tracing::error!("Gemini API error {}: {}", status, truncate_body(&raw));
            return Err(LlmError::Api {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body: truncate_body(&raw),
            });
        }

        let parsed: GeminiResponse =
            serde_json::from_str(&raw).map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                message: format!("{e}: {}", truncate_body(&raw)),
            })?;
        self.parse_response(parsed)
    }
}
