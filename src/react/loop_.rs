//! 工具调用主循环（单个后端上的一次完整对话轮次）
//!
//! 历史 + 用户消息 -> 调用模型 -> 若返回工具调用则执行并把结果追加进内容 -> 再次调用模型，
//! 直到模型给出最终文本或达到 max_rounds。
//! - 最终文本：写入记忆（历史 + 用户消息 + 回复）后返回
//! - 达到轮数上限：写入并返回固定的降级回复，不视为错误
//! - 工具失败以 error payload 回传给模型，不中断轮次；只有模型调用失败会向上返回 LlmError
//!
//! 每条终止路径恰好写一次记忆。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::core::LlmError;
use crate::llm::{AdapterResult, ChatProvider, GenerateRequest, ToolCall, ToolResult, TurnItem};
use crate::memory::{ConversationStore, Message, Role};
use crate::react::SystemPrompt;
use crate::tools::{ToolDefinition, ToolExecutor};

/// 单轮对话内最多调用模型的次数
pub const MAX_ROUNDS: usize = 10;

/// 达到轮数上限时的回复
pub const ROUND_LIMIT_MESSAGE: &str =
    "I hit a limit processing the request. Please try again, or break it into smaller steps.";

/// 模型给出空回复时的替代文本；空内容不能写入历史，两个后端都会拒绝
pub const EMPTY_REPLY_MESSAGE: &str =
    "I couldn't come up with a reply to that. Could you rephrase it?";

/// 一个后端上的完整对话轮次
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn run_turn(
        &self,
        conversation_id: &str,
        message: &str,
        tools: &[ToolDefinition],
    ) -> Result<String, LlmError>;
}

/// 与具体后端无关的循环实现
pub struct AgentLoop {
    provider: Arc<dyn ChatProvider>,
    executor: Arc<ToolExecutor>,
    memory: ConversationStore,
    prompt: SystemPrompt,
    max_rounds: usize,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        executor: Arc<ToolExecutor>,
        memory: ConversationStore,
        prompt: SystemPrompt,
    ) -> Self {
        Self {
            provider,
            executor,
            memory,
            prompt,
            max_rounds: MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// 同一轮的工具调用并发执行，结果按调用顺序返回
    async fn execute_calls(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| async move {
            let content = self.executor.execute(&call.name, call.args.clone()).await;
            ToolResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                content,
            }
        }))
        .await
    }

    async fn remember(&self, conversation_id: &str, mut history: Vec<Message>, message: &str, reply: &str) {
        history.push(Message::user(message));
        history.push(Message::assistant(reply));
        self.memory.save(conversation_id, history).await;
    }
}

fn non_empty_reply(text: String) -> String {
    if text.trim().is_empty() {
        EMPTY_REPLY_MESSAGE.to_string()
    } else {
        text
    }
}

fn history_items(history: &[Message]) -> Vec<TurnItem> {
    history
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| match m.role {
            Role::User => TurnItem::User(m.content.clone()),
            Role::Assistant => TurnItem::Assistant(m.content.clone()),
        })
        .collect()
}

#[async_trait]
impl ChatAdapter for AgentLoop {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn run_turn(
        &self,
        conversation_id: &str,
        message: &str,
        tools: &[ToolDefinition],
    ) -> Result<String, LlmError> {
        let history = self.memory.get(conversation_id).await;
        let mut items = history_items(&history);
        items.push(TurnItem::User(message.to_string()));
        let system = self.prompt.render();

        for round in 1..=self.max_rounds {
            let result = self
                .provider
                .generate(GenerateRequest {
                    system: &system,
                    items: &items,
                    tools,
                })
                .await?;

            match result {
                AdapterResult::ToolCalls { text, calls } if !calls.is_empty() => {
                    tracing::debug!(
                        provider = self.provider.name(),
                        round,
                        calls = calls.len(),
                        "executing tool calls"
                    );
                    let results = self.execute_calls(&calls).await;
                    items.push(TurnItem::ToolCalls { text, calls });
                    items.push(TurnItem::ToolResults(results));
                }
                AdapterResult::ToolCalls { text, .. } => {
                    let text = non_empty_reply(text.unwrap_or_default());
                    self.remember(conversation_id, history, message, &text).await;
                    return Ok(text);
                }
                AdapterResult::FinalText(text) => {
                    let text = non_empty_reply(text);
                    let (prompt, completion, _) = self.provider.token_usage();
                    tracing::debug!(provider = self.provider.name(), round, prompt, completion, "turn done");
                    self.remember(conversation_id, history, message, &text).await;
                    return Ok(text);
                }
            }
        }

        tracing::warn!(
            provider = self.provider.name(),
            conversation = %conversation_id,
            "round limit ({}) reached, returning degradation message",
            self.max_rounds
        );
        self.remember(conversation_id, history, message, ROUND_LIMIT_MESSAGE)
            .await;
        Ok(ROUND_LIMIT_MESSAGE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::{json, Value};

    use crate::llm::ScriptedProvider;
    use crate::memory::{MemoryConfig, MemorySnapshotStore, SnapshotStore, SystemClock};
    use crate::tools::{catalog, ToolArgs, ToolBackend};

    /// 记录调用顺序；list_events 比 list_tasks 慢
    #[derive(Default)]
    struct RecordingBackend {
        finished: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolBackend for RecordingBackend {
        async fn invoke(&self, name: &str, _args: ToolArgs) -> Result<Value, String> {
            if name == "list_events" {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.finished.lock().unwrap().push(name.to_string());
            Ok(json!({ "tool": name }))
        }
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }

    struct Fixture {
        adapter: AgentLoop,
        provider: Arc<ScriptedProvider>,
        backend: Arc<RecordingBackend>,
        memory: ConversationStore,
        snapshot: Arc<MemorySnapshotStore>,
    }

    fn fixture(provider: ScriptedProvider) -> Fixture {
        let provider = Arc::new(provider);
        let backend = Arc::new(RecordingBackend::default());
        let registry = Arc::new(catalog::default_registry());
        let executor = Arc::new(ToolExecutor::new(registry, backend.clone(), 5));
        let snapshot = Arc::new(MemorySnapshotStore::new());
        let memory = ConversationStore::new(
            MemoryConfig::default(),
            Some(snapshot.clone() as Arc<dyn SnapshotStore>),
            Arc::new(SystemClock),
        );
        let adapter = AgentLoop::new(
            provider.clone(),
            executor,
            memory.clone(),
            SystemPrompt::default(),
        );
        Fixture {
            adapter,
            provider,
            backend,
            memory,
            snapshot,
        }
    }

    #[tokio::test]
    async fn test_plain_answer_single_call() {
        let f = fixture(ScriptedProvider::new(
            "p",
            vec![Ok(AdapterResult::FinalText("Hi!".to_string()))],
        ));
        let out = f.adapter.run_turn("c1", "hello", &[]).await.unwrap();
        assert_eq!(out, "Hi!");
        assert_eq!(f.provider.calls(), 1);
        assert_eq!(
            f.memory.get("c1").await,
            vec![Message::user("hello"), Message::assistant("Hi!")]
        );
    }

    #[tokio::test]
    async fn test_empty_reply_is_never_replayed() {
        let f = fixture(ScriptedProvider::new(
            "p",
            vec![
                Ok(AdapterResult::FinalText(String::new())),
                Ok(AdapterResult::FinalText("second answer".to_string())),
            ],
        ));
        let out = f.adapter.run_turn("c1", "first", &[]).await.unwrap();
        assert_eq!(out, EMPTY_REPLY_MESSAGE);
        f.adapter.run_turn("c1", "second", &[]).await.unwrap();

        let items = f.provider.request_items(1).unwrap();
        assert!(!items.contains(&TurnItem::Assistant(String::new())));
        assert_eq!(
            items,
            vec![
                TurnItem::User("first".to_string()),
                TurnItem::Assistant(EMPTY_REPLY_MESSAGE.to_string()),
                TurnItem::User("second".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_history_entries_are_skipped() {
        let f = fixture(ScriptedProvider::new(
            "p",
            vec![Ok(AdapterResult::FinalText("ok".to_string()))],
        ));
        f.memory
            .save("c1", vec![Message::user("first"), Message::assistant("  ")])
            .await;
        f.adapter.run_turn("c1", "again", &[]).await.unwrap();

        assert_eq!(
            f.provider.request_items(0).unwrap(),
            vec![
                TurnItem::User("first".to_string()),
                TurnItem::User("again".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_history_is_sent_before_new_message() {
        let f = fixture(ScriptedProvider::new(
            "p",
            vec![Ok(AdapterResult::FinalText("second".to_string()))],
        ));
        f.memory
            .save("c1", vec![Message::user("first"), Message::assistant("ok")])
            .await;
        f.adapter.run_turn("c1", "again", &[]).await.unwrap();

        let items = f.provider.request_items(0).unwrap();
        assert_eq!(
            items,
            vec![
                TurnItem::User("first".to_string()),
                TurnItem::Assistant("ok".to_string()),
                TurnItem::User("again".to_string()),
            ]
        );
        assert_eq!(f.memory.get("c1").await.len(), 4);
    }

    #[tokio::test]
    async fn test_one_tool_round_then_answer() {
        let f = fixture(ScriptedProvider::new(
            "p",
            vec![
                Ok(AdapterResult::ToolCalls {
                    text: None,
                    calls: vec![call("a", "create_task", json!({"title": "milk"}))],
                }),
                Ok(AdapterResult::FinalText("Added.".to_string())),
            ],
        ));
        let out = f.adapter.run_turn("c1", "add milk", &[]).await.unwrap();
        assert_eq!(out, "Added.");
        assert_eq!(f.provider.calls(), 2);

        let second = f.provider.request_items(1).unwrap();
        assert_eq!(second.len(), 3);
        match &second[2] {
            TurnItem::ToolResults(results) => {
                assert_eq!(results[0].call_id, "a");
                assert!(results[0].content.contains("create_task"));
            }
            other => panic!("expected tool results, got {other:?}"),
        }

        assert_eq!(
            f.memory.get("c1").await,
            vec![Message::user("add milk"), Message::assistant("Added.")]
        );
        assert!(f.memory.has_pending_write("c1"));
        assert_eq!(f.snapshot.writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_calls_keep_call_order() {
        let f = fixture(ScriptedProvider::new(
            "p",
            vec![
                Ok(AdapterResult::ToolCalls {
                    text: Some("Checking both.".to_string()),
                    calls: vec![
                        call(
                            "1",
                            "list_events",
                            json!({"time_min": "2025-01-01", "time_max": "2025-01-02"}),
                        ),
                        call("2", "list_tasks", json!({})),
                    ],
                }),
                Ok(AdapterResult::FinalText("done".to_string())),
            ],
        ));
        f.adapter.run_turn("c1", "agenda", &[]).await.unwrap();

        // 慢的先发起、后完成
        assert_eq!(
            *f.backend.finished.lock().unwrap(),
            vec!["list_tasks".to_string(), "list_events".to_string()]
        );
        let items = f.provider.request_items(1).unwrap();
        match &items[2] {
            TurnItem::ToolResults(results) => {
                let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
                assert_eq!(ids, vec!["1", "2"]);
            }
            other => panic!("expected tool results, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tool_errors_are_fed_back() {
        let f = fixture(ScriptedProvider::new(
            "p",
            vec![
                Ok(AdapterResult::ToolCalls {
                    text: None,
                    calls: vec![
                        call("x", "launch_rocket", json!({})),
                        call("y", "create_task", json!({})),
                    ],
                }),
                Ok(AdapterResult::FinalText("Sorry.".to_string())),
            ],
        ));
        let out = f.adapter.run_turn("c1", "do it", &[]).await.unwrap();
        assert_eq!(out, "Sorry.");

        let items = f.provider.request_items(1).unwrap();
        let TurnItem::ToolResults(results) = &items[2] else {
            panic!("expected tool results");
        };
        for r in results {
            let v: Value = serde_json::from_str(&r.content).unwrap();
            assert!(v["error"].is_string());
        }
        assert!(f.backend.finished.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_limit_returns_degradation_message() {
        let f = fixture(ScriptedProvider::repeating(
            "p",
            Ok(AdapterResult::ToolCalls {
                text: None,
                calls: vec![call("l", "list_tasks", json!({}))],
            }),
        ));
        let out = f.adapter.run_turn("c1", "loop forever", &[]).await.unwrap();
        assert_eq!(out, ROUND_LIMIT_MESSAGE);
        assert_eq!(f.provider.calls(), MAX_ROUNDS);
        assert_eq!(
            f.memory.get("c1").await,
            vec![
                Message::user("loop forever"),
                Message::assistant(ROUND_LIMIT_MESSAGE)
            ]
        );
    }

    #[tokio::test]
    async fn test_model_failure_propagates_without_memory_write() {
        let f = fixture(ScriptedProvider::new(
            "p",
            vec![Err(LlmError::Api {
                provider: "p".to_string(),
                status: 503,
                body: "down".to_string(),
            })],
        ));
        let err = f.adapter.run_turn("c1", "hello", &[]).await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 503, .. }));
        assert!(f.memory.get("c1").await.is_empty());
        assert!(!f.memory.has_pending_write("c1"));
    }
}
