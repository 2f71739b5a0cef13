//! 工具执行器
//!
//! 持有 ToolRegistry、ToolBackend 与全局超时。execute(tool_name, args) 先按定义校验参数，
//! 再在超时内调用后端；任何失败都转成 `{"error": "..."}` 字符串交还给模型，从不向上抛错。
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout;

use crate::core::ToolError;
use crate::tools::{ToolBackend, ToolRegistry};

/// 工具执行器：校验 + 超时 + 审计
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    backend: Arc<dyn ToolBackend>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, backend: Arc<dyn ToolBackend>, timeout_secs: u64) -> Self {
        Self {
            registry,
            backend,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具，返回成功 payload 或 error payload（均为 JSON 字符串）
    pub async fn execute(&self, tool_name: &str, args: Value) -> String {
        let start = Instant::now();
        let preview = args_preview(&args);
        let result = self.try_execute(tool_name, args).await;

        let (ok, outcome) = match &result {
            Ok(_) => (true, "ok"),
            Err(ToolError::Timeout(_)) => (false, "timeout"),
            Err(ToolError::InvalidArguments { .. }) => (false, "invalid_args"),
            Err(ToolError::UnknownTool(_)) => (false, "unknown_tool"),
            Err(ToolError::ExecutionFailed(_)) => (false, "error"),
        };
        let audit = json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(value) => value.to_string(),
            Err(e) => error_payload(&e.to_string()),
        }
    }

    async fn try_execute(&self, tool_name: &str, args: Value) -> Result<Value, ToolError> {
        let definition = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;
        let args = definition.validate(args)?;

        match timeout(self.timeout, self.backend.invoke(tool_name, args)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ToolError::ExecutionFailed(e)),
            Err(_) => Err(ToolError::Timeout(tool_name.to_string())),
        }
    }
}

/// `{"error": message}`
pub fn error_payload(message: &str) -> String {
    json!({ "error": message }).to_string()
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::tools::{catalog, ToolArgs};

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolBackend for CountingBackend {
        async fn invoke(&self, name: &str, args: ToolArgs) -> Result<Value, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match name {
                "create_task" => Ok(json!({"id": "t1", "title": args.str("title")})),
                "list_agents" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!([]))
                }
                _ => Err("integration exploded".to_string()),
            }
        }
    }

    fn executor(timeout_secs: u64) -> (ToolExecutor, Arc<CountingBackend>) {
        let backend = Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
        });
        let exec = ToolExecutor::new(
            Arc::new(catalog::default_registry()),
            backend.clone(),
            timeout_secs,
        );
        (exec, backend)
    }

    fn parse(s: &str) -> Value {
        serde_json::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_success_payload() {
        let (exec, _) = executor(5);
        let out = parse(&exec.execute("create_task", json!({"title": "milk"})).await);
        assert_eq!(out["id"], "t1");
        assert_eq!(out["title"], "milk");
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_payload() {
        let (exec, backend) = executor(5);
        let out = parse(&exec.execute("launch_rocket", json!({})).await);
        assert!(out["error"].as_str().unwrap().contains("launch_rocket"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_args_never_reach_backend() {
        let (exec, backend) = executor(5);
        let out = parse(&exec.execute("create_task", json!({"notes": "no title"})).await);
        assert!(out["error"].as_str().unwrap().contains("title"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_error_payload() {
        let (exec, _) = executor(5);
        let out = parse(&exec.execute("search_notes", json!({"query": "x"})).await);
        assert!(out["error"].as_str().unwrap().contains("integration exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_error_payload() {
        let (exec, _) = executor(1);
        let out = parse(&exec.execute("list_agents", Value::Null).await);
        assert!(out["error"].as_str().unwrap().contains("timeout"));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = json!({"text": "x".repeat(500)});
        assert!(args_preview(&long).ends_with("..."));
        assert_eq!(args_preview(&json!({})), "{}");
    }
}
