//! 运行时装配
//!
//! create_runtime 按配置与凭证构建：工具目录与路由、会话记忆（含快照存储）、工具后端、
//! 主后端（仅当 GEMINI_API_KEY 存在）与备用后端，最后组装为 FallbackOrchestrator。
//! 通道层（CLI、消息 webhook 等）只需持有 Runtime 并调用 `orchestrator.chat`。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{
    env_credential, AppConfig, ANTHROPIC_API_KEY, GEMINI_API_KEY, SNAPSHOT_TOKEN, TOOLS_TOKEN,
};
use crate::core::FallbackOrchestrator;
use crate::llm::{AnthropicProvider, ChatProvider, GeminiProvider};
use crate::memory::{
    ConversationStore, FileSnapshotStore, HttpSnapshotStore, SnapshotStore, SystemClock,
};
use crate::react::{AgentLoop, ChatAdapter, SystemPrompt, DEFAULT_SYSTEM_PROMPT};
use crate::tools::{
    catalog, OfflineToolBackend, RemoteToolBackend, ToolBackend, ToolExecutor, ToolRouter,
};

/// 启动时读取一次的凭证
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub gemini: Option<String>,
    pub anthropic: Option<String>,
    pub tools_token: Option<String>,
    pub snapshot_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            gemini: env_credential(GEMINI_API_KEY),
            anthropic: env_credential(ANTHROPIC_API_KEY),
            tools_token: env_credential(TOOLS_TOKEN),
            snapshot_token: env_credential(SNAPSHOT_TOKEN),
        }
    }
}

/// 装配好的运行时
pub struct Runtime {
    pub orchestrator: Arc<FallbackOrchestrator>,
    pub memory: ConversationStore,
}

/// 读取系统提示词：配置路径 > config/prompts/system.txt > 内置默认
pub fn load_system_prompt(path: Option<&Path>) -> SystemPrompt {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![p.to_path_buf()],
        None => vec![
            PathBuf::from("config/prompts/system.txt"),
            PathBuf::from("../config/prompts/system.txt"),
        ],
    };
    let base = candidates
        .iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_else(|| {
            if let Some(p) = path {
                tracing::warn!("System prompt {} not readable, using built-in prompt", p.display());
            }
            DEFAULT_SYSTEM_PROMPT.to_string()
        });
    SystemPrompt::new(base)
}

fn snapshot_store(cfg: &AppConfig, creds: &Credentials) -> Option<Arc<dyn SnapshotStore>> {
    if let Some(url) = &cfg.memory.snapshot_url {
        tracing::info!("Conversation snapshots: {}", url);
        return Some(Arc::new(HttpSnapshotStore::new(
            url.clone(),
            creds.snapshot_token.clone(),
        )));
    }
    if let Some(path) = &cfg.memory.snapshot_path {
        tracing::info!("Conversation snapshots: {}", path.display());
        return Some(Arc::new(FileSnapshotStore::new(path)));
    }
    tracing::info!("No snapshot store configured, conversation memory is process-local");
    None
}

fn tool_backend(cfg: &AppConfig, creds: &Credentials) -> Arc<dyn ToolBackend> {
    match &cfg.tools.endpoint {
        Some(endpoint) => Arc::new(RemoteToolBackend::new(
            endpoint.clone(),
            creds.tools_token.clone(),
            cfg.tools.tool_timeout_secs,
        )),
        None => {
            tracing::warn!("No tool endpoint configured, tool calls will report errors");
            Arc::new(OfflineToolBackend)
        }
    }
}

/// 按配置与凭证构建运行时（不发起任何网络请求）
pub fn create_runtime(cfg: &AppConfig, creds: &Credentials) -> Runtime {
    let registry = Arc::new(catalog::default_registry());
    let router = ToolRouter::new(
        registry.clone(),
        catalog::default_rules(),
        catalog::DEFAULT_GROUPS,
    );

    let memory = ConversationStore::new(
        cfg.memory.to_memory_config(),
        snapshot_store(cfg, creds),
        Arc::new(SystemClock),
    );
    let executor = Arc::new(ToolExecutor::new(
        registry.clone(),
        tool_backend(cfg, creds),
        cfg.tools.tool_timeout_secs,
    ));
    let prompt = load_system_prompt(cfg.app.system_prompt_path.as_deref());
    let timeout = cfg.llm.timeouts.request;

    let adapter = |provider: Arc<dyn ChatProvider>| -> Arc<dyn ChatAdapter> {
        Arc::new(
            AgentLoop::new(provider, executor.clone(), memory.clone(), prompt.clone())
                .with_max_rounds(cfg.llm.max_rounds),
        )
    };

    let primary = creds.gemini.as_ref().map(|key| {
        tracing::info!("Primary backend: gemini ({})", cfg.llm.gemini.model);
        let provider: Arc<dyn ChatProvider> = Arc::new(GeminiProvider::new(
            key.clone(),
            cfg.llm.gemini.model.clone(),
            cfg.llm.gemini.base_url.as_deref(),
            timeout,
        ));
        adapter(provider)
    });
    if primary.is_none() {
        tracing::info!("{} not set, using the secondary backend only", GEMINI_API_KEY);
    }
    if creds.anthropic.is_none() {
        tracing::warn!("{} not set, secondary backend calls will fail", ANTHROPIC_API_KEY);
    }
    let anthropic: Arc<dyn ChatProvider> = Arc::new(AnthropicProvider::new(
        creds.anthropic.clone().unwrap_or_default(),
        cfg.llm.anthropic.model.clone(),
        cfg.llm.anthropic.base_url.as_deref(),
        cfg.llm.anthropic.max_tokens,
        timeout,
    ));
    let secondary = adapter(anthropic);

    Runtime {
        orchestrator: Arc::new(FallbackOrchestrator::new(
            primary, secondary, router, registry,
        )),
        memory,
    }
}
