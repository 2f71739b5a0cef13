//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AIDE__*` 覆盖（双下划线表示嵌套，如 `AIDE__MEMORY__TTL_SECS=600`）。
//! 凭证只从环境变量读取：GEMINI_API_KEY、ANTHROPIC_API_KEY、AIDE_TOOLS_TOKEN、AIDE_SNAPSHOT_TOKEN。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::anthropic::{DEFAULT_ANTHROPIC_MODEL, DEFAULT_MAX_TOKENS};
use crate::llm::gemini::DEFAULT_GEMINI_MODEL;
use crate::memory::{MemoryConfig, MAX_HISTORY};
use crate::react::MAX_ROUNDS;

pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const TOOLS_TOKEN: &str = "AIDE_TOOLS_TOKEN";
pub const SNAPSHOT_TOKEN: &str = "AIDE_SNAPSHOT_TOKEN";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub memory: MemorySection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// CLI 通道使用的会话 id
    pub conversation_id: String,
    /// 系统提示词文件，未设置时查找 config/prompts/system.txt
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "aide".to_string(),
            conversation_id: "cli".to_string(),
            system_prompt_path: None,
        }
    }
}

/// [llm] 段：两个后端的模型与端点、轮数上限、请求超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub max_rounds: usize,
    pub gemini: GeminiSection,
    pub anthropic: AnthropicSection,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            max_rounds: MAX_ROUNDS,
            gemini: GeminiSection::default(),
            anthropic: AnthropicSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiSection {
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for GeminiSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnthropicSection {
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
}

impl Default for AnthropicSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次模型请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [memory] 段：历史条数、TTL、防抖、快照位置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub max_history: usize,
    pub ttl_secs: u64,
    pub debounce_ms: u64,
    /// 本地 JSON 快照文件
    pub snapshot_path: Option<PathBuf>,
    /// 远程 blob 地址；与 snapshot_path 同时设置时优先
    pub snapshot_url: Option<String>,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_history: MAX_HISTORY,
            ttl_secs: 2 * 60 * 60,
            debounce_ms: 3000,
            snapshot_path: None,
            snapshot_url: None,
        }
    }
}

impl MemorySection {
    /// max_history 向上取偶数：历史按 user/assistant 成对保存，裁剪后首条必须是 user
    pub fn to_memory_config(&self) -> MemoryConfig {
        let max_history = self.max_history.max(2);
        MemoryConfig {
            max_history: max_history + max_history % 2,
            ttl: Duration::from_secs(self.ttl_secs),
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }
}

/// [tools] 段：工具超时与集成服务端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 实现工具执行边界的 HTTP 端点；未设置时所有工具调用返回错误
    pub endpoint: Option<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            endpoint: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 AIDE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AIDE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AIDE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 读取非空环境变量
pub fn env_credential(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
