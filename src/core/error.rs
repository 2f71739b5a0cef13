//! 错误类型与失败分类
//!
//! - LlmError：单次模型调用失败（HTTP 状态、传输、凭证、响应解析）
//! - ToolError：工具调用失败，只会以 `{"error": ...}` 形式回传给模型，不向上抛
//! - AgentError：编排器对外暴露的错误
//!
//! classify 把 LlmError 映射为 FailureClass（fatal / transient），由 FallbackOrchestrator 决定是否切换后端。

use thiserror::Error;

/// 模型后端调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// 后端返回非 2xx 状态
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    /// 请求超时
    #[error("{provider} request timed out: {message}")]
    Timeout { provider: String, message: String },

    /// 连接失败（DNS、拒绝连接、连接被重置等）
    #[error("{provider} network error: {message}")]
    Network { provider: String, message: String },

    /// 凭证缺失或格式错误
    #[error("{provider} credentials missing or malformed: {message}")]
    Credentials { provider: String, message: String },

    /// 响应无法解析
    #[error("{provider} returned an unreadable response: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
                message,
            }
        } else if err.is_connect() || err.is_request() {
            Self::Network {
                provider: provider.to_string(),
                message,
            }
        } else if err.is_decode() {
            Self::InvalidResponse {
                provider: provider.to_string(),
                message,
            }
        } else {
            Self::Other(format!("{provider}: {message}"))
        }
    }
}

/// 工具调用错误（统一转成 error payload 交还给模型）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    Timeout(String),
}

/// 编排器对外的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 单个后端失败（fatal，或未配置主后端时备用后端失败）
    #[error("{backend} failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: LlmError,
    },

    /// 主备后端都失败，消息中同时保留两边原因
    #[error("Both backends failed. {primary_backend}: {primary}. {secondary_backend}: {secondary}")]
    BothFailed {
        primary_backend: String,
        primary: String,
        secondary_backend: String,
        secondary: String,
    },
}

/// 失败大类：决定是否切换到备用后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 请求或鉴权问题，换后端也会失败，直接上抛
    Fatal,
    /// 限流、服务端故障、网络问题等，可切换备用后端
    Transient,
}

/// 分类依据（每个分支都有名字，便于测试与日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    BadRequest,
    Unauthorized,
    Forbidden,
    Credentials,
    RateLimited,
    ServerError,
    /// 错误信息中出现 quota / overloaded / timeout / unavailable 等信号
    OverloadSignal,
    Timeout,
    Network,
    /// 无法识别的错误：按 transient 处理，尝试备用后端总比直接失败好
    Unclassified,
}

impl FailureReason {
    pub fn class(self) -> FailureClass {
        match self {
            FailureReason::BadRequest
            | FailureReason::Unauthorized
            | FailureReason::Forbidden
            | FailureReason::Credentials => FailureClass::Fatal,
            FailureReason::RateLimited
            | FailureReason::ServerError
            | FailureReason::OverloadSignal
            | FailureReason::Timeout
            | FailureReason::Network
            | FailureReason::Unclassified => FailureClass::Transient,
        }
    }
}

/// 分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub class: FailureClass,
    pub reason: FailureReason,
}

impl Classification {
    fn of(reason: FailureReason) -> Self {
        Self {
            class: reason.class(),
            reason,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class == FailureClass::Fatal
    }
}

const OVERLOAD_SIGNALS: &[&str] = &[
    "quota",
    "overloaded",
    "resource_exhausted",
    "rate limit",
    "unavailable",
    "timeout",
    "timed out",
    "try again",
];

const NETWORK_SIGNALS: &[&str] = &[
    "econnreset",
    "econnrefused",
    "etimedout",
    "enotfound",
    "eai_again",
    "socket hang up",
    "connection reset",
    "connection refused",
    "dns error",
];

/// 根据错误推断失败类别
pub fn classify(err: &LlmError) -> Classification {
    match err {
        LlmError::Credentials { .. } => Classification::of(FailureReason::Credentials),
        LlmError::Api { status, body, .. } => match *status {
            400 => Classification::of(FailureReason::BadRequest),
            401 => Classification::of(FailureReason::Unauthorized),
            403 => Classification::of(FailureReason::Forbidden),
            429 => Classification::of(FailureReason::RateLimited),
            500..=599 => Classification::of(FailureReason::ServerError),
            _ => classify_message(body),
        },
        LlmError::Timeout { .. } => Classification::of(FailureReason::Timeout),
        LlmError::Network { .. } => Classification::of(FailureReason::Network),
        LlmError::InvalidResponse { message, .. } => classify_message(message),
        LlmError::Other(message) => classify_message(message),
    }
}

fn classify_message(message: &str) -> Classification {
    let lower = message.to_lowercase();
    if NETWORK_SIGNALS.iter().any(|s| lower.contains(s)) {
        return Classification::of(FailureReason::Network);
    }
    if OVERLOAD_SIGNALS.iter().any(|s| lower.contains(s)) {
        return Classification::of(FailureReason::OverloadSignal);
    }
    Classification::of(FailureReason::Unclassified)
}
