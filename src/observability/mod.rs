//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 info，可通过 RUST_LOG 覆盖（如 `RUST_LOG=aide=debug`）。
//! 工具审计事件（event = tool_audit）与容灾决策都走同一个 fmt 输出。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局订阅器；重复调用时忽略
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
