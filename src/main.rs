//! Aide - 个人自动化助手
//!
//! 入口：初始化日志、加载配置、恢复会话记忆，然后在标准输入上运行对话循环。
//! `/reset` 清空当前会话，`/quit` 退出；退出前把待写入的会话快照落盘。

use std::path::PathBuf;

use aide::agent::{create_runtime, Credentials};
use aide::config::{load_config, AppConfig};
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    aide::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let runtime = create_runtime(&cfg, &Credentials::from_env());
    runtime.memory.rehydrate().await;

    let conversation_id = cfg.app.conversation_id.clone();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                runtime.memory.evict(&conversation_id).await;
                stdout.write_all(b"(conversation cleared)\n").await?;
                continue;
            }
            _ => {}
        }

        let reply = match runtime.orchestrator.chat(line, &conversation_id).await {
            Ok(text) => text,
            Err(e) => format!("Error: {e}"),
        };
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }

    if let Err(e) = runtime.memory.flush().await {
        tracing::warn!("Failed to flush conversation memory: {}", e);
    }
    Ok(())
}
