//! 双后端容灾编排器：对外唯一入口 `chat(message, conversation_id)`
//!
//! 1. 未配置主后端：直接用备用后端 + 全量工具
//! 2. 否则主后端 + 路由后的工具子集；成功即返回
//! 3. 主后端失败时分类：fatal 直接上抛（配置或鉴权问题，换后端也会失败）；
//!    transient 则整轮在备用后端上重跑，使用全量工具
//! 4. 备用后端也失败：合并两边错误信息上抛

use std::sync::Arc;

use crate::core::{classify, AgentError};
use crate::react::ChatAdapter;
use crate::tools::{ToolRegistry, ToolRouter};

pub struct FallbackOrchestrator {
    primary: Option<Arc<dyn ChatAdapter>>,
    secondary: Arc<dyn ChatAdapter>,
    router: ToolRouter,
    registry: Arc<ToolRegistry>,
}

impl FallbackOrchestrator {
    pub fn new(
        primary: Option<Arc<dyn ChatAdapter>>,
        secondary: Arc<dyn ChatAdapter>,
        router: ToolRouter,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            primary,
            secondary,
            router,
            registry,
        }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub async fn chat(&self, message: &str, conversation_id: &str) -> Result<String, AgentError> {
        let all_tools = self.registry.all();

        let Some(primary) = &self.primary else {
            return self
                .secondary
                .run_turn(conversation_id, message, all_tools)
                .await
                .map_err(|source| AgentError::Backend {
                    backend: self.secondary.name().to_string(),
                    source,
                });
        };

        let routed = self.router.route(message);
        let primary_err = match primary.run_turn(conversation_id, message, &routed).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        let classification = classify(&primary_err);
        if classification.is_fatal() {
            tracing::error!(
                backend = primary.name(),
                reason = ?classification.reason,
                "primary backend failed with a fatal error: {}",
                primary_err
            );
            return Err(AgentError::Backend {
                backend: primary.name().to_string(),
                source: primary_err,
            });
        }

        tracing::warn!(
            backend = primary.name(),
            class = ?classification.class,
            reason = ?classification.reason,
            fallback = self.secondary.name(),
            "primary backend failed, falling back: {}",
            primary_err
        );

        self.secondary
            .run_turn(conversation_id, message, all_tools)
            .await
            .map_err(|secondary_err| AgentError::BothFailed {
                primary_backend: primary.name().to_string(),
                primary: primary_err.to_string(),
                secondary_backend: self.secondary.name().to_string(),
                secondary: secondary_err.to_string(),
            })
    }
}
