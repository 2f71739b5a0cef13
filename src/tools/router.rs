//! 工具路由器
//!
//! 根据用户原话挑选要暴露给模型的工具子集：逐条匹配 RouteRule，取所有命中规则的分组并集；
//! 一条都没命中时使用默认分组。启发式而非分类器：多给工具无害，漏给只会降低对话质量。

use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::tools::{ToolDefinition, ToolRegistry};

/// 路由规则：模式命中即选中其分组
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub pattern: Regex,
    pub groups: Vec<String>,
}

impl RouteRule {
    /// 大小写不敏感的正则规则
    pub fn new(pattern: &str, groups: &[&str]) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            pattern,
            groups: groups.iter().map(|g| g.to_string()).collect(),
        })
    }

    pub fn matches(&self, utterance: &str) -> bool {
        self.pattern.is_match(utterance)
    }
}

/// 工具路由器
pub struct ToolRouter {
    registry: Arc<ToolRegistry>,
    rules: Vec<RouteRule>,
    default_groups: Vec<String>,
}

impl ToolRouter {
    pub fn new(registry: Arc<ToolRegistry>, rules: Vec<RouteRule>, default_groups: &[&str]) -> Self {
        Self {
            registry,
            rules,
            default_groups: default_groups.iter().map(|g| g.to_string()).collect(),
        }
    }

    /// 命中的分组名（按规则顺序，去重）；未命中时为默认分组
    pub fn select_groups(&self, utterance: &str) -> Vec<String> {
        let mut selected: Vec<String> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.matches(utterance)) {
            for group in &rule.groups {
                if !selected.contains(group) {
                    selected.push(group.clone());
                }
            }
        }
        if selected.is_empty() {
            selected = self.default_groups.clone();
        }
        selected
    }

    /// 选出的工具定义（注册表顺序）
    pub fn route(&self, utterance: &str) -> Vec<ToolDefinition> {
        let groups = self.select_groups(utterance);
        let tools = self
            .registry
            .expand_groups(groups.iter().map(String::as_str));
        tracing::debug!(groups = ?groups, tools = tools.len(), "routed utterance");
        tools
    }
}
