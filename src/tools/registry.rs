//! 工具注册表
//!
//! 按注册顺序保存 ToolDefinition，并维护能力分组（calendar / email / tasks ...）。
//! 分组可以重叠：同一工具可属于多个分组。注册表在进程启动时构建，之后只读。

use std::collections::{HashMap, HashSet};

use crate::tools::ToolDefinition;

/// 能力分组：有序的工具名集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolGroup {
    pub name: String,
    pub tools: Vec<String>,
}

impl ToolGroup {
    pub fn new(name: impl Into<String>, tools: &[&str]) -> Self {
        Self {
            name: name.into(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// 工具注册表：定义按注册顺序存放，name -> 下标用于查找
#[derive(Debug, Default)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
    groups: Vec<ToolGroup>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具覆盖旧定义但保留原位置
    pub fn register(&mut self, definition: ToolDefinition) {
        match self.index.get(&definition.name) {
            Some(&i) => self.definitions[i] = definition,
            None => {
                self.index
                    .insert(definition.name.clone(), self.definitions.len());
                self.definitions.push(definition);
            }
        }
    }

    /// 注册分组；引用了未注册工具时记录警告（该名字在展开时被忽略）
    pub fn add_group(&mut self, group: ToolGroup) {
        for tool in &group.tools {
            if !self.index.contains_key(tool) {
                tracing::warn!(group = %group.name, tool = %tool, "group references unknown tool");
            }
        }
        self.groups.push(group);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.definitions[i])
    }

    /// 全部工具（注册顺序）
    pub fn all(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn groups(&self) -> &[ToolGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&ToolGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// 将分组展开为工具定义：去重，按注册顺序返回
    pub fn expand_groups<'a, I>(&self, group_names: I) -> Vec<ToolDefinition>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut wanted: HashSet<&str> = HashSet::new();
        for name in group_names {
            match self.group(name) {
                Some(group) => wanted.extend(group.tools.iter().map(String::as_str)),
                None => tracing::warn!(group = %name, "unknown tool group"),
            }
        }
        self.definitions
            .iter()
            .filter(|d| wanted.contains(d.name.as_str()))
            .cloned()
            .collect()
    }
}
