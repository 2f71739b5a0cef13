//! 短期记忆：对话消息与会话条目
//!
//! 每个会话保留最近 max_history 条消息（user/assistant），超出时丢弃最旧的；
//! last_active 用于 TTL 判断。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 会话条目（快照中的一项）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub messages: Vec<Message>,
    pub last_active: DateTime<Utc>,
}

impl ConversationEntry {
    /// 创建条目并剪枝到最近 max_history 条
    pub fn new(mut messages: Vec<Message>, max_history: usize, now: DateTime<Utc>) -> Self {
        prune(&mut messages, max_history);
        Self {
            messages,
            last_active: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.last_active > ttl
    }
}

/// 超出 max_history 时丢弃最旧的消息
pub fn prune(messages: &mut Vec<Message>, max_history: usize) {
    if messages.len() > max_history {
        let excess = messages.len() - max_history;
        messages.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_latest() {
        let mut msgs: Vec<Message> = (0..25).map(|i| Message::user(i.to_string())).collect();
        prune(&mut msgs, 20);
        assert_eq!(msgs.len(), 20);
        assert_eq!(msgs[0].content, "5");
        assert_eq!(msgs[19].content, "24");
    }

    #[test]
    fn test_entry_serializes_with_camel_case() {
        let now = Utc::now();
        let entry = ConversationEntry::new(vec![Message::assistant("hi")], 20, now);
        let v = serde_json::to_value(&entry).unwrap();
        assert!(v.get("lastActive").is_some());
        assert_eq!(v["messages"][0]["role"], "assistant");
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let ttl = chrono::Duration::hours(2);
        let entry = ConversationEntry::new(vec![], 20, now - ttl);
        assert!(!entry.is_expired(now, ttl));
        assert!(entry.is_expired(now + chrono::Duration::milliseconds(1), ttl));
    }
}
