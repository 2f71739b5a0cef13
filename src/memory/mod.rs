//! 记忆层：会话消息、快照持久化、带 TTL 与防抖写入的会话存储

pub mod conversation;
pub mod persistence;
pub mod store;

pub use conversation::{ConversationEntry, Message, Role};
pub use persistence::{FileSnapshotStore, HttpSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use store::{
    Clock, ConversationStore, ManualClock, MemoryConfig, SystemClock, HISTORY_TTL, MAX_HISTORY,
    PERSIST_DEBOUNCE,
};
