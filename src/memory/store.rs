//! 会话记忆存储
//!
//! 进程内缓存（会话 id -> ConversationEntry）+ 防抖持久化：
//! - get：不存在或已过 TTL 返回空；过期条目在读取时删除
//! - save：剪枝到 max_history、刷新时间戳，并为该会话重置防抖计时器；
//!   安静 debounce 时长后把整个存活缓存写成一份快照
//! - rehydrate：进程生命周期内只读一次快照，丢弃过期条目后填充缓存
//!
//! 持久化失败只记日志，缓存仍是本进程内的权威数据。快照总是全量写，
//! 适合少量并发会话；会话数上到几千时需要换成按会话增量写。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::memory::{ConversationEntry, Message, SnapshotStore};

/// 默认保留消息条数
pub const MAX_HISTORY: usize = 20;
/// 默认会话过期时间
pub const HISTORY_TTL: Duration = Duration::from_secs(2 * 60 * 60);
/// 默认防抖时长
pub const PERSIST_DEBOUNCE: Duration = Duration::from_secs(3);

/// 时间源（测试中替换为 ManualClock）
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 记忆参数
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub max_history: usize,
    pub ttl: Duration,
    pub debounce: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: MAX_HISTORY,
            ttl: HISTORY_TTL,
            debounce: PERSIST_DEBOUNCE,
        }
    }
}

struct PendingWrite {
    generation: u64,
    cancel: CancellationToken,
}

struct StoreInner {
    entries: RwLock<HashMap<String, ConversationEntry>>,
    /// 每个会话至多一个待执行的写入计时器
    pending: Mutex<HashMap<String, PendingWrite>>,
    snapshot: Option<Arc<dyn SnapshotStore>>,
    clock: Arc<dyn Clock>,
    rehydrated: AtomicBool,
    generation: AtomicU64,
    max_history: usize,
    ttl: chrono::Duration,
    debounce: Duration,
}

/// 会话记忆存储（可廉价 clone，内部共享）
#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<StoreInner>,
}

impl ConversationStore {
    pub fn new(
        config: MemoryConfig,
        snapshot: Option<Arc<dyn SnapshotStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = chrono::Duration::from_std(config.ttl).unwrap_or(chrono::Duration::hours(2));
        Self {
            inner: Arc::new(StoreInner {
                entries: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                snapshot,
                clock,
                rehydrated: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                max_history: config.max_history,
                ttl,
                debounce: config.debounce,
            }),
        }
    }

    /// 纯内存存储（不持久化）
    pub fn in_memory(config: MemoryConfig) -> Self {
        Self::new(config, None, Arc::new(SystemClock))
    }

    /// 读取会话历史；过期条目被删除并返回空
    pub async fn get(&self, id: &str) -> Vec<Message> {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.write().await;
        let Some(entry) = entries.get(id) else {
            return Vec::new();
        };
        if !entry.is_expired(now, self.inner.ttl) {
            return entry.messages.clone();
        }
        entries.remove(id);
        tracing::debug!(conversation = %id, "evicted expired conversation");
        Vec::new()
    }

    /// 保存会话历史（剪枝 + 刷新时间戳）并重置该会话的防抖写入
    pub async fn save(&self, id: &str, messages: Vec<Message>) {
        let entry = ConversationEntry::new(messages, self.inner.max_history, self.inner.clock.now());
        self.inner
            .entries
            .write()
            .await
            .insert(id.to_string(), entry);
        self.schedule_write(id);
    }

    /// 删除会话；快照在防抖后同步
    pub async fn evict(&self, id: &str) -> bool {
        let removed = self.inner.entries.write().await.remove(id).is_some();
        if removed {
            self.schedule_write(id);
        }
        removed
    }

    /// 当前缓存中的会话 id（不触发过期清理）
    pub async fn conversation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn has_pending_write(&self, id: &str) -> bool {
        self.inner.lock_pending().contains_key(id)
    }

    /// 启动时加载快照；只执行一次，存储未配置或不可用时静默跳过。返回加载的会话数
    pub async fn rehydrate(&self) -> usize {
        if self.inner.rehydrated.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let Some(snapshot) = &self.inner.snapshot else {
            tracing::debug!("no snapshot store configured, skipping rehydrate");
            return 0;
        };

        let blob = match snapshot.read().await {
            Ok(Some(blob)) => blob,
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!("Failed to read conversation snapshot: {}", e);
                return 0;
            }
        };
        let stored: HashMap<String, ConversationEntry> = match serde_json::from_str(&blob) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Ignoring unreadable conversation snapshot: {}", e);
                return 0;
            }
        };

        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.write().await;
        let mut loaded = 0;
        for (id, mut entry) in stored {
            if entry.is_expired(now, self.inner.ttl) {
                continue;
            }
            super::conversation::prune(&mut entry.messages, self.inner.max_history);
            // 启动后已产生的新数据优先
            if !entries.contains_key(&id) {
                entries.insert(id, entry);
                loaded += 1;
            }
        }
        tracing::info!(conversations = loaded, "Rehydrated conversation memory");
        loaded
    }

    /// 立即写入快照并取消所有待执行的计时器（用于退出前）
    pub async fn flush(&self) -> anyhow::Result<()> {
        {
            let mut pending = self.inner.lock_pending();
            for (_, p) in pending.drain() {
                p.cancel.cancel();
            }
        }
        self.inner.write_snapshot().await
    }

    fn schedule_write(&self, id: &str) {
        if self.inner.snapshot.is_none() {
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        {
            let mut pending = self.inner.lock_pending();
            let previous = pending.insert(
                id.to_string(),
                PendingWrite {
                    generation,
                    cancel: cancel.clone(),
                },
            );
            if let Some(previous) = previous {
                previous.cancel.cancel();
            }
        }

        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(inner.debounce) => {
                    inner.clear_pending(&id, generation);
                    if let Err(e) = inner.write_snapshot().await {
                        tracing::warn!(conversation = %id, "Failed to persist conversation memory: {}", e);
                    }
                }
            }
        });
    }
}

impl StoreInner {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingWrite>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_pending(&self, id: &str, generation: u64) {
        let mut pending = self.lock_pending();
        if pending.get(id).map(|p| p.generation) == Some(generation) {
            pending.remove(id);
        }
    }

    /// 把所有未过期的会话序列化为一份快照
    async fn write_snapshot(&self) -> anyhow::Result<()> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };
        let now = self.clock.now();
        let blob = {
            let entries = self.entries.read().await;
            let alive: BTreeMap<&String, &ConversationEntry> = entries
                .iter()
                .filter(|(_, e)| !e.is_expired(now, self.ttl))
                .collect();
            serde_json::to_string(&alive)?
        };
        snapshot.write(&blob).await?;
        tracing::debug!(bytes = blob.len(), "Persisted conversation memory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySnapshotStore;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc::now()))
    }

    fn store_with(
        snapshot: Option<Arc<MemorySnapshotStore>>,
        clock: Arc<ManualClock>,
    ) -> ConversationStore {
        ConversationStore::new(
            MemoryConfig::default(),
            snapshot.map(|s| s as Arc<dyn SnapshotStore>),
            clock,
        )
    }

    fn numbered(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("m{i}"))
                } else {
                    Message::assistant(format!("m{i}"))
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_get_unknown_is_empty() {
        let store = store_with(None, clock());
        assert!(store.get("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn test_save_trims_to_last_max_history() {
        let store = store_with(None, clock());
        let msgs = numbered(27);
        store.save("c1", msgs.clone()).await;
        let got = store.get("c1").await;
        assert_eq!(got.len(), MAX_HISTORY);
        assert_eq!(got, msgs[7..].to_vec());
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted_on_read() {
        let clock = clock();
        let store = store_with(None, clock.clone());
        store.save("c1", numbered(2)).await;

        clock.advance(chrono::Duration::hours(2));
        assert_eq!(store.get("c1").await.len(), 2);

        clock.advance(chrono::Duration::milliseconds(1));
        assert!(store.conversation_ids().await.contains(&"c1".to_string()));
        assert!(store.get("c1").await.is_empty());
        assert!(store.conversation_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_saves_produce_one_write_with_last_state() {
        let snapshot = Arc::new(MemorySnapshotStore::new());
        let store = store_with(Some(snapshot.clone()), clock());

        store.save("c1", numbered(1)).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        store.save("c1", numbered(2)).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        store.save("c1", numbered(3)).await;
        assert_eq!(snapshot.writes(), 0);
        assert!(store.has_pending_write("c1"));

        tokio::time::sleep(PERSIST_DEBOUNCE + Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        assert_eq!(snapshot.writes(), 1);
        assert!(!store.has_pending_write("c1"));
        let blob = snapshot.blob().await.unwrap();
        let stored: HashMap<String, ConversationEntry> = serde_json::from_str(&blob).unwrap();
        assert_eq!(stored["c1"].messages, numbered(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_conversations_have_separate_timers() {
        let snapshot = Arc::new(MemorySnapshotStore::new());
        let store = store_with(Some(snapshot.clone()), clock());

        store.save("a", numbered(1)).await;
        store.save("b", numbered(1)).await;
        assert!(store.has_pending_write("a"));
        assert!(store.has_pending_write("b"));

        tokio::time::sleep(PERSIST_DEBOUNCE + Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert_eq!(snapshot.writes(), 2);

        let blob = snapshot.blob().await.unwrap();
        let stored: HashMap<String, ConversationEntry> = serde_json::from_str(&blob).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_keeps_cache_authoritative() {
        let snapshot = Arc::new(MemorySnapshotStore::failing());
        let store = store_with(Some(snapshot.clone()), clock());

        store.save("c1", numbered(4)).await;
        tokio::time::sleep(PERSIST_DEBOUNCE + Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        assert_eq!(snapshot.writes(), 1);
        assert_eq!(store.get("c1").await.len(), 4);
    }

    #[tokio::test]
    async fn test_rehydrate_reads_once() {
        let snapshot = Arc::new(MemorySnapshotStore::new());
        let store = store_with(Some(snapshot.clone()), clock());
        store.rehydrate().await;
        store.rehydrate().await;
        assert_eq!(snapshot.reads(), 1);
    }

    #[tokio::test]
    async fn test_rehydrate_drops_expired_entries() {
        let clock = clock();
        let now = clock.now();
        let mut stored = HashMap::new();
        stored.insert(
            "fresh".to_string(),
            ConversationEntry::new(numbered(2), MAX_HISTORY, now - chrono::Duration::minutes(5)),
        );
        stored.insert(
            "stale".to_string(),
            ConversationEntry::new(numbered(2), MAX_HISTORY, now - chrono::Duration::hours(3)),
        );
        let snapshot = Arc::new(MemorySnapshotStore::with_blob(
            serde_json::to_string(&stored).unwrap(),
        ));
        let store = store_with(Some(snapshot), clock);

        assert_eq!(store.rehydrate().await, 1);
        assert_eq!(store.conversation_ids().await, vec!["fresh".to_string()]);
        assert_eq!(store.get("fresh").await, numbered(2));
    }

    #[tokio::test]
    async fn test_rehydrate_without_store_or_with_broken_store_is_noop() {
        let store = store_with(None, clock());
        assert_eq!(store.rehydrate().await, 0);

        let failing = Arc::new(MemorySnapshotStore::failing());
        let store = store_with(Some(failing.clone()), clock());
        assert_eq!(store.rehydrate().await, 0);
        assert_eq!(failing.reads(), 1);

        let garbage = Arc::new(MemorySnapshotStore::with_blob("not json"));
        let store = store_with(Some(garbage), clock());
        assert_eq!(store.rehydrate().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_immediately_and_cancels_timers() {
        let snapshot = Arc::new(MemorySnapshotStore::new());
        let store = store_with(Some(snapshot.clone()), clock());

        store.save("c1", numbered(2)).await;
        store.flush().await.unwrap();
        assert_eq!(snapshot.writes(), 1);
        assert!(!store.has_pending_write("c1"));

        tokio::time::sleep(PERSIST_DEBOUNCE * 2).await;
        tokio::task::yield_now().await;
        assert_eq!(snapshot.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_removes_and_persists() {
        let snapshot = Arc::new(MemorySnapshotStore::new());
        let store = store_with(Some(snapshot.clone()), clock());

        store.save("c1", numbered(2)).await;
        assert!(store.evict("c1").await);
        assert!(!store.evict("c1").await);
        assert!(store.get("c1").await.is_empty());

        tokio::time::sleep(PERSIST_DEBOUNCE + Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert_eq!(snapshot.writes(), 1);
        assert_eq!(snapshot.blob().await.as_deref(), Some("{}"));
    }
}
