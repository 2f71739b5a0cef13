//! 对话快照持久化
//!
//! 快照是单个 JSON 对象（会话 id -> ConversationEntry），整块读、整块覆盖写，没有增量接口。
//! - FileSnapshotStore：本地 JSON 文件
//! - HttpSnapshotStore：远程 blob（GET / PUT 固定 URL）
//! - MemorySnapshotStore：进程内，记录读写次数（测试与无持久化模式）

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// 快照存储：读返回 None 表示从未写过
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn read(&self) -> anyhow::Result<Option<String>>;
    async fn write(&self, blob: &str) -> anyhow::Result<()>;
}

/// 单文件 JSON 快照
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn read(&self) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 先写临时文件再 rename：读取方只会看到完整快照
    async fn write(&self, blob: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// 远程 blob 快照：GET 读取（404 视为不存在），PUT 覆盖
pub struct HttpSnapshotStore {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpSnapshotStore {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            url: url.into(),
            token,
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl SnapshotStore for HttpSnapshotStore {
    async fn read(&self) -> anyhow::Result<Option<String>> {
        let response = self.authorize(self.client.get(&self.url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.text().await?))
    }

    async fn write(&self, blob: &str) -> anyhow::Result<()> {
        self.authorize(self.client.put(&self.url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(blob.to_string())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// 进程内快照，可预置内容；读写次数可查询
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    blob: Mutex<Option<String>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail: bool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
            ..Self::default()
        }
    }

    /// 所有读写都失败（模拟存储不可用）
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn blob(&self) -> Option<String> {
        self.blob.lock().await.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self) -> anyhow::Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("snapshot store unavailable");
        }
        Ok(self.blob.lock().await.clone())
    }

    async fn write(&self, blob: &str) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("snapshot store unavailable");
        }
        *self.blob.lock().await = Some(blob.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_missing_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("memory.json"));
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state/memory.json");
        let store = FileSnapshotStore::new(&path);
        store.write(r#"{"a":1}"#).await.unwrap();
        store.write(r#"{"b":2}"#).await.unwrap();
        assert_eq!(store.read().await.unwrap().as_deref(), Some(r#"{"b":2}"#));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_memory_store_counts() {
        let store = MemorySnapshotStore::new();
        assert!(store.read().await.unwrap().is_none());
        store.write("{}").await.unwrap();
        assert_eq!(store.reads(), 1);
        assert_eq!(store.writes(), 1);
        assert_eq!(store.blob().await.as_deref(), Some("{}"));

        let failing = MemorySnapshotStore::failing();
        assert!(failing.read().await.is_err());
        assert!(failing.write("{}").await.is_err());
    }
}
