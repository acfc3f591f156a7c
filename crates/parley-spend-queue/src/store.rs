use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::queue::QueuedSpend;

/// Durable home of the queued spends, oldest first
#[async_trait]
pub trait SpendStore: Send + Sync {
    async fn load(&self) -> Result<Vec<QueuedSpend>, QueueError>;

    /// Replace the stored queue
    async fn save(&self, spends: &[QueuedSpend]) -> Result<(), QueueError>;
}

/// JSON file store; writes go to a sibling temp file and are renamed into
/// place so a crash never leaves a half-written queue
#[derive(Debug, Clone)]
pub struct FileSpendStore {
    path: PathBuf,
}

impl FileSpendStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SpendStore for FileSpendStore {
    async fn load(&self) -> Result<Vec<QueuedSpend>, QueueError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(vec![]),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, spends: &[QueuedSpend]) -> Result<(), QueueError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, serde_json::to_vec_pretty(spends)?).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

/// Volatile store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemorySpendStore {
    spends: Mutex<Vec<QueuedSpend>>,
}

impl MemorySpendStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpendStore for MemorySpendStore {
    async fn load(&self) -> Result<Vec<QueuedSpend>, QueueError> {
        Ok(self
            .spends
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    async fn save(&self, spends: &[QueuedSpend]) -> Result<(), QueueError> {
        *self.spends.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = spends.to_vec();
        Ok(())
    }
}
