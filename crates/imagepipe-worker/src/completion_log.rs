//! Durable completion log
//!
//! One JSON line per upload. The log is loaded into an in-memory index on open so
//! duplicate deliveries of the same result are detected without rereading the file.

use async_trait::async_trait;
use imagepipe_core::models::CompletionRecord;
use imagepipe_core::AppError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::jsonl::JsonlFile;

#[async_trait]
pub trait CompletionLog: Send + Sync {
    /// Append `record` unless one already exists for its upload id.
    ///
    /// Returns `true` if the record was appended, `false` for a duplicate.
    async fn append_if_absent(&self, record: CompletionRecord) -> Result<bool, AppError>;

    async fn get(&self, upload_id: Uuid) -> Result<Option<CompletionRecord>, AppError>;

    async fn len(&self) -> usize;
}

struct LogState {
    file: JsonlFile,
    index: HashMap<Uuid, CompletionRecord>,
}

/// Append-only JSON-lines completion log
pub struct JsonlCompletionLog {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl JsonlCompletionLog {
    /// Open (or create) the log at `path` and index its existing records
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let (file, records) = JsonlFile::open::<CompletionRecord>(path).await?;
        let path = file.path().to_path_buf();

        let mut index = HashMap::with_capacity(records.len());
        for record in records {
            index.entry(record.upload_id).or_insert(record);
        }

        tracing::info!(
            path = %path.display(),
            records = index.len(),
            "Completion log opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(LogState { file, index }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CompletionLog for JsonlCompletionLog {
    async fn append_if_absent(&self, record: CompletionRecord) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        if state.index.contains_key(&record.upload_id) {
            return Ok(false);
        }

        state.file.append(&record).await?;
        state.index.insert(record.upload_id, record);
        Ok(true)
    }

    async fn get(&self, upload_id: Uuid) -> Result<Option<CompletionRecord>, AppError> {
        Ok(self.state.lock().await.index.get(&upload_id).cloned())
    }

    async fn len(&self) -> usize {
        self.state.lock().await.index.len()
    }
}
