//! Append-only JSON-lines file shared by the completion and dead-letter logs.
//!
//! Every record is one line terminated by `\n`. On open, a final line without its
//! terminator (a crash mid-append) is truncated away so the next append starts on a fresh
//! line. An append that fails partway is rolled back to the previous length.

use imagepipe_core::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

pub(crate) struct JsonlFile {
    path: PathBuf,
    file: File,
    /// Length of the file up to and including the last complete line
    len: u64,
}

impl JsonlFile {
    /// Open (or create) the file at `path` and decode its complete lines.
    ///
    /// Lines that fail to decode are skipped with a warning.
    pub(crate) async fn open<T: DeserializeOwned>(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<T>), AppError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let complete = contents
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |pos| pos + 1);

        let mut records = Vec::new();
        for (line_no, line) in contents[..complete].split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<T>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %e,
                        "Skipping unreadable log line"
                    );
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if complete < contents.len() {
            tracing::warn!(
                path = %path.display(),
                torn_bytes = contents.len() - complete,
                "Truncating torn final line"
            );
            file.set_len(complete as u64).await?;
            file.sync_data().await?;
        }

        Ok((
            Self {
                path,
                file,
                len: complete as u64,
            },
            records,
        ))
    }

    /// Append one record as a line and sync it to disk
    pub(crate) async fn append<T: Serialize>(&mut self, record: &T) -> Result<(), AppError> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| AppError::Internal(format!("Failed to serialize log record: {}", e)))?;
        line.push(b'\n');

        if let Err(e) = self.write_line(&line).await {
            if let Err(rollback) = self.file.set_len(self.len).await {
                tracing::error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "Failed to roll back partial append"
                );
            }
            return Err(e.into());
        }

        self.len += line.len() as u64;
        Ok(())
    }

    async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line).await?;
        self.file.sync_data().await
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
