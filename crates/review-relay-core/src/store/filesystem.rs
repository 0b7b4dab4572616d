//! Filesystem-backed event store for durable deployments.
//!
//! Records live in one JSON snapshot file. Every mutation rewrites the
//! snapshot through a temp file followed by a rename so a crash never
//! leaves a half-written store behind. An async mutex serializes all
//! access, which also gives the per-identity commit linearizability the
//! contract requires.

use super::{Admission, EventStatus, EventStore, ProcessedEventRecord, StoreError};
use crate::event::{Event, EventIdentity};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[cfg(test)]
#[path = "filesystem_tests.rs"]
mod tests;

/// [`EventStore`] persisted as a JSON snapshot on local disk.
pub struct FilesystemEventStore {
    path: PathBuf,
    inner: Mutex<HashMap<EventIdentity, ProcessedEventRecord>>,
}

impl FilesystemEventStore {
    /// Open a store at `path`, loading any existing snapshot.
    ///
    /// The parent directory is created when missing. A missing snapshot
    /// file is an empty store, not an error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let records = match fs::read_to_string(&path).await {
            Ok(json) => {
                let list: Vec<ProcessedEventRecord> = serde_json::from_str(&json)?;
                list.into_iter().map(|r| (r.identity(), r)).collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            inner: Mutex::new(records),
        })
    }

    /// Write the snapshot atomically: temp file, flush, rename.
    async fn persist(
        &self,
        records: &HashMap<EventIdentity, ProcessedEventRecord>,
    ) -> Result<(), StoreError> {
        let mut list: Vec<&ProcessedEventRecord> = records.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let json = serde_json::to_string_pretty(&list)?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for FilesystemEventStore {
    async fn admit(&self, event: &Event) -> Result<Admission, StoreError> {
        let mut records = self.inner.lock().await;
        let identity = event.identity();

        if let Some(record) = records.get(&identity) {
            return Ok(Admission {
                first_seen: false,
                status: record.status,
            });
        }

        records.insert(identity, ProcessedEventRecord::new(event));
        self.persist(&records).await?;

        Ok(Admission {
            first_seen: true,
            status: EventStatus::Pending,
        })
    }

    async fn equivalent_success_exists(&self, event: &Event) -> Result<bool, StoreError> {
        let records = self.inner.lock().await;
        let identity = event.identity();
        let signature = event.signature();

        Ok(records.values().any(|record| {
            record.status == EventStatus::Success
                && record.signature == signature
                && record.identity() != identity
        }))
    }

    async fn commit(&self, event: &Event, status: EventStatus) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::NonTerminalCommit { status });
        }

        let mut records = self.inner.lock().await;
        let identity = event.identity();

        let Some(record) = records.get_mut(&identity) else {
            return Err(StoreError::NotAdmitted { identity });
        };

        if record.status.is_terminal() {
            return Err(StoreError::AlreadyCommitted {
                identity,
                status: record.status,
            });
        }

        record.status = status;
        record.updated_at = Utc::now();
        self.persist(&records).await?;
        Ok(())
    }
}
