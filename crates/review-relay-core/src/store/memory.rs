//! In-memory event store for testing and single-run deployments.

use super::{Admission, EventStatus, EventStore, ProcessedEventRecord, StoreError};
use crate::event::{Event, EventIdentity};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Record map plus a content-signature index, guarded by one mutex so
/// admissions and commits are linearizable across identities.
#[derive(Default)]
struct StoreInner {
    records: HashMap<EventIdentity, ProcessedEventRecord>,
    by_signature: HashMap<String, HashSet<EventIdentity>>,
}

/// [`EventStore`] backed by process memory.
///
/// State does not survive a restart; deployments that need the durable
/// contract use [`super::FilesystemEventStore`].
#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<StoreInner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held. Test observability only.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current status of an identity, if recorded.
    pub fn status_of(&self, identity: &EventIdentity) -> Option<EventStatus> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .records
            .get(identity)
            .map(|r| r.status)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn admit(&self, event: &Event) -> Result<Admission, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let identity = event.identity();

        if let Some(record) = inner.records.get(&identity) {
            return Ok(Admission {
                first_seen: false,
                status: record.status,
            });
        }

        let record = ProcessedEventRecord::new(event);
        inner
            .by_signature
            .entry(record.signature.as_str().to_string())
            .or_default()
            .insert(identity.clone());
        inner.records.insert(identity, record);

        Ok(Admission {
            first_seen: true,
            status: EventStatus::Pending,
        })
    }

    async fn equivalent_success_exists(&self, event: &Event) -> Result<bool, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let identity = event.identity();
        let signature = event.signature();

        let Some(identities) = inner.by_signature.get(signature.as_str()) else {
            return Ok(false);
        };

        Ok(identities
            .iter()
            .filter(|other| **other != identity)
            .filter_map(|other| inner.records.get(other))
            .any(|record| record.status == EventStatus::Success))
    }

    async fn commit(&self, event: &Event, status: EventStatus) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::NonTerminalCommit { status });
        }

        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let identity = event.identity();

        let Some(record) = inner.records.get_mut(&identity) else {
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
        Ok(())
    }
}
