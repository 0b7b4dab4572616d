//! Dedup & status store.
//!
//! Every event the pipeline sees gets a persisted record keyed by its
//! provider-scoped identity, carrying the revision content signature and
//! a processing status. The store answers three questions for the
//! orchestrator: has this exact event already been processed, has the
//! same *content* already been processed under a different identity,
//! and, via a compare-and-set commit, which concurrent delivery of an
//! identity gets to record the terminal status.

use crate::event::{Event, EventIdentity, RevisionSignature};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod memory;
pub use memory::MemoryEventStore;

mod filesystem;
pub use filesystem::FilesystemEventStore;

// ============================================================================
// Records
// ============================================================================

/// Processing status of an admitted event.
///
/// Transitions `Pending -> Success` or `Pending -> Failed`, exactly once
/// per identity. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Success,
    Failed,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record of one event identity.
///
/// Never deleted by the pipeline; only external administrative action
/// removes records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEventRecord {
    pub provider: String,
    pub internal_id: String,
    pub signature: RevisionSignature,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessedEventRecord {
    fn new(event: &Event) -> Self {
        let now = Utc::now();
        Self {
            provider: event.provider().to_string(),
            internal_id: event.internal_id().to_string(),
            signature: event.signature(),
            status: EventStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn identity(&self) -> EventIdentity {
        EventIdentity {
            provider: self.provider.clone(),
            internal_id: self.internal_id.clone(),
        }
    }
}

/// Result of admitting an event: whether this identity is new to the
/// store, and the status it had before admission (freshly created
/// records report [`EventStatus::Pending`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub first_seen: bool,
    pub status: EventStatus,
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// CAS failure: the identity already carries a terminal status.
    #[error("event {identity} already committed as {status}")]
    AlreadyCommitted {
        identity: EventIdentity,
        status: EventStatus,
    },

    /// Commit for an identity that was never admitted.
    #[error("event {identity} was not admitted before commit")]
    NotAdmitted { identity: EventIdentity },

    /// `Pending` is not a terminal status.
    #[error("cannot commit non-terminal status {status}")]
    NonTerminalCommit { status: EventStatus },

    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// Contract
// ============================================================================

/// Persisted dedup & status store contract.
///
/// Implementations must serialize writes per identity key: concurrent
/// delivery of the same identity must not produce two successful
/// `commit` calls.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Record first sight of an event, creating a `Pending` record, or
    /// report the status the identity already carries.
    async fn admit(&self, event: &Event) -> Result<Admission, StoreError>;

    /// True when a *different* identity with the same revision signature
    /// has already completed with [`EventStatus::Success`].
    async fn equivalent_success_exists(&self, event: &Event) -> Result<bool, StoreError>;

    /// Transition this identity's record from `Pending` to the given
    /// terminal status. Exactly one commit wins; later attempts fail
    /// with [`StoreError::AlreadyCommitted`].
    async fn commit(&self, event: &Event, status: EventStatus) -> Result<(), StoreError>;
}
