//! Change journal for the in-process document server.

pub mod sqlite;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    document::Fields,
    remote::memory::StateSnapshotV1,
    types::{DocId, Millis},
};

pub type ChangeSeq = u64;

/// Accepted write, recorded as the resulting document state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    Upsert {
        collection: String,
        id: DocId,
        fields: Fields,
    },
    Remove {
        collection: String,
        id: DocId,
    },
}

impl Change {
    pub fn collection(&self) -> &str {
        match self {
            Self::Upsert { collection, .. } | Self::Remove { collection, .. } => collection,
        }
    }

    pub fn doc_id(&self) -> &DocId {
        match self {
            Self::Upsert { id, .. } | Self::Remove { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChange {
    pub seq: ChangeSeq,
    pub ts_ms: Millis,
    pub change: Change,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Durable destination for accepted changes.
pub trait ChangeSink: Send {
    /// Appends changes in order; returns the highest sequence written.
    fn append_changes(&mut self, changes: &[StoredChange]) -> PersistResult<ChangeSeq>;
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
    /// Records the full state covering writes through `last_seq`.
    fn write_snapshot(&mut self, _snapshot: &StateSnapshotV1, _last_seq: ChangeSeq) -> PersistResult<()> {
        Ok(())
    }
    /// Drops journal rows already covered by a snapshot.
    fn compact_through(&mut self, _seq: ChangeSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
