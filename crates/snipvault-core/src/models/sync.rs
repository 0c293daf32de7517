//! Sync bookkeeping models: the server-side device session and the local outbox.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{EntityKind, Record};
use crate::error::{Error, Result};

/// Per (user, device) progress row kept by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    pub id: String,
    pub user_id: String,
    pub device_id: String,
    /// Last version this device pushed or acknowledged
    pub sync_version: i64,
    /// Unix ms
    pub last_sync_at: i64,
}

/// Kind of queued mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOperation {
    Upsert,
    Delete,
}

impl QueueOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for QueueOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown queue operation `{other}`"))),
        }
    }
}

/// One durable outbox entry awaiting push.
///
/// `record` is the full row as of the mutation; for deletes it is the
/// tombstone (`isDeleted = true`) so the server can soft-delete its copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Outbox sequence number, increasing in enqueue order
    pub id: i64,
    pub operation: QueueOperation,
    pub record: Record,
    /// Unix ms when the mutation was queued
    pub timestamp: i64,
    /// Failed push attempts so far
    pub retries: u32,
}

impl SyncQueueItem {
    pub const fn kind(&self) -> EntityKind {
        self.record.kind()
    }

    /// The row to send over the wire
    pub fn outgoing(&self) -> Record {
        let mut record = self.record.clone();
        if self.operation == QueueOperation::Delete && !record.is_deleted() {
            let updated_at = record.updated_at();
            record.mark_deleted(updated_at);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Project, Snippet};

    #[test]
    fn delete_items_go_out_as_tombstones() {
        let snippet = Snippet::new(Project::new("p").id, "let a = 1;", "rust");
        let updated_at = snippet.updated_at;
        let item = SyncQueueItem {
            id: 1,
            operation: QueueOperation::Delete,
            record: snippet.into(),
            timestamp: 0,
            retries: 0,
        };

        let outgoing = item.outgoing();
        assert!(outgoing.is_deleted());
        assert_eq!(outgoing.updated_at(), updated_at);
        assert_eq!(item.kind(), EntityKind::Snippet);
    }
}
