//! Activity log entries for registry writes.
//!
//! Records carry the election and a correlation id, never the identifier itself.
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ElectionId;

///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    VoterRegistered,
    VoterRemoved,
    RootPublished,
}

impl AuditAction {
    ///
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::VoterRegistered => "voter_registered",
            AuditAction::VoterRemoved => "voter_removed",
            AuditAction::RootPublished => "root_published",
        }
    }
}

///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub election_id: ElectionId,
    pub correlation_id: Uuid,
    pub action: AuditAction,
    pub tx_hash: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// A record with a fresh correlation id, stamped now.
    pub fn new(election_id: ElectionId, action: AuditAction, tx_hash: Option<String>) -> Self {
        AuditRecord {
            election_id,
            correlation_id: Uuid::new_v4(),
            action,
            tx_hash,
            recorded_at: Utc::now(),
        }
    }
}

/// Consumer of audit records. Recording must not fail the operation that produced them.
pub trait AuditSink: Send + Sync {
    ///
    fn record(&self, record: AuditRecord);
}

/// Emits records as `tracing` events under the `voter_registry::audit` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "voter_registry::audit",
            election_id = record.election_id,
            correlation_id = %record.correlation_id,
            action = record.action.as_str(),
            tx_hash = record.tx_hash.as_deref().unwrap_or(""),
            recorded_at = %record.recorded_at.to_rfc3339(),
            "audit"
        );
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    ///
    pub fn new() -> Self {
        Self::default()
    }

    /// Records so far, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_unique() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditRecord::new(1, AuditAction::VoterRegistered, Some("0x01".into())));
        sink.record(AuditRecord::new(1, AuditAction::VoterRegistered, Some("0x01".into())));
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].correlation_id, records[1].correlation_id);
    }

    #[test]
    fn serialized_record_has_no_identifier_field() {
        let record = AuditRecord::new(4, AuditAction::RootPublished, None);
        let json = serde_json::to_value(&record).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["action", "correlationId", "electionId", "recordedAt", "txHash"]
        );
        assert_eq!(json["action"], "root_published");
        TracingAuditSink.record(record);
    }
}
