//! # Session Log Sink
//!
//! Append-only audit records, one per stage event, keyed
//! `"{sessionID}-{type}-{operation}"`. `done` records carry a snapshot of
//! the session, which is what `Gateway::recover` reads back after a
//! restart. Storage belongs to whatever implements [`SessionLogSink`].

use parking_lot::Mutex;
use satp_core::{SessionId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOperation {
    /// A message was sent or received and its handling began.
    Init,
    /// A ledger effect was executed.
    Exec,
    /// The stage finished and the session moved on.
    Done,
    /// The session failed or was rolled back.
    Fail,
    /// The session was removed from the store.
    Archive,
}

impl LogOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Exec => "exec",
            Self::Done => "done",
            Self::Fail => "fail",
            Self::Archive => "archive",
        }
    }
}

impl std::fmt::Display for LogOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLogRecord {
    #[serde(rename = "sessionID")]
    pub session_id: SessionId,
    /// Message type, or `session` for lifecycle events.
    #[serde(rename = "type")]
    pub kind: String,
    pub operation: LogOperation,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl SessionLogRecord {
    pub fn new(
        session_id: SessionId,
        kind: impl Into<String>,
        operation: LogOperation,
        data: serde_json::Value,
    ) -> Self {
        Self {
            session_id,
            kind: kind.into(),
            operation,
            data,
            timestamp: Timestamp::now(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.session_id, self.kind, self.operation)
    }
}

pub trait SessionLogSink: Send + Sync {
    fn append(&self, record: SessionLogRecord);
}

/// Keeps records in memory, in append order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SessionLogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SessionLogRecord> {
        self.records.lock().clone()
    }

    pub fn for_session(&self, id: &SessionId) -> Vec<SessionLogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| &r.session_id == id)
            .cloned()
            .collect()
    }

    pub fn keys(&self, id: &SessionId) -> Vec<String> {
        self.for_session(id).iter().map(SessionLogRecord::key).collect()
    }
}

impl SessionLogSink for MemorySink {
    fn append(&self, record: SessionLogRecord) {
        self.records.lock().push(record);
    }
}

/// Emits each record as a `tracing` event on the `satp::session_log` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SessionLogSink for TracingSink {
    fn append(&self, record: SessionLogRecord) {
        tracing::info!(
            target: "satp::session_log",
            key = %record.key(),
            session_id = %record.session_id,
            kind = %record.kind,
            operation = %record.operation,
            data = %record.data,
            "session log"
        );
    }
}
