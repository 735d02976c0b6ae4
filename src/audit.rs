use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// One immutable record of a safety-relevant event.
///
/// The optional payload is the keyed-transform output of a descriptive
/// string, rendered as hex; the trail itself never carries descriptive text
/// in the clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic sequence index, assigned at append time.
    pub seq: u64,
    pub at: DateTime<Utc>,
    /// Engagement session that produced the entry, if any.
    pub session: Option<Uuid>,
    /// Free-text category tag, e.g. `EMERGENCY OVERRIDE ACTIVATED`.
    pub category: String,
    /// Hex-rendered encoded payload.
    pub payload: Option<String>,
}

/// Append-only, thread-safe event log.
///
/// Appends are linearized: the total order observed by every reader matches
/// append order, and `seq` is assigned under the same lock that extends the
/// sequence. Entries are never removed, edited, or reordered.
pub struct AuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append an entry outside any engagement session. Returns the assigned
    /// sequence index.
    pub fn append(&self, category: &str, payload: Option<Vec<u8>>) -> u64 {
        self.append_for_session(None, category, payload)
    }

    /// Append an entry attributed to an engagement session. Safe to call
    /// concurrently from the controller and the monitor worker.
    pub fn append_for_session(
        &self,
        session: Option<Uuid>,
        category: &str,
        payload: Option<Vec<u8>>,
    ) -> u64 {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let seq = entries.len() as u64;
        entries.push(AuditEntry {
            seq,
            at: Utc::now(),
            session,
            category: category.to_string(),
            payload: payload.map(hex::encode),
        });
        seq
    }

    /// Consistent point-in-time copy of the full sequence. Never returns a
    /// partially-written entry.
    pub fn snapshot(&self) -> Vec<AuditEntry> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.clone()
    }

    pub fn len(&self) -> usize {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the current snapshot for external log-shipping
    /// collaborators.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}
