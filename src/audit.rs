//! Append-only audit trail. Every externally observable operation — scans,
//! catalog listings, activations, reads, executions, policy violations, and
//! errors — emits an [`AuditEvent`] to a configured [`AuditSink`].

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

/// The kind of operation an [`AuditEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Scan,
    List,
    Open,
    Activate,
    Read,
    Execute,
    PolicyViolation,
    Error,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Scan => "scan",
            AuditKind::List => "list",
            AuditKind::Open => "open",
            AuditKind::Activate => "activate",
            AuditKind::Read => "read",
            AuditKind::Execute => "execute",
            AuditKind::PolicyViolation => "policy_violation",
            AuditKind::Error => "error",
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub ts: DateTime<Utc>,
    pub kind: AuditKind,
    pub skill: Option<String>,
    pub path: Option<String>,
    pub bytes: Option<u64>,
    pub sha256: Option<String>,
    pub detail: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind) -> Self {
        Self {
            ts: Utc::now(),
            kind,
            skill: None,
            path: None,
            bytes: None,
            sha256: None,
            detail: Map::new(),
        }
    }

    pub fn skill(mut self, name: impl Into<String>) -> Self {
        self.skill = Some(name.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn bytes(mut self, bytes: u64) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}

/// A durable or in-memory destination for audit events. Sinks own their own
/// durability and must be safe to call from multiple threads.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: AuditEvent);
}

/// Discards every event. Useful for embedding applications that don't need
/// an audit trail, and as a safe default.
#[derive(Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn append(&self, _event: AuditEvent) {}
}

/// Retains events in memory in append order. Intended for tests and for
/// short-lived embeddings; not a durable store.
#[derive(Default)]
pub struct VecAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl VecAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit sink mutex poisoned").clone()
    }
}

impl AuditSink for VecAuditSink {
    fn append(&self, event: AuditEvent) {
        self.events.lock().expect("audit sink mutex poisoned").push(event);
    }
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of the canonical JSON serialization of `value`.
pub fn hash_json(value: &Value) -> String {
    hash_bytes(value.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_preserves_append_order() {
        let sink = VecAuditSink::new();
        sink.append(AuditEvent::new(AuditKind::Scan).skill("a"));
        sink.append(AuditEvent::new(AuditKind::Scan).skill("b"));
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].skill.as_deref(), Some("a"));
        assert_eq!(events[1].skill.as_deref(), Some("b"));
    }

    #[test]
    fn hash_bytes_is_stable() {
        let h1 = hash_bytes(b"hello");
        let h2 = hash_bytes(b"hello");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn noop_sink_discards() {
        let sink = NoopAuditSink;
        sink.append(AuditEvent::new(AuditKind::Error));
    }
}
