//! [`SkillSession`]: a stateful container tracking one agent-skill
//! interaction — its state-machine position, byte budget, artifacts, and
//! audit trail. [`SessionManager`] allocates and owns sessions for their
//! lifetime; [`crate::handle::SkillHandle`]s never hold a session directly,
//! only a session id the manager resolves at call time.

use crate::errors::SkillError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A session's position in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Discovered,
    Selected,
    InstructionsLoaded,
    ResourceNeeded,
    ScriptNeeded,
    Verifying,
    Done,
    Failed,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        if next == Failed {
            return true; // any state may transition to Failed
        }
        matches!(
            (self, next),
            (Discovered, Selected)
                | (Selected, InstructionsLoaded)
                | (InstructionsLoaded, ResourceNeeded)
                | (InstructionsLoaded, ScriptNeeded)
                | (ResourceNeeded, ScriptNeeded)
                | (ScriptNeeded, ResourceNeeded)
                | (ResourceNeeded, Verifying)
                | (ScriptNeeded, Verifying)
                | (Verifying, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

/// One agent-skill interaction.
pub struct SkillSession {
    pub session_id: String,
    pub skill_name: Option<String>,
    state: SessionState,
    artifacts: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    bytes_consumed: u64,
    closed: bool,
}

impl SkillSession {
    fn new(skill_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            skill_name,
            state: SessionState::Discovered,
            artifacts: HashMap::new(),
            created_at: now,
            updated_at: now,
            bytes_consumed: 0,
            closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Attempts the transition `self.state -> next`. Rejects illegal edges
    /// with [`SkillError::IllegalTransition`] and never advances silently.
    pub fn transition(&mut self, next: SessionState) -> Result<(), SkillError> {
        if !self.state.can_transition_to(next) {
            return Err(SkillError::IllegalTransition(format!(
                "{:?} -> {:?} is not a permitted edge",
                self.state, next
            )));
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Stores an opaque artifact under a caller-chosen key. Keys must be
    /// unique per session; re-using a key overwrites the prior value, which
    /// is the caller's responsibility to avoid if unintended.
    pub fn put_artifact(&mut self, key: impl Into<String>, value: Value) -> Result<(), SkillError> {
        self.artifacts.insert(key.into(), value);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn get_artifact(&self, key: &str) -> Option<&Value> {
        self.artifacts.get(key)
    }

    /// Debits `bytes` from this session's running budget. Called only on
    /// successful reads — failed reads never reach this point.
    fn debit(&mut self, bytes: u64) {
        self.bytes_consumed += bytes;
        self.updated_at = Utc::now();
    }
}

/// Allocates, tracks, and closes [`SkillSession`]s. All handle operations
/// that need byte-budget accounting are routed through the manager by
/// session id so counters aggregate correctly even if a handle is recreated.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Mutex<SkillSession>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Allocates a new session, optionally pre-bound to a skill name, and
    /// returns its id.
    pub fn create(&self, skill_name: Option<String>) -> String {
        let session = SkillSession::new(skill_name);
        let id = session.session_id.clone();
        self.sessions
            .write()
            .expect("session table lock poisoned")
            .insert(id.clone(), Mutex::new(session));
        id
    }

    /// Runs `f` against the session named by `session_id`, returning
    /// [`SkillError::SkillNotFound`] if it doesn't exist (reusing this kind
    /// rather than introducing a `session_not_found` kind, since a missing
    /// session and a missing skill are both "no such resource" from the
    /// caller's point of view at the tool boundary) or
    /// [`SkillError::IllegalTransition`] if it has been closed. The closed
    /// check lives here, once, rather than duplicated in every mutating
    /// method on [`SkillSession`].
    pub fn with_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SkillSession) -> Result<T, SkillError>,
    ) -> Result<T, SkillError> {
        let table = self.sessions.read().expect("session table lock poisoned");
        let session_lock = table
            .get(session_id)
            .ok_or_else(|| SkillError::SkillNotFound(format!("no such session: {session_id}")))?;
        let mut session = session_lock.lock().expect("session mutex poisoned");
        if session.closed {
            return Err(SkillError::IllegalTransition(
                "session is closed".to_string(),
            ));
        }
        f(&mut session)
    }

    /// Debits `bytes` read bytes from the named session's running budget.
    pub fn debit(&self, session_id: &str, bytes: u64) -> Result<(), SkillError> {
        self.with_session(session_id, |s| {
            s.debit(bytes);
            Ok(())
        })
    }

    /// Current remaining bytes before `bytes_consumed` is charged, as seen
    /// by the reader before it performs a read.
    pub fn bytes_consumed(&self, session_id: &str) -> Result<u64, SkillError> {
        self.with_session(session_id, |s| Ok(s.bytes_consumed()))
    }

    /// Marks a session closed. Further operations against it fail.
    pub fn close(&self, session_id: &str) -> Result<(), SkillError> {
        self.with_session(session_id, |s| {
            s.closed = true;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_edges_succeed_in_order() {
        let mut s = SkillSession::new(Some("demo".to_string()));
        assert_eq!(s.state(), SessionState::Discovered);
        s.transition(SessionState::Selected).unwrap();
        s.transition(SessionState::InstructionsLoaded).unwrap();
        s.transition(SessionState::ResourceNeeded).unwrap();
        s.transition(SessionState::ScriptNeeded).unwrap();
        s.transition(SessionState::Verifying).unwrap();
        s.transition(SessionState::Done).unwrap();
        assert!(s.state().is_terminal());
    }

    #[test]
    fn illegal_edge_is_rejected() {
        let mut s = SkillSession::new(None);
        let result = s.transition(SessionState::Done);
        assert!(matches!(result, Err(SkillError::IllegalTransition(_))));
        assert_eq!(s.state(), SessionState::Discovered);
    }

    #[test]
    fn any_state_can_fail() {
        let mut s = SkillSession::new(None);
        s.transition(SessionState::Selected).unwrap();
        s.transition(SessionState::Failed).unwrap();
        assert!(s.state().is_terminal());
    }

    #[test]
    fn closed_session_rejects_further_ops() {
        let manager = SessionManager::new();
        let id = manager.create(None);
        manager.close(&id).unwrap();
        let result = manager.with_session(&id, |s| s.transition(SessionState::Selected));
        assert!(matches!(result, Err(SkillError::IllegalTransition(_))));
    }

    #[test]
    fn byte_budget_aggregates_across_reads() {
        let manager = SessionManager::new();
        let id = manager.create(None);
        manager.debit(&id, 60).unwrap();
        manager.debit(&id, 30).unwrap();
        assert_eq!(manager.bytes_consumed(&id).unwrap(), 90);
    }

    #[test]
    fn artifact_keys_store_and_retrieve() {
        let mut s = SkillSession::new(None);
        s.put_artifact("result", serde_json::json!({"ok": true})).unwrap();
        assert_eq!(s.get_artifact("result").unwrap()["ok"], true);
    }
}
