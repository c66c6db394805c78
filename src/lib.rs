//! A sandboxed runtime for discovering, inspecting, and executing curated
//! agent skills — directories bundling instructions, reference docs, assets,
//! and scripts behind a uniform tool envelope.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ scanner + descriptor   — one-level root scan, content-hash cache │
//! │ frontmatter + resolver — SKILL.md parsing, traversal-safe paths  │
//! │ reader + policy        — budgeted text/binary reads              │
//! │ runner                 — sandboxed script execution               │
//! │ handle + repository    — progressive disclosure, catalog         │
//! │ session                — per-interaction state machine + budget  │
//! │ envelope + audit       — uniform tool responses, audit trail     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`SkillRuntime`] wires these together behind the five `skills.*`
//! operations: `list`, `activate`, `read`, `run`, `search`.

pub mod audit;
pub mod descriptor;
pub mod envelope;
pub mod errors;
pub mod frontmatter;
pub mod handle;
pub mod policy;
pub mod reader;
pub mod repository;
pub mod resolver;
pub mod runner;
pub mod scanner;
pub mod session;

pub use descriptor::SkillDescriptor;
pub use envelope::ToolResponse;
pub use errors::SkillError;
pub use policy::{ExecutionPolicy, ResourcePolicy, WorkdirMode};
pub use repository::{PromptFormat, Repository, RepositoryConfig};
pub use session::{SessionManager, SessionState, SkillSession};

use audit::AuditSink;
use session::SessionManager as SessionMgr;

/// Facade binding a [`Repository`] and a [`SessionManager`] behind the
/// `skills.*` tool surface. Every method returns a [`ToolResponse`] — no
/// [`SkillError`] ever crosses this boundary.
pub struct SkillRuntime {
    repository: Repository,
    sessions: SessionMgr,
}

impl SkillRuntime {
    pub fn new(config: RepositoryConfig) -> Self {
        let runtime = Self {
            repository: Repository::new(config),
            sessions: SessionMgr::new(),
        };
        runtime.repository.refresh();
        runtime
    }

    /// Rescans configured roots, replacing the catalog.
    pub fn refresh(&self) {
        self.repository.refresh();
    }

    /// `skills.list()` — the current catalog as a `metadata` envelope.
    pub fn list(&self) -> ToolResponse {
        envelope::safe_call(None, self.audit(), || {
            let json = self.repository.to_prompt(PromptFormat::Json);
            let value: serde_json::Value = serde_json::from_str(&json)?;
            Ok(envelope::metadata(value))
        })
    }

    /// `skills.activate(name)` — allocates a session bound to `name` and
    /// returns its `SKILL.md` body as an `instructions` envelope.
    pub fn activate(&self, name: &str) -> (String, ToolResponse) {
        let session_id = self.sessions.create(Some(name.to_string()));
        let resp = envelope::safe_call(Some(name), self.audit(), || {
            self.sessions.with_session(&session_id, |s| {
                s.transition(SessionState::Selected)
            })?;
            let handle = self.repository.open(name)?;
            let body = handle.instructions()?;
            self.sessions.with_session(&session_id, |s| {
                s.transition(SessionState::InstructionsLoaded)
            })?;
            self.audit().append(
                audit::AuditEvent::new(audit::AuditKind::Activate).skill(name),
            );
            Ok(envelope::instructions(name, &body))
        });
        (session_id, resp)
    }

    /// `skills.read(name, path)` — reads a reference or asset by extension,
    /// routed through `session_id` so the byte budget aggregates correctly.
    pub fn read(&self, session_id: &str, name: &str, rel_path: &str) -> ToolResponse {
        envelope::safe_call(Some(name), self.audit(), || {
            let handle = self.repository.open(name)?;
            let consumed = self.sessions.bytes_consumed(session_id)?;
            let ext_is_text = self
                .repository_resource_policy()
                .allow_extensions_text
                .contains(&extension_of(rel_path));

            if ext_is_text {
                let outcome = handle.read_reference(rel_path, consumed, self.audit())?;
                self.sessions.debit(session_id, outcome.bytes)?;
                let text = String::from_utf8_lossy(&outcome.content).into_owned();
                Ok(envelope::reference(name, rel_path, &text, outcome.truncated))
            } else {
                let outcome = handle.read_asset(rel_path, consumed, self.audit())?;
                self.sessions.debit(session_id, outcome.bytes)?;
                Ok(envelope::asset(name, rel_path, &outcome.content))
            }
        })
    }

    /// `skills.run(name, script, args, stdin, timeout_s)`.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        name: &str,
        script: &str,
        args: &[String],
        stdin: Option<Vec<u8>>,
        timeout_s: Option<u64>,
    ) -> ToolResponse {
        envelope::safe_call(Some(name), self.audit(), || {
            let handle = self.repository.open(name)?;
            let result = handle.run_script(script, args, stdin, timeout_s, self.audit())?;
            Ok(envelope::execution_result(name, script, result))
        })
    }

    /// `skills.search(name?, query)` — a simple substring match over the
    /// catalog's name/description, scoped to `name` when given.
    pub fn search(&self, name: Option<&str>, query: &str) -> ToolResponse {
        envelope::safe_call(name, self.audit(), || {
            let catalog = self.repository.list();
            let needle = query.to_lowercase();
            let matches: Vec<serde_json::Value> = catalog
                .iter()
                .filter(|d| name.map(|n| d.name == n).unwrap_or(true))
                .filter(|d| {
                    d.name.to_lowercase().contains(&needle)
                        || d.description.to_lowercase().contains(&needle)
                })
                .map(|d| serde_json::json!({"name": d.name, "description": d.description}))
                .collect();
            Ok(envelope::search_results(serde_json::Value::Array(matches)))
        })
    }

    /// Closes a session; further operations against it fail.
    pub fn close_session(&self, session_id: &str) -> Result<(), SkillError> {
        self.sessions.close(session_id)
    }

    fn audit(&self) -> &dyn AuditSink {
        self.repository.audit_sink()
    }

    fn repository_resource_policy(&self) -> &ResourcePolicy {
        self.repository.resource_policy()
    }
}

fn extension_of(rel_path: &str) -> String {
    std::path::Path::new(rel_path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}
