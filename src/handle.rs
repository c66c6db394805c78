//! [`SkillHandle`]: a lazy, transient accessor binding one [`SkillDescriptor`]
//! to the policies, reader, and runner needed to act on it. Handles are
//! created fresh per `open()` call and are never shared across sessions.

use crate::audit::AuditSink;
use crate::descriptor::SkillDescriptor;
use crate::errors::SkillError;
use crate::policy::{ExecutionPolicy, ResourcePolicy};
use crate::reader::{self, ReadOutcome};
use crate::runner::{self, ExecutionResult, Sandbox};
use std::sync::Mutex;

/// Lazily materializes a skill's body, then delegates reference/asset reads
/// and script execution. `instructions()` memoizes on first call so the body
/// is only read (and counted against a session's budget) once.
pub struct SkillHandle<'a> {
    descriptor: SkillDescriptor,
    resource_policy: &'a ResourcePolicy,
    execution_policy: &'a ExecutionPolicy,
    sandbox: &'a dyn Sandbox,
    body: Mutex<Option<String>>,
}

impl<'a> SkillHandle<'a> {
    pub fn new(
        descriptor: SkillDescriptor,
        resource_policy: &'a ResourcePolicy,
        execution_policy: &'a ExecutionPolicy,
        sandbox: &'a dyn Sandbox,
    ) -> Self {
        Self {
            descriptor,
            resource_policy,
            execution_policy,
            sandbox,
            body: Mutex::new(None),
        }
    }

    /// The metadata bound to this handle.
    pub fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    /// Returns the `SKILL.md` body, reading and memoizing it on first call.
    /// Fails with [`SkillError::SkillParseError`] if the stored body can no
    /// longer be read, or if its hash no longer matches the descriptor's
    /// (the file changed on disk since the last scan).
    pub fn instructions(&self) -> Result<String, SkillError> {
        let mut guard = self.body.lock().expect("skill handle body mutex poisoned");
        if let Some(body) = guard.as_ref() {
            return Ok(body.clone());
        }

        let bytes = std::fs::read(self.descriptor.skill_md_path())
            .map_err(|e| SkillError::SkillParseError(format!("cannot reread SKILL.md: {e}")))?;
        let current_hash = crate::audit::hash_bytes(&bytes);
        if current_hash != self.descriptor.hash {
            return Err(SkillError::SkillParseError(
                "SKILL.md hash no longer matches descriptor; skill changed since last scan"
                    .to_string(),
            ));
        }

        let content = String::from_utf8_lossy(&bytes).into_owned();
        let parsed = crate::frontmatter::parse(&content)?;
        *guard = Some(parsed.body.clone());
        Ok(parsed.body)
    }

    /// Reads a text resource under the skill's `references/` (or any other
    /// relative path), honoring the resource policy and debiting
    /// `session_bytes_consumed`.
    pub fn read_reference(
        &self,
        rel_path: &str,
        session_bytes_consumed: u64,
        audit: &dyn AuditSink,
    ) -> Result<ReadOutcome, SkillError> {
        reader::read_text(
            self.resource_policy,
            &self.descriptor.path,
            rel_path,
            session_bytes_consumed,
            audit,
            &self.descriptor.name,
        )
    }

    /// Reads a binary asset.
    pub fn read_asset(
        &self,
        rel_path: &str,
        session_bytes_consumed: u64,
        audit: &dyn AuditSink,
    ) -> Result<ReadOutcome, SkillError> {
        reader::read_binary(
            self.resource_policy,
            &self.descriptor.path,
            rel_path,
            session_bytes_consumed,
            audit,
            &self.descriptor.name,
        )
    }

    /// Runs a script under the skill's `scripts/` directory.
    pub fn run_script(
        &self,
        rel_path: &str,
        args: &[String],
        stdin: Option<Vec<u8>>,
        timeout_s: Option<u64>,
        audit: &dyn AuditSink,
    ) -> Result<ExecutionResult, SkillError> {
        runner::run_script(
            self.sandbox,
            self.execution_policy,
            &self.descriptor,
            rel_path,
            args,
            stdin,
            timeout_s,
            audit,
        )
    }
}
