//! Error types for the skill runtime.
//!
//! `SkillError` is the internal, typed error taxonomy. It never crosses the
//! tool boundary directly — [`crate::envelope`] maps every variant into an
//! error [`crate::envelope::ToolResponse`] plus a matching audit event.

use thiserror::Error;

/// Internal skill runtime error.
#[derive(Error, Debug)]
pub enum SkillError {
    /// No skill with this name is in the catalog.
    #[error("skill not found: {0}")]
    SkillNotFound(String),

    /// SKILL.md frontmatter is missing, malformed, or missing required keys.
    #[error("skill parse error: {0}")]
    SkillParseError(String),

    /// A caller attempted something the active policy forbids.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// A resolved path escaped the skill root, or was otherwise unsafe.
    #[error("path traversal: {0}")]
    PathTraversal(String),

    /// A requested read exceeds the resource policy's size limits even after
    /// truncation.
    #[error("resource too large: {0}")]
    ResourceTooLarge(String),

    /// `ExecutionPolicy::enabled` is false.
    #[error("script execution disabled")]
    ScriptExecutionDisabled,

    /// A script's deadline expired.
    #[error("script timed out after {0}ms")]
    ScriptTimeout(u64),

    /// A script ran but exited non-zero. Only used where a caller explicitly
    /// wants the non-zero exit treated as an error rather than as a
    /// successful `execution_result` envelope.
    #[error("script failed with exit code {0}")]
    ScriptFailed(i32),

    /// A session state transition was attempted that is not a legal edge.
    #[error("illegal session transition: {0}")]
    IllegalTransition(String),

    /// Catch-all for invariant violations that indicate a bug rather than
    /// caller misuse.
    #[error("internal error: {0}")]
    Internal(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing failure (frontmatter block).
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing failure (metadata cache, envelope content).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SkillError {
    /// The stable taxonomy tag used in [`crate::envelope::ToolResponse`] meta
    /// and in audit events, per the kinds enumerated in the runtime's error
    /// taxonomy.
    pub fn kind(&self) -> &'static str {
        match self {
            SkillError::SkillNotFound(_) => "skill_not_found",
            SkillError::SkillParseError(_) => "skill_parse_error",
            SkillError::PolicyViolation(_) => "policy_violation",
            SkillError::PathTraversal(_) => "path_traversal",
            SkillError::ResourceTooLarge(_) => "resource_too_large",
            SkillError::ScriptExecutionDisabled => "script_execution_disabled",
            SkillError::ScriptTimeout(_) => "script_timeout",
            SkillError::ScriptFailed(_) => "script_failed",
            SkillError::IllegalTransition(_) => "illegal_transition",
            SkillError::Internal(_) => "internal_error",
            SkillError::Io(_) => "internal_error",
            SkillError::Yaml(_) => "skill_parse_error",
            SkillError::Json(_) => "internal_error",
        }
    }

    /// The error class name used in [`crate::envelope::ToolResponse`]
    /// `meta.error_type`, per spec §8's scenario assertions
    /// (e.g. `meta.error_type=PathTraversalError`). Distinct from [`Self::kind`],
    /// which carries the lowercase taxonomy tag into `meta.error_kind`.
    pub fn class_name(&self) -> &'static str {
        match self {
            SkillError::SkillNotFound(_) => "SkillNotFoundError",
            SkillError::SkillParseError(_) => "SkillParseError",
            SkillError::PolicyViolation(_) => "PolicyViolationError",
            SkillError::PathTraversal(_) => "PathTraversalError",
            SkillError::ResourceTooLarge(_) => "ResourceTooLargeError",
            SkillError::ScriptExecutionDisabled => "ScriptExecutionDisabledError",
            SkillError::ScriptTimeout(_) => "ScriptTimeoutError",
            SkillError::ScriptFailed(_) => "ScriptFailedError",
            SkillError::IllegalTransition(_) => "IllegalTransitionError",
            SkillError::Internal(_) => "InternalError",
            SkillError::Io(_) => "InternalError",
            SkillError::Yaml(_) => "SkillParseError",
            SkillError::Json(_) => "InternalError",
        }
    }
}
