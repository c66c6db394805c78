//! Uniform tool-call envelope. Every `skills.*` operation returns a
//! [`ToolResponse`]; no typed [`SkillError`] crosses this boundary — it is
//! converted to an error envelope plus a matching audit event first.

use crate::audit::{hash_bytes, AuditEvent, AuditKind, AuditSink};
use crate::errors::SkillError;
use crate::runner::ExecutionResult;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use serde_json::{Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Tag identifying the shape of [`ToolResponse::content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Metadata,
    Instructions,
    Reference,
    Asset,
    ExecutionResult,
    SearchResults,
    Error,
}

/// The uniform response envelope returned by every external skill operation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub skill: Option<String>,
    pub path: Option<String>,
    pub content: Value,
    pub bytes: Option<u64>,
    pub sha256: Option<String>,
    pub truncated: Option<bool>,
    pub meta: Map<String, Value>,
}

impl ToolResponse {
    fn success(response_type: ResponseType, content: Value) -> Self {
        Self {
            ok: true,
            response_type,
            skill: None,
            path: None,
            content,
            bytes: None,
            sha256: None,
            truncated: None,
            meta: Map::new(),
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

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Builds a `metadata` envelope from catalog JSON (e.g. the output of
/// [`crate::repository::Repository::to_prompt`] in `json` form, or a single
/// descriptor serialized to JSON).
pub fn metadata(content: Value) -> ToolResponse {
    ToolResponse::success(ResponseType::Metadata, content)
}

/// Builds an `instructions` envelope for an activated skill's body text.
pub fn instructions(skill: &str, text: &str) -> ToolResponse {
    let bytes_vec = text.as_bytes();
    ToolResponse::success(ResponseType::Instructions, Value::String(text.to_string()))
        .skill(skill)
        .with_bytes_and_hash(bytes_vec)
}

/// Builds a `reference` envelope for a text resource read.
pub fn reference(skill: &str, path: &str, text: &str, truncated: bool) -> ToolResponse {
    let bytes_vec = text.as_bytes();
    let mut resp = ToolResponse::success(ResponseType::Reference, Value::String(text.to_string()))
        .skill(skill)
        .path(path)
        .with_bytes_and_hash(bytes_vec);
    resp.truncated = Some(truncated);
    resp
}

/// Builds an `asset` envelope for a binary resource read; content is
/// base64-encoded.
pub fn asset(skill: &str, path: &str, raw_bytes: &[u8]) -> ToolResponse {
    let encoded = BASE64.encode(raw_bytes);
    ToolResponse::success(ResponseType::Asset, Value::String(encoded))
        .skill(skill)
        .path(path)
        .with_bytes_and_hash(raw_bytes)
}

/// Builds an `execution_result` envelope from a completed (or timed-out)
/// script run.
pub fn execution_result(skill: &str, path: &str, result: ExecutionResult) -> ToolResponse {
    let content = serde_json::json!({
        "exit_code": result.exit_code,
        "stdout": result.stdout,
        "stderr": result.stderr,
        "duration_ms": result.duration_ms,
    });
    let mut resp = ToolResponse::success(ResponseType::ExecutionResult, content)
        .skill(skill)
        .path(path);
    resp.meta = result.meta;
    resp
}

/// Builds a `search_results` envelope.
pub fn search_results(results: Value) -> ToolResponse {
    ToolResponse::success(ResponseType::SearchResults, results)
}

/// Converts a [`SkillError`] into an error envelope and emits a matching
/// audit event. This is the only place a [`SkillError`] is allowed to stop
/// propagating and become envelope content.
pub fn from_error(err: &SkillError, skill: Option<&str>, audit: &dyn AuditSink) -> ToolResponse {
    let kind = err.kind();
    let class_name = err.class_name();
    audit.append(
        AuditEvent::new(AuditKind::Error)
            .skill(skill.unwrap_or_default())
            .detail("error_kind", kind)
            .detail("message", err.to_string()),
    );

    let mut resp = ToolResponse {
        ok: false,
        response_type: ResponseType::Error,
        skill: skill.map(str::to_string),
        path: None,
        content: Value::String(format!("{kind}: {err}")),
        bytes: None,
        sha256: None,
        truncated: None,
        meta: Map::new(),
    };
    resp.meta.insert("error_type".to_string(), Value::String(class_name.to_string()));
    resp.meta.insert("error_kind".to_string(), Value::String(kind.to_string()));
    resp
}

/// Runs `f`, converting any [`SkillError`] it returns — and any panic it
/// raises — into an error envelope. No exception or panic crosses this
/// boundary; callers always get back a [`ToolResponse`].
pub fn safe_call(
    skill: Option<&str>,
    audit: &dyn AuditSink,
    f: impl FnOnce() -> Result<ToolResponse, SkillError>,
) -> ToolResponse {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(resp)) => resp,
        Ok(Err(err)) => from_error(&err, skill, audit),
        Err(_) => from_error(
            &SkillError::Internal("operation panicked".to_string()),
            skill,
            audit,
        ),
    }
}

impl ToolResponse {
    fn with_bytes_and_hash(mut self, raw: &[u8]) -> Self {
        self.bytes = Some(raw.len() as u64);
        self.sha256 = Some(hash_bytes(raw));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoopAuditSink;

    #[test]
    fn reference_envelope_computes_bytes_and_sha256() {
        let resp = reference("demo", "references/a.md", "hello", false);
        assert_eq!(resp.bytes, Some(5));
        assert_eq!(resp.sha256.as_deref(), Some(crate::audit::hash_bytes(b"hello").as_str()));
        assert_eq!(resp.truncated, Some(false));
    }

    #[test]
    fn asset_envelope_base64_encodes_content() {
        let resp = asset("demo", "assets/img.bin", &[0, 1, 2, 3]);
        assert_eq!(resp.content, Value::String(BASE64.encode([0, 1, 2, 3])));
    }

    #[test]
    fn error_builder_maps_kind_into_meta() {
        let sink = NoopAuditSink;
        let resp = from_error(&SkillError::SkillNotFound("demo".to_string()), Some("demo"), &sink);
        assert!(!resp.ok);
        assert_eq!(resp.response_type, ResponseType::Error);
        assert_eq!(resp.meta.get("error_type"), Some(&Value::String("SkillNotFoundError".to_string())));
        assert_eq!(resp.meta.get("error_kind"), Some(&Value::String("skill_not_found".to_string())));
    }

    #[test]
    fn safe_call_converts_error_without_propagating() {
        let sink = NoopAuditSink;
        let resp = safe_call(None, &sink, || Err(SkillError::ScriptExecutionDisabled));
        assert!(!resp.ok);
        assert_eq!(resp.meta.get("error_type"), Some(&Value::String("ScriptExecutionDisabledError".to_string())));
    }

    #[test]
    fn safe_call_catches_panics() {
        let sink = NoopAuditSink;
        let resp = safe_call(None, &sink, || -> Result<ToolResponse, SkillError> {
            panic!("boom")
        });
        assert!(!resp.ok);
        assert_eq!(resp.meta.get("error_type"), Some(&Value::String("InternalError".to_string())));
    }
}
