//! Bounded, budget-aware reads of a skill's `references/`/`assets/` content.
//!
//! Callers are expected to route every read through a session so that
//! `bytes_consumed` aggregates correctly across a session's lifetime; this
//! module itself is stateless and takes the session's running total as a
//! plain argument, returning how many bytes it actually debits.

use crate::audit::{hash_bytes, AuditEvent, AuditKind, AuditSink};
use crate::errors::SkillError;
use crate::policy::ResourcePolicy;
use crate::resolver;
use std::fs;
use std::path::Path;

/// The outcome of a single bounded read.
pub struct ReadOutcome {
    pub content: Vec<u8>,
    pub truncated: bool,
    pub sha256: String,
    /// Bytes actually returned — the amount to debit from the session's
    /// running total. Failed reads never reach this point, so this is
    /// always charged on success.
    pub bytes: u64,
}

/// Reads a text resource, honoring the per-file and per-session byte budgets.
///
/// Requires the file's extension to be a member of
/// `policy.allow_extensions_text`. A file of exactly `max_file_bytes` (and
/// within the session's remaining budget) succeeds untruncated. A file
/// exceeding `max_file_bytes`, the session's remaining budget, or both,
/// returns a UTF-8-safe truncated prefix at whichever limit binds tighter,
/// with `truncated = true`; only when the session's remaining budget is
/// already zero — so no prefix at all could be returned — does this fail
/// with [`SkillError::ResourceTooLarge`].
pub fn read_text(
    policy: &ResourcePolicy,
    skill_root: &Path,
    rel_path: &str,
    session_bytes_consumed: u64,
    audit: &dyn AuditSink,
    skill_name: &str,
) -> Result<ReadOutcome, SkillError> {
    let ext = extension_of(rel_path);
    if !policy.allow_extensions_text.contains(&ext) {
        return Err(SkillError::PolicyViolation(format!(
            "extension {ext} is not in allow_extensions_text"
        )));
    }

    let resolved = resolver::resolve(skill_root, rel_path)?;
    let metadata = fs::metadata(&resolved)?;
    let size = metadata.len();

    let remaining_session_budget = policy
        .max_total_bytes_per_session
        .saturating_sub(session_bytes_consumed);

    if remaining_session_budget == 0 {
        return Err(SkillError::ResourceTooLarge(format!(
            "session byte budget exhausted, cannot read {rel_path}"
        )));
    }

    let bytes = fs::read(&resolved)?;
    let effective_limit = policy.max_file_bytes.min(remaining_session_budget);

    let outcome = if size <= effective_limit {
        ReadOutcome {
            sha256: hash_bytes(&bytes),
            bytes: bytes.len() as u64,
            content: bytes,
            truncated: false,
        }
    } else {
        let cut = utf8_safe_boundary(&bytes, effective_limit as usize);
        let truncated_bytes = bytes[..cut].to_vec();
        ReadOutcome {
            sha256: hash_bytes(&truncated_bytes),
            bytes: truncated_bytes.len() as u64,
            content: truncated_bytes,
            truncated: true,
        }
    };

    audit.append(
        AuditEvent::new(AuditKind::Read)
            .skill(skill_name)
            .path(rel_path)
            .bytes(outcome.bytes)
            .sha256(outcome.sha256.clone())
            .detail("truncated", outcome.truncated),
    );

    Ok(outcome)
}

/// Reads a binary asset. Requires `policy.allow_binary_assets`. Never
/// truncates: a file larger than `binary_max_bytes`, or one that would push
/// the session over its total budget, fails with
/// [`SkillError::ResourceTooLarge`].
pub fn read_binary(
    policy: &ResourcePolicy,
    skill_root: &Path,
    rel_path: &str,
    session_bytes_consumed: u64,
    audit: &dyn AuditSink,
    skill_name: &str,
) -> Result<ReadOutcome, SkillError> {
    if !policy.allow_binary_assets {
        return Err(SkillError::PolicyViolation(
            "binary asset reads are disabled".to_string(),
        ));
    }

    let resolved = resolver::resolve(skill_root, rel_path)?;
    let metadata = fs::metadata(&resolved)?;
    let size = metadata.len();

    if size > policy.binary_max_bytes {
        return Err(SkillError::ResourceTooLarge(format!(
            "{rel_path} is {size} bytes, exceeds binary_max_bytes={}",
            policy.binary_max_bytes
        )));
    }

    let remaining_session_budget = policy
        .max_total_bytes_per_session
        .saturating_sub(session_bytes_consumed);
    if size > remaining_session_budget {
        return Err(SkillError::ResourceTooLarge(format!(
            "session byte budget exhausted, cannot read {rel_path}"
        )));
    }

    let bytes = fs::read(&resolved)?;
    let sha256 = hash_bytes(&bytes);
    let outcome = ReadOutcome {
        bytes: bytes.len() as u64,
        content: bytes,
        truncated: false,
        sha256,
    };

    audit.append(
        AuditEvent::new(AuditKind::Read)
            .skill(skill_name)
            .path(rel_path)
            .bytes(outcome.bytes)
            .sha256(outcome.sha256.clone())
            .detail("truncated", false),
    );

    Ok(outcome)
}

fn extension_of(rel_path: &str) -> String {
    Path::new(rel_path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// Finds the largest `n <= max_len` such that `bytes[..n]` ends on a UTF-8
/// character boundary, searching backward from `max_len`.
fn utf8_safe_boundary(bytes: &[u8], max_len: usize) -> usize {
    let mut n = max_len.min(bytes.len());
    while n > 0 && !is_char_boundary(bytes, n) {
        n -= 1;
    }
    n
}

fn is_char_boundary(bytes: &[u8], index: usize) -> bool {
    match bytes.get(index) {
        None => index == bytes.len(),
        Some(&b) => (b as i8) >= -0x40, // not a UTF-8 continuation byte (0b10xxxxxx)
    }
}
