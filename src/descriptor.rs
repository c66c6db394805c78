//! [`SkillDescriptor`]: the immutable, metadata-only record the scanner
//! produces for each discovered skill. Descriptors are owned by the
//! [`crate::repository::Repository`]; handles borrow them, never own them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::SystemTime;

/// Metadata-only record describing one discovered skill.
///
/// Invariants: `name` is non-empty and unique within a catalog; `path` names
/// a directory that exists, is readable, and contains a `SKILL.md`; `hash` is
/// the SHA-256 of that `SKILL.md`'s bytes at the time of the last scan that
/// (re-)produced this descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    pub license: Option<String>,
    pub compatibility: Value,
    pub metadata: Value,
    pub allowed_tools: Vec<String>,
    pub hash: String,
    pub mtime: u64,
}

impl SkillDescriptor {
    /// Path to this skill's `SKILL.md`.
    pub fn skill_md_path(&self) -> PathBuf {
        self.path.join("SKILL.md")
    }
}

/// Converts a [`SystemTime`] to a Unix-epoch millisecond count, saturating at
/// zero for times before the epoch (never expected in practice, but avoids a
/// panic on an unusual clock).
pub fn mtime_millis(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trips_through_json() {
        let d = SkillDescriptor {
            name: "demo".to_string(),
            description: "d".to_string(),
            path: PathBuf::from("/skills/demo"),
            license: Some("MIT".to_string()),
            compatibility: Value::Null,
            metadata: Value::Object(Default::default()),
            allowed_tools: vec!["Read".to_string()],
            hash: "abc123".to_string(),
            mtime: 42,
        };
        let json = serde_json::to_string(&d).unwrap();
        let back: SkillDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
