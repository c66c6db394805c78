//! Walks configured skill roots one level deep, builds a [`SkillDescriptor`]
//! for each valid skill directory found, and maintains an on-disk metadata
//! cache keyed by content hash and mtime so unchanged skills are not
//! re-parsed on every scan.
//!
//! Grounded on the teacher's `registry::SkillRegistry::{discover,
//! scan_directory}` failure-isolation idiom (a bad skill is logged and
//! skipped, never aborts the scan) with an added on-disk cache layer the
//! teacher's registry does not have.

use crate::audit::{hash_bytes, AuditEvent, AuditKind, AuditSink};
use crate::descriptor::{mtime_millis, SkillDescriptor};
use crate::frontmatter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

const CACHE_VERSION: u32 = 1;
const CACHE_FILE_NAME: &str = "skills_index.json";

/// Name/description length and charset constraints, beyond spec.md §3's bare
/// "non-empty and unique" invariant. Carried forward from the teacher's
/// `validator::validate_name`/`validate_description` since real SKILL.md
/// authoring tooling enforces these and a scanner that silently accepted
/// anything would let obviously-malformed catalogs through uncaught.
const MAX_NAME_LENGTH: usize = 64;
const MAX_DESCRIPTION_LENGTH: usize = 1024;
const RESERVED_NAMES: &[&str] = &["anthropic", "claude", "skill", "system"];

fn validate_name(name: &str) -> Result<(), crate::errors::SkillError> {
    use crate::errors::SkillError;

    if name.len() > MAX_NAME_LENGTH {
        return Err(SkillError::SkillParseError(format!(
            "skill name exceeds {MAX_NAME_LENGTH} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(SkillError::SkillParseError(format!(
            "skill name {name:?} must contain only lowercase letters, digits, and hyphens"
        )));
    }
    if name.contains('<') || name.contains('>') {
        return Err(SkillError::SkillParseError(
            "skill name cannot contain XML-like tags".to_string(),
        ));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(SkillError::SkillParseError(format!(
            "skill name {name:?} is a reserved word"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), crate::errors::SkillError> {
    use crate::errors::SkillError;

    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(SkillError::SkillParseError(format!(
            "skill description exceeds {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    if description.contains('<') || description.contains('>') {
        return Err(SkillError::SkillParseError(
            "skill description cannot contain XML-like tags".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct CacheDoc {
    version: u32,
    entries: Vec<CacheEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct CacheEntry {
    path: PathBuf,
    hash: String,
    mtime: u64,
    descriptor: SkillDescriptor,
}

/// Scans `roots` in order, returning every valid [`SkillDescriptor`] found.
/// Directories sharing a name across roots resolve first-wins: the earliest
/// root in `roots` that defines a given skill name shadows later ones.
/// Invalid skills (parse failure, missing `SKILL.md`, or a name collision
/// within the same root) are logged as audit events and omitted; they never
/// abort the scan.
pub struct Scanner {
    cache_path: Option<PathBuf>,
    cache_lock: Mutex<()>,
}

impl Scanner {
    /// `cache_dir`, if given, is where `skills_index.json` is read from and
    /// written to. `None` disables caching (every scan parses from scratch).
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self {
            cache_path: cache_dir.map(|d| d.join(CACHE_FILE_NAME)),
            cache_lock: Mutex::new(()),
        }
    }

    pub fn scan(&self, roots: &[PathBuf], audit: &dyn AuditSink) -> Vec<SkillDescriptor> {
        let _guard = self.cache_lock.lock().expect("scanner cache mutex poisoned");
        let mut cache = self.load_cache();
        let mut cache_by_path: HashMap<PathBuf, CacheEntry> = cache
            .entries
            .drain(..)
            .map(|e| (e.path.clone(), e))
            .collect();

        let mut seen_names: HashMap<String, PathBuf> = HashMap::new();
        let mut result = Vec::new();
        let mut new_entries = Vec::new();

        for root in roots {
            if !root.is_dir() {
                audit.append(
                    AuditEvent::new(AuditKind::Scan)
                        .path(root.to_string_lossy().into_owned())
                        .detail("parsed", false)
                        .detail("error", "root is not a directory"),
                );
                continue;
            }

            // min_depth(1) skips the root itself; max_depth(1) keeps this a
            // one-level scan (a skill's own subdirectories, e.g. scripts/,
            // are never themselves candidate skill roots).
            let subdirs = WalkDir::new(root)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok());

            let real_root = match root.canonicalize() {
                Ok(r) => r,
                Err(_) => continue,
            };

            for entry in subdirs {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                // A candidate skill directory that is itself a symlink (or
                // contains one) pointing outside this root is refused, even
                // though it "exists" and may contain a SKILL.md.
                match path.canonicalize() {
                    Ok(real_path) if real_path.starts_with(&real_root) => {}
                    _ => {
                        audit.append(
                            AuditEvent::new(AuditKind::Scan)
                                .path(path.to_string_lossy().into_owned())
                                .detail("parsed", false)
                                .detail("error", "skill directory escapes configured root"),
                        );
                        continue;
                    }
                }
                let skill_md = path.join("SKILL.md");
                if !skill_md.is_file() {
                    continue;
                }
                let path = path.to_path_buf();

                match self.load_one(&skill_md, &path, &mut cache_by_path, &mut new_entries, audit) {
                    Ok(descriptor) => {
                        if let Some(existing_root) = seen_names.get(&descriptor.name) {
                            audit.append(
                                AuditEvent::new(AuditKind::Scan)
                                    .skill(&descriptor.name)
                                    .path(path.to_string_lossy().into_owned())
                                    .detail("parsed", true)
                                    .detail("error", format!(
                                        "duplicate skill name, first defined under {}",
                                        existing_root.display()
                                    )),
                            );
                            continue;
                        }
                        seen_names.insert(descriptor.name.clone(), root.clone());
                        result.push(descriptor);
                    }
                    Err(e) => {
                        audit.append(
                            AuditEvent::new(AuditKind::Scan)
                                .path(path.to_string_lossy().into_owned())
                                .detail("parsed", true)
                                .detail("error", e.to_string()),
                        );
                    }
                }
            }
        }

        self.write_cache(&new_entries);
        result
    }

    fn load_one(
        &self,
        skill_md: &Path,
        skill_root: &Path,
        cache_by_path: &mut HashMap<PathBuf, CacheEntry>,
        new_entries: &mut Vec<CacheEntry>,
        audit: &dyn AuditSink,
    ) -> Result<SkillDescriptor, crate::errors::SkillError> {
        let metadata = fs::metadata(skill_md)?;
        let mtime = mtime_millis(metadata.modified()?);
        let bytes = fs::read(skill_md)?;
        let hash = hash_bytes(&bytes);

        if let Some(cached) = cache_by_path.get(skill_root) {
            if cached.hash == hash && cached.mtime == mtime {
                audit.append(
                    AuditEvent::new(AuditKind::Scan)
                        .skill(&cached.descriptor.name)
                        .path(skill_root.to_string_lossy().into_owned())
                        .detail("parsed", false),
                );
                new_entries.push(cached.clone());
                return Ok(cached.descriptor.clone());
            }
        }

        let content = String::from_utf8_lossy(&bytes).into_owned();
        let fm = frontmatter::parse_frontmatter_only(&content)?;
        validate_name(&fm.name)?;
        validate_description(&fm.description)?;

        let descriptor = SkillDescriptor {
            name: fm.name,
            description: fm.description,
            path: skill_root.to_path_buf(),
            license: fm.license,
            compatibility: fm.compatibility,
            metadata: fm.metadata,
            allowed_tools: fm.allowed_tools,
            hash: hash.clone(),
            mtime,
        };

        audit.append(
            AuditEvent::new(AuditKind::Scan)
                .skill(&descriptor.name)
                .path(skill_root.to_string_lossy().into_owned())
                .sha256(hash.clone())
                .detail("parsed", true),
        );

        new_entries.push(CacheEntry {
            path: skill_root.to_path_buf(),
            hash,
            mtime,
            descriptor: descriptor.clone(),
        });

        Ok(descriptor)
    }

    fn load_cache(&self) -> CacheDoc {
        let Some(path) = &self.cache_path else {
            return CacheDoc::default();
        };
        let Ok(bytes) = fs::read(path) else {
            return CacheDoc::default();
        };
        match serde_json::from_slice::<CacheDoc>(&bytes) {
            Ok(doc) if doc.version == CACHE_VERSION => doc,
            _ => CacheDoc::default(),
        }
    }

    fn write_cache(&self, entries: &[CacheEntry]) {
        let Some(path) = &self.cache_path else {
            return;
        };
        let doc = CacheDoc {
            version: CACHE_VERSION,
            entries: entries.to_vec(),
        };
        if let Ok(bytes) = serde_json::to_vec_pretty(&doc) {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = fs::write(path, bytes);
        }
    }
}
