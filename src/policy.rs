//! Declarative limits on reading ([`ResourcePolicy`]) and executing
//! ([`ExecutionPolicy`]) skill content. Policies are passed by value into a
//! [`crate::repository::Repository`] at construction time and never mutated
//! afterward.

use std::collections::HashSet;

/// Limits governing [`crate::reader`] text/binary reads.
#[derive(Debug, Clone)]
pub struct ResourcePolicy {
    /// Largest single file a reader will return in full.
    pub max_file_bytes: u64,
    /// Total bytes a single session may accumulate across all reads.
    pub max_total_bytes_per_session: u64,
    /// File extensions (including the leading dot) eligible for text reads.
    pub allow_extensions_text: HashSet<String>,
    /// Whether binary asset reads are permitted at all.
    pub allow_binary_assets: bool,
    /// Largest binary asset a reader will return.
    pub binary_max_bytes: u64,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        let allow_extensions_text = [".md", ".txt", ".json", ".yaml", ".yml", ".csv", ".tsv", ".rst"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            max_file_bytes: 200_000,
            max_total_bytes_per_session: 1_000_000,
            allow_extensions_text,
            allow_binary_assets: true,
            binary_max_bytes: 2_000_000,
        }
    }
}

/// Working directory mode for a sandboxed script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkdirMode {
    /// The child process runs with its cwd set to the skill's own directory.
    SkillRoot,
    /// A fresh temp directory is staged with the skill's `references/`,
    /// `assets/`, and `scripts/` subtrees before exec, and removed on exit.
    Tempdir,
}

/// Limits and capabilities governing [`crate::runner`] script execution.
/// Closed by default: `enabled = false` and no skills/scripts allow-listed.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    /// Master switch. When false, every `run_script` call fails with
    /// `ScriptExecutionDisabled` before any other check runs.
    pub enabled: bool,
    /// Skill names permitted to execute scripts at all.
    pub allow_skills: HashSet<String>,
    /// Glob patterns (matched against the script's rel_path within its skill)
    /// that are permitted to execute. `*` matches within a path segment,
    /// `**` matches across segments.
    pub allow_scripts_glob: Vec<String>,
    /// Deadline applied when the caller doesn't supply a shorter one.
    pub timeout_s_default: u64,
    /// Whether the child process may reach the network. When false, the
    /// runner attempts to enforce this and otherwise reports the achieved
    /// level honestly in `ExecutionResult::meta`.
    pub network_access: bool,
    /// Environment variable names passed through from the parent process
    /// into the child. No other variables are inherited.
    pub env_allowlist: HashSet<String>,
    /// Working directory strategy for the child process.
    pub workdir_mode: WorkdirMode,
    /// Interpreter binary used to dispatch `.py` scripts. Resolved against
    /// `PATH` by `std::process::Command`; defaults to `python3`.
    pub python_interpreter: String,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        let env_allowlist = ["PATH", "HOME", "LANG", "LC_ALL"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            enabled: false,
            allow_skills: HashSet::new(),
            allow_scripts_glob: Vec::new(),
            timeout_s_default: 60,
            network_access: false,
            env_allowlist,
            workdir_mode: WorkdirMode::SkillRoot,
            python_interpreter: "python3".to_string(),
        }
    }
}

impl ExecutionPolicy {
    /// Whether `script_rel_path` is allowed to run for `skill_name` under
    /// this policy. Does not check `enabled` — callers check that
    /// separately, since it is evaluated first and has its own error kind.
    pub fn allows(&self, skill_name: &str, script_rel_path: &str) -> bool {
        if !self.allow_skills.contains(skill_name) {
            return false;
        }
        self.allow_scripts_glob
            .iter()
            .any(|pattern| glob_match_segments(pattern, script_rel_path))
    }
}

/// Matches `path` against `pattern` with segment-aware glob semantics: `*`
/// matches zero or more characters within one `/`-delimited segment, `**`
/// matches zero or more entire segments.
fn glob_match_segments(pattern: &str, path: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.split('/').collect();
    let path_segs: Vec<&str> = path.split('/').collect();
    match_segs(&pattern_segs, &path_segs)
}

fn match_segs(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            if pattern.len() == 1 {
                return true;
            }
            (0..=path.len()).any(|i| match_segs(&pattern[1..], &path[i..]))
        }
        Some(seg) => {
            if path.is_empty() {
                return false;
            }
            segment_match(seg, path[0]) && match_segs(&pattern[1..], &path[1..])
        }
    }
}

/// `*`-within-segment glob matching (no `/` in either input). `glob::Pattern`
/// already treats `*` as non-`/`-crossing, which is exactly the single-
/// segment semantics needed here — the `**` cross-segment case is handled a
/// level up, in [`match_segs`], by splitting on `/` before matching.
fn segment_match(pattern: &str, text: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(text))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resource_policy_matches_spec() {
        let p = ResourcePolicy::default();
        assert_eq!(p.max_file_bytes, 200_000);
        assert_eq!(p.max_total_bytes_per_session, 1_000_000);
        assert!(p.allow_extensions_text.contains(".md"));
        assert!(p.allow_binary_assets);
        assert_eq!(p.binary_max_bytes, 2_000_000);
    }

    #[test]
    fn default_execution_policy_is_closed() {
        let p = ExecutionPolicy::default();
        assert!(!p.enabled);
        assert!(p.allow_skills.is_empty());
        assert!(p.allow_scripts_glob.is_empty());
        assert_eq!(p.timeout_s_default, 60);
        assert!(!p.network_access);
        assert!(p.env_allowlist.contains("PATH"));
        assert_eq!(p.workdir_mode, WorkdirMode::SkillRoot);
        assert_eq!(p.python_interpreter, "python3");
    }

    #[test]
    fn glob_star_stays_within_segment() {
        assert!(glob_match_segments("scripts/*.py", "scripts/build.py"));
        assert!(!glob_match_segments("scripts/*.py", "scripts/nested/build.py"));
    }

    #[test]
    fn glob_double_star_crosses_segments() {
        assert!(glob_match_segments("scripts/**", "scripts/nested/deep/build.py"));
        assert!(glob_match_segments("scripts/**/run.sh", "scripts/a/b/run.sh"));
        assert!(glob_match_segments("scripts/**/run.sh", "scripts/run.sh"));
    }

    #[test]
    fn execution_policy_allows_checks_both_skill_and_glob() {
        let mut p = ExecutionPolicy::default();
        p.allow_skills.insert("demo".to_string());
        p.allow_scripts_glob.push("scripts/*.py".to_string());
        assert!(p.allows("demo", "scripts/build.py"));
        assert!(!p.allows("demo", "scripts/build.sh"));
        assert!(!p.allows("other", "scripts/build.py"));
    }
}
