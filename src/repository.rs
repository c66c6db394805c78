//! [`Repository`]: owns the descriptor table, policies, and the sandbox used
//! to open handles. `refresh()` rescans and atomically swaps the descriptor
//! table so concurrent `list()`/`open()` calls always see a consistent
//! snapshot (copy-on-write via `ArcSwap`-style `RwLock<Arc<_>>`).

use crate::audit::{AuditEvent, AuditKind, AuditSink, NoopAuditSink};
use crate::descriptor::SkillDescriptor;
use crate::errors::SkillError;
use crate::handle::SkillHandle;
use crate::policy::{ExecutionPolicy, ResourcePolicy};
use crate::runner::{LocalProcessSandbox, Sandbox};
use crate::scanner::Scanner;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Construction-time configuration for a [`Repository`]. Passed by value;
/// never mutated after construction.
pub struct RepositoryConfig {
    pub roots: Vec<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub resource_policy: ResourcePolicy,
    pub execution_policy: ExecutionPolicy,
    pub audit_sink: Arc<dyn AuditSink>,
    pub sandbox: Arc<dyn Sandbox>,
}

impl RepositoryConfig {
    /// Convenience constructor for embedding applications that don't need a
    /// custom audit sink or sandbox backend.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            cache_dir: None,
            resource_policy: ResourcePolicy::default(),
            execution_policy: ExecutionPolicy::default(),
            audit_sink: Arc::new(NoopAuditSink),
            sandbox: Arc::new(LocalProcessSandbox),
        }
    }
}

/// Output format for [`Repository::to_prompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptFormat {
    ClaudeXml,
    Json,
}

/// Top-level registry: scans configured roots, holds the resulting catalog,
/// and opens [`SkillHandle`]s bound to its policies.
pub struct Repository {
    roots: Vec<PathBuf>,
    scanner: Scanner,
    resource_policy: ResourcePolicy,
    execution_policy: ExecutionPolicy,
    audit: Arc<dyn AuditSink>,
    sandbox: Arc<dyn Sandbox>,
    catalog: RwLock<Arc<Vec<SkillDescriptor>>>,
}

impl Repository {
    pub fn new(config: RepositoryConfig) -> Self {
        let scanner = Scanner::new(config.cache_dir);
        Self {
            roots: config.roots,
            scanner,
            resource_policy: config.resource_policy,
            execution_policy: config.execution_policy,
            audit: config.audit_sink,
            sandbox: config.sandbox,
            catalog: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// The audit sink this repository was constructed with.
    pub fn audit_sink(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    /// The resource policy this repository was constructed with.
    pub fn resource_policy(&self) -> &ResourcePolicy {
        &self.resource_policy
    }

    /// Rescans all configured roots and atomically replaces the catalog,
    /// returning the new snapshot.
    pub fn refresh(&self) -> Arc<Vec<SkillDescriptor>> {
        let descriptors = self.scanner.scan(&self.roots, self.audit.as_ref());
        let snapshot = Arc::new(descriptors);
        *self.catalog.write().expect("catalog lock poisoned") = snapshot.clone();
        snapshot
    }

    /// Returns the current catalog snapshot without rescanning.
    pub fn list(&self) -> Arc<Vec<SkillDescriptor>> {
        let snapshot = self.catalog.read().expect("catalog lock poisoned").clone();
        self.audit.append(AuditEvent::new(AuditKind::List).detail("count", snapshot.len() as u64));
        snapshot
    }

    /// Opens a fresh handle bound to the named skill's current descriptor.
    pub fn open(&self, name: &str) -> Result<SkillHandle<'_>, SkillError> {
        let snapshot = self.catalog.read().expect("catalog lock poisoned").clone();
        let descriptor = snapshot
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| SkillError::SkillNotFound(name.to_string()))?;

        self.audit.append(AuditEvent::new(AuditKind::Open).skill(name));

        Ok(SkillHandle::new(
            descriptor,
            &self.resource_policy,
            &self.execution_policy,
            self.sandbox.as_ref(),
        ))
    }

    /// Materializes the current catalog for system-prompt injection.
    pub fn to_prompt(&self, format: PromptFormat) -> String {
        let snapshot = self.catalog.read().expect("catalog lock poisoned").clone();
        match format {
            PromptFormat::ClaudeXml => render_claude_xml(&snapshot),
            PromptFormat::Json => render_json(&snapshot),
        }
    }

    /// A compact one-line summary, e.g. `"Skills: demo, reviewer (2 total)"`.
    pub fn prompt_summary(&self) -> String {
        let snapshot = self.catalog.read().expect("catalog lock poisoned").clone();
        if snapshot.is_empty() {
            return String::new();
        }
        let names: Vec<&str> = snapshot.iter().map(|d| d.name.as_str()).collect();
        format!("Skills: {} ({} total)", names.join(", "), names.len())
    }

    /// A complete, skill-agnostic system prompt teaching an agent how to
    /// discover and activate skills, without baking in any skill-specific
    /// knowledge.
    pub fn agent_system_prompt(&self) -> String {
        let snapshot = self.catalog.read().expect("catalog lock poisoned").clone();
        if snapshot.is_empty() {
            return "No skills are currently available.".to_string();
        }
        let mut prompt = String::from(
            "You have access to skills that provide specialized capabilities.\n\n## Available Skills\n\n",
        );
        for d in snapshot.iter() {
            prompt.push_str(&format!("- {}: {}\n", d.name, d.description));
        }
        prompt.push_str(
            "\nActivate a skill with skills.activate(name) when the request matches its purpose, \
             then follow its instructions.",
        );
        prompt
    }
}

fn render_claude_xml(descriptors: &[SkillDescriptor]) -> String {
    let mut out = String::new();
    for d in descriptors {
        out.push_str(&format!("<skill name=\"{}\">\n", xml_escape(&d.name)));
        out.push_str(&format!("  <description>{}</description>\n", xml_escape(&d.description)));
        out.push_str(&format!("  <path>{}</path>\n", xml_escape(&d.path.to_string_lossy())));
        if !d.allowed_tools.is_empty() {
            out.push_str(&format!(
                "  <allowed_tools>{}</allowed_tools>\n",
                xml_escape(&d.allowed_tools.join(", "))
            ));
        }
        out.push_str("</skill>\n");
    }
    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_json(descriptors: &[SkillDescriptor]) -> String {
    let array: Vec<serde_json::Value> = descriptors
        .iter()
        .map(|d| {
            serde_json::json!({
                "name": d.name,
                "description": d.description,
                "path": d.path,
                "license": d.license,
                "allowed_tools": d.allowed_tools,
            })
        })
        .collect();
    serde_json::Value::Array(array).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_skill(root: &std::path::Path, name: &str, desc: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {name}\ndescription: {desc}\n---\nbody\n"),
        )
        .unwrap();
    }

    #[test]
    fn happy_path_list_after_refresh() {
        let root = TempDir::new().unwrap();
        write_skill(root.path(), "demo", "d");
        let config = RepositoryConfig::new(vec![root.path().to_path_buf()]);
        let repo = Repository::new(config);
        repo.refresh();
        let list = repo.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "demo");
    }

    #[test]
    fn to_prompt_json_contains_descriptor_fields() {
        let root = TempDir::new().unwrap();
        write_skill(root.path(), "demo", "d");
        let config = RepositoryConfig::new(vec![root.path().to_path_buf()]);
        let repo = Repository::new(config);
        repo.refresh();
        let json = repo.to_prompt(PromptFormat::Json);
        assert!(json.contains("\"name\":\"demo\""));
        assert!(json.contains("\"description\":\"d\""));
    }

    #[test]
    fn open_unknown_skill_errors() {
        let root = TempDir::new().unwrap();
        let config = RepositoryConfig::new(vec![root.path().to_path_buf()]);
        let repo = Repository::new(config);
        repo.refresh();
        assert!(matches!(repo.open("nope"), Err(SkillError::SkillNotFound(_))));
    }

    #[test]
    fn path_traversal_is_blocked_end_to_end() {
        let root = TempDir::new().unwrap();
        write_skill(root.path(), "demo", "d");
        let config = RepositoryConfig::new(vec![root.path().to_path_buf()]);
        let repo = Repository::new(config);
        repo.refresh();
        let handle = repo.open("demo").unwrap();
        let sink = NoopAuditSink;
        let result = handle.read_reference("../../etc/passwd", 0, &sink);
        assert!(matches!(result, Err(SkillError::PathTraversal(_))));
    }
}
