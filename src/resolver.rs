//! Resolves a caller-supplied relative path against a skill root, refusing
//! any path that would escape the root after symlink expansion.

use crate::errors::SkillError;
use std::path::{Component, Path, PathBuf};

/// Resolves `rel_path` against `skill_root`, returning the absolute,
/// symlink-resolved path inside the skill.
///
/// Rejects with [`SkillError::PathTraversal`] if `rel_path` is absolute,
/// contains a `..` component, carries a Windows drive or UNC prefix, targets
/// `SKILL.md` directly (only reachable via the handle's instructions API), or
/// resolves (after symlink expansion) outside `skill_root`'s own real path.
pub fn resolve(skill_root: &Path, rel_path: &str) -> Result<PathBuf, SkillError> {
    let candidate = Path::new(rel_path);

    if candidate.is_absolute() {
        return Err(SkillError::PathTraversal(format!(
            "path must be relative: {rel_path}"
        )));
    }

    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                return Err(SkillError::PathTraversal(format!(
                    "path contains a parent-directory component: {rel_path}"
                )));
            }
            Component::Prefix(_) => {
                return Err(SkillError::PathTraversal(format!(
                    "drive/UNC prefixes are not permitted: {rel_path}"
                )));
            }
            Component::RootDir => {
                return Err(SkillError::PathTraversal(format!(
                    "path must be relative: {rel_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    if candidate
        .file_name()
        .map(|n| n.eq_ignore_ascii_case("SKILL.md"))
        .unwrap_or(false)
        && candidate.parent().map(|p| p.as_os_str().is_empty()).unwrap_or(true)
    {
        return Err(SkillError::PathTraversal(
            "SKILL.md is only reachable via the skill handle's instructions API".to_string(),
        ));
    }

    let joined = skill_root.join(candidate);

    let real_root = skill_root
        .canonicalize()
        .map_err(|e| SkillError::Internal(format!("cannot canonicalize skill root: {e}")))?;

    let real_path = joined.canonicalize().map_err(|e| {
        SkillError::PathTraversal(format!("cannot resolve {rel_path}: {e}"))
    })?;

    if !real_path.starts_with(&real_root) {
        return Err(SkillError::PathTraversal(format!(
            "resolved path escapes skill root: {rel_path}"
        )));
    }

    Ok(real_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn skill_with_ref(name: &str, contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let refs = dir.path().join("references");
        fs::create_dir_all(&refs).unwrap();
        fs::write(refs.join(name), contents).unwrap();
        let root = dir.path().to_path_buf();
        (dir, root)
    }

    #[test]
    fn resolves_a_plain_relative_path() {
        let (_dir, root) = skill_with_ref("notes.md", "hi");
        let resolved = resolve(&root, "references/notes.md").unwrap();
        assert!(resolved.ends_with("references/notes.md"));
    }

    #[test]
    fn rejects_absolute_path() {
        let (_dir, root) = skill_with_ref("notes.md", "hi");
        assert!(matches!(
            resolve(&root, "/etc/passwd"),
            Err(SkillError::PathTraversal(_))
        ));
    }

    #[test]
    fn rejects_parent_dir_component() {
        let (_dir, root) = skill_with_ref("notes.md", "hi");
        assert!(matches!(
            resolve(&root, "../../etc/passwd"),
            Err(SkillError::PathTraversal(_))
        ));
    }

    #[test]
    fn rejects_symlink_escape() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("skill");
        fs::create_dir_all(&root).unwrap();
        let outside = dir.path().join("outside.txt");
        fs::write(&outside, "secret").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(&outside, root.join("link.txt")).unwrap();
        #[cfg(unix)]
        assert!(matches!(
            resolve(&root, "link.txt"),
            Err(SkillError::PathTraversal(_))
        ));
    }

    #[test]
    fn rejects_direct_skill_md_access() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("SKILL.md"), "---\nname: d\ndescription: d\n---\n").unwrap();
        assert!(matches!(
            resolve(dir.path(), "SKILL.md"),
            Err(SkillError::PathTraversal(_))
        ));
    }
}
