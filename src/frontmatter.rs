//! Parses the YAML frontmatter block and Markdown body of a `SKILL.md` file.
//!
//! Adapted from the teacher's `skill_parser::parse_skill_md` delimiter-search
//! algorithm, generalized to preserve unrecognized frontmatter keys under an
//! opaque `metadata` map rather than requiring a fixed manifest shape.

use crate::errors::SkillError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Recognized frontmatter keys; everything else is preserved under `metadata`.
const KNOWN_KEYS: &[&str] = &["name", "description", "license", "compatibility", "metadata", "allowed_tools", "allowed-tools"];

/// Frontmatter extracted from a `SKILL.md` file, plus the Markdown body.
#[derive(Debug, Clone)]
pub struct Frontmatter {
    pub name: String,
    pub description: String,
    pub license: Option<String>,
    pub compatibility: Value,
    pub allowed_tools: Vec<String>,
    /// Unknown frontmatter keys, preserved verbatim.
    pub metadata: Value,
}

/// Result of parsing a full `SKILL.md` document.
#[derive(Debug, Clone)]
pub struct ParsedSkill {
    pub frontmatter: Frontmatter,
    pub body: String,
}

/// Parses `content` as `---`-delimited YAML frontmatter followed by a
/// Markdown body. Fails with [`SkillError::SkillParseError`] if the opening
/// delimiter is present but the closing one is missing, the block is not
/// valid YAML, or `name`/`description` are missing or empty.
pub fn parse(content: &str) -> Result<ParsedSkill, SkillError> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return Err(SkillError::SkillParseError(
            "SKILL.md must start with a YAML frontmatter block (---)".to_string(),
        ));
    }

    let after_first = &trimmed[3..];
    let closing_idx = after_first.find("\n---").ok_or_else(|| {
        SkillError::SkillParseError("frontmatter block is not closed with ---".to_string())
    })?;

    let yaml_block = after_first[..closing_idx].trim();
    let rest_start = closing_idx + 4; // skip "\n---"
    let body = if rest_start < after_first.len() {
        after_first[rest_start..].trim().to_string()
    } else {
        String::new()
    };

    let frontmatter = parse_yaml_block(yaml_block)?;
    Ok(ParsedSkill { frontmatter, body })
}

/// Parses only the frontmatter block, ignoring the body. Used by the scanner
/// during discovery so only metadata is materialized, not the full body.
pub fn parse_frontmatter_only(content: &str) -> Result<Frontmatter, SkillError> {
    Ok(parse(content)?.frontmatter)
}

fn parse_yaml_block(yaml_block: &str) -> Result<Frontmatter, SkillError> {
    let value: Value = serde_yaml::from_str(yaml_block)
        .map_err(|e| SkillError::SkillParseError(format!("invalid frontmatter YAML: {e}")))?;

    let obj = value.as_object().cloned().ok_or_else(|| {
        SkillError::SkillParseError("frontmatter must be a YAML mapping".to_string())
    })?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SkillError::SkillParseError("missing required key: name".to_string()))?;

    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            SkillError::SkillParseError("missing required key: description".to_string())
        })?;

    let license = obj
        .get("license")
        .and_then(Value::as_str)
        .map(str::to_string);

    let compatibility = obj.get("compatibility").cloned().unwrap_or(Value::Null);

    let allowed_tools = obj
        .get("allowed_tools")
        .or_else(|| obj.get("allowed-tools"))
        .map(parse_allowed_tools)
        .unwrap_or_default();

    let mut explicit_metadata = obj
        .get("metadata")
        .cloned()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();

    for (k, v) in &obj {
        if !KNOWN_KEYS.contains(&k.as_str()) {
            explicit_metadata.insert(k.clone(), v.clone());
        }
    }

    let metadata = if explicit_metadata.is_empty() {
        Value::Object(Map::new())
    } else {
        Value::Object(explicit_metadata)
    };

    Ok(Frontmatter {
        name,
        description,
        license,
        compatibility,
        allowed_tools,
        metadata,
    })
}

/// `allowed_tools`/`allowed-tools` may be a YAML list or a comma/space
/// separated string — both forms appear in real SKILL.md files.
fn parse_allowed_tools(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Deterministic display form of `metadata`, used by golden-output tests
/// that need a stable key order.
pub fn metadata_as_sorted_map(value: &Value) -> BTreeMap<String, Value> {
    value
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_skill_md() {
        let content = "---\nname: demo\ndescription: A demo skill.\n---\n\n# Instructions\n\nDo the thing.\n";
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.frontmatter.name, "demo");
        assert_eq!(parsed.frontmatter.description, "A demo skill.");
        assert!(parsed.body.contains("Do the thing."));
    }

    #[test]
    fn allowed_tools_comma_separated() {
        let content = "---\nname: demo\ndescription: d\nallowed_tools: Read, Grep, Glob\n---\n";
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.frontmatter.allowed_tools, vec!["Read", "Grep", "Glob"]);
    }

    #[test]
    fn allowed_tools_list_form() {
        let content = "---\nname: demo\ndescription: d\nallowed-tools:\n  - Read\n  - Write\n---\n";
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.frontmatter.allowed_tools, vec!["Read", "Write"]);
    }

    #[test]
    fn unknown_keys_preserved_under_metadata() {
        let content = "---\nname: demo\ndescription: d\nauthor: jane\nkeywords: [a, b]\n---\n";
        let parsed = parse(content).unwrap();
        let meta = parsed.frontmatter.metadata.as_object().unwrap();
        assert_eq!(meta.get("author").unwrap(), "jane");
        assert!(meta.contains_key("keywords"));
    }

    #[test]
    fn missing_frontmatter_is_parse_error() {
        let content = "# Just markdown\n\nNo frontmatter.";
        assert!(matches!(parse(content), Err(SkillError::SkillParseError(_))));
    }

    #[test]
    fn unclosed_frontmatter_is_parse_error() {
        let content = "---\nname: demo\n\nno closing delimiter";
        assert!(matches!(parse(content), Err(SkillError::SkillParseError(_))));
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let content = "---\nname: demo\ndescription: [oops\n---\n";
        assert!(matches!(parse(content), Err(SkillError::SkillParseError(_))));
    }

    #[test]
    fn missing_name_is_parse_error() {
        let content = "---\ndescription: d\n---\n";
        assert!(matches!(parse(content), Err(SkillError::SkillParseError(_))));
    }

    #[test]
    fn missing_description_is_parse_error() {
        let content = "---\nname: demo\n---\n";
        assert!(matches!(parse(content), Err(SkillError::SkillParseError(_))));
    }

    #[test]
    fn empty_body_is_ok() {
        let content = "---\nname: demo\ndescription: d\n---\n";
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn empty_name_value_is_parse_error() {
        let content = "---\nname: \"\"\ndescription: d\n---\n";
        assert!(matches!(parse(content), Err(SkillError::SkillParseError(_))));
    }

    #[test]
    fn frontmatter_only_ignores_body() {
        let content = "---\nname: demo\ndescription: d\n---\nBody content here.\n";
        let fm = parse_frontmatter_only(content).unwrap();
        assert_eq!(fm.name, "demo");
    }
}
