//! SKILL.md frontmatter parsing.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Lightweight metadata parsed from SKILL.md frontmatter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Namespaced metadata block, passed through untouched.
    #[serde(default)]
    pub metadata: Option<serde_yaml::Value>,
}

/// Validate a skill name: lowercase ASCII, digits, single hyphens, 1-64 chars.
pub fn validate_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
}

/// Split a document into `(frontmatter, body)`.
///
/// Returns `None` when the document has no `---` fenced frontmatter block.
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    let frontmatter = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('\n');
    Some((frontmatter, body))
}

/// Parse SKILL.md content into metadata only (frontmatter).
pub fn parse_meta(content: &str) -> Result<SkillMeta> {
    let (frontmatter, _body) = split_frontmatter(content)
        .ok_or_else(|| Error::validation("SKILL.md has no frontmatter"))?;
    serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::validation(format!("invalid SKILL.md frontmatter: {e}")))
}

/// Top-level frontmatter keys, for unexpected-key warnings.
pub fn frontmatter_keys(content: &str) -> Vec<String> {
    let Some((frontmatter, _)) = split_frontmatter(content) else {
        return Vec::new();
    };
    let Ok(serde_yaml::Value::Mapping(map)) = serde_yaml::from_str(frontmatter) else {
        return Vec::new();
    };
    map.keys()
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect()
}

/// Rewrite `frontmatter.name` so a renamed install keeps name and directory
/// in agreement. Content without parsable frontmatter is returned unchanged.
pub fn set_frontmatter_name(content: &str, target_name: &str) -> String {
    let Some((frontmatter, body)) = split_frontmatter(content) else {
        return content.to_string();
    };
    let Ok(serde_yaml::Value::Mapping(mut map)) = serde_yaml::from_str(frontmatter) else {
        return content.to_string();
    };
    map.insert(
        serde_yaml::Value::String("name".into()),
        serde_yaml::Value::String(target_name.into()),
    );
    match serde_yaml::to_string(&serde_yaml::Value::Mapping(map)) {
        Ok(dumped) => format!("---\n{}---\n{body}", dumped.trim_start_matches("---\n")),
        Err(_) => content.to_string(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_meta_reads_name_and_description() {
        let meta =
            parse_meta("---\nname: my-skill\ndescription: does things\n---\nbody\n").unwrap();
        assert_eq!(meta.name, "my-skill");
        assert_eq!(meta.description, "does things");
    }

    #[test]
    fn parse_meta_without_frontmatter_fails() {
        assert!(parse_meta("just a markdown file\n").is_err());
    }

    #[test]
    fn split_keeps_body() {
        let (fm, body) = split_frontmatter("---\nname: x\n---\n# Title\ntext\n").unwrap();
        assert_eq!(fm.trim(), "name: x");
        assert_eq!(body, "# Title\ntext\n");
    }

    #[test]
    fn validate_name_rules() {
        assert!(validate_name("hello-world"));
        assert!(validate_name("a1"));
        assert!(!validate_name(""));
        assert!(!validate_name("-leading"));
        assert!(!validate_name("trailing-"));
        assert!(!validate_name("double--hyphen"));
        assert!(!validate_name("UpperCase"));
        assert!(!validate_name(&"x".repeat(65)));
    }

    #[test]
    fn rename_rewrites_only_the_name() {
        let out = set_frontmatter_name(
            "---\nname: old\ndescription: keep\n---\nbody\n",
            "new-name",
        );
        let meta = parse_meta(&out).unwrap();
        assert_eq!(meta.name, "new-name");
        assert_eq!(meta.description, "keep");
        assert!(out.ends_with("body\n"));
    }

    #[test]
    fn frontmatter_keys_lists_top_level() {
        let keys = frontmatter_keys("---\nname: x\ndescription: y\ncustom: z\n---\n");
        assert_eq!(keys, vec!["name", "description", "custom"]);
    }
}
