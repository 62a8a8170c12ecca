//! Skill validation rules.
//!
//! The add engine consumes only the pass/fail signal (any fatal issue blocks
//! that skill); warnings are surfaced to logs and otherwise ignored.

use std::path::Path;

use crate::{detect::SKILL_FILE, parse};

const SKILL_LINE_THRESHOLD: usize = 500;
const DESCRIPTION_MAX_LENGTH: usize = 1024;
const NAME_RESERVED_WORDS: &[&str] = &["anthropic-helper", "claude-tools"];

/// Allowed top-level frontmatter properties.
const ALLOWED_FRONTMATTER_KEYS: &[&str] =
    &["name", "description", "license", "allowed-tools", "metadata"];

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub field: &'static str,
    pub message: String,
}

fn fatal(field: &'static str, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        severity: Severity::Fatal,
        field,
        message: message.into(),
    }
}

fn warning(field: &'static str, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        severity: Severity::Warning,
        field,
        message: message.into(),
    }
}

/// True when any issue is fatal.
pub fn has_fatal(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Fatal)
}

/// Validate a skill directory against the SKILL.md contract.
///
/// The terminal directory name is the identity the skill will be installed
/// under; `frontmatter.name` must match it.
pub fn validate_skill_dir(skill_dir: &Path) -> Vec<ValidationIssue> {
    let skill_md = skill_dir.join(SKILL_FILE);
    let content = match std::fs::read_to_string(&skill_md) {
        Ok(c) => c,
        Err(e) => {
            return vec![fatal(
                "file",
                format!("{SKILL_FILE} not readable in {}: {e}", skill_dir.display()),
            )];
        },
    };

    let meta = match parse::parse_meta(&content) {
        Ok(m) => m,
        Err(e) => return vec![fatal("frontmatter", e.to_string())],
    };

    let mut issues = Vec::new();
    let dir_name = skill_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if meta.name.is_empty() {
        issues.push(fatal("name", "frontmatter.name: missing"));
    }
    if meta.description.is_empty() {
        issues.push(fatal("description", "frontmatter.description: missing"));
    }

    if !meta.name.is_empty() {
        if !parse::validate_name(&meta.name) {
            issues.push(fatal(
                "name",
                "frontmatter.name: must be 1-64 lowercase alphanumeric/hyphen chars",
            ));
        }
        for reserved in NAME_RESERVED_WORDS {
            if meta.name.contains(reserved) {
                issues.push(fatal(
                    "name",
                    format!("frontmatter.name: contains reserved word '{reserved}'"),
                ));
                break;
            }
        }
        if !dir_name.is_empty() && meta.name != dir_name {
            issues.push(fatal(
                "name",
                format!(
                    "frontmatter.name '{}' doesn't match directory '{dir_name}'",
                    meta.name
                ),
            ));
        }
    }

    if meta.description.len() > DESCRIPTION_MAX_LENGTH {
        issues.push(warning(
            "description",
            format!(
                "frontmatter.description: {} chars (max {DESCRIPTION_MAX_LENGTH})",
                meta.description.len()
            ),
        ));
    }
    if meta.description.contains('<') && meta.description.contains('>') {
        issues.push(warning(
            "description",
            "frontmatter.description: contains <xml> tags",
        ));
    }

    if let Some((_, body)) = parse::split_frontmatter(&content) {
        let lines = body.lines().count();
        if lines > SKILL_LINE_THRESHOLD {
            issues.push(warning(
                "lines",
                format!("{SKILL_FILE}: {lines} lines (recommended <={SKILL_LINE_THRESHOLD})"),
            ));
        }
    }

    let unexpected: Vec<String> = parse::frontmatter_keys(&content)
        .into_iter()
        .filter(|k| !ALLOWED_FRONTMATTER_KEYS.contains(&k.as_str()))
        .collect();
    if !unexpected.is_empty() {
        issues.push(warning(
            "frontmatter",
            format!("frontmatter: unexpected key(s): {}", unexpected.join(", ")),
        ));
    }

    issues
}
