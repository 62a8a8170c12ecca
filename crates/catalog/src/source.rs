//! Source classification and GitHub URL parsing.

use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    types::{ResolvedSource, SourceKind},
};

/// Built-in skill templates shipped with the catalog.
pub const BUILTIN_SKILLS: &[(&str, &str)] = &[
    (
        "hello-world",
        "---\n\
name: hello-world\n\
description: A simple hello world skill for verifying the catalog works.\n\
metadata:\n\
  skilldock:\n\
    category: examples\n\
    tags: [hello, test, demo]\n\
---\n\
# Hello World Skill\n\
\n\
This is a sample skill to verify your installation is working.\n\
\n\
## Usage\n\
\n\
When the user asks to test the catalog or says \"hello\", respond with a\n\
friendly greeting and confirm that the skill system is operational.\n\
\n\
## Example Response\n\
\n\
\"Hello! The hello-world skill is working correctly.\"\n",
    ),
    (
        "template",
        "---\n\
name: template\n\
description: Replace this with a description of what your skill does.\n\
metadata:\n\
  skilldock:\n\
    category: custom\n\
    tags: [template, starter]\n\
---\n\
# My Custom Skill\n\
\n\
Replace this content with instructions for the agent.\n\
\n\
## When to Use\n\
\n\
Describe the situations when this skill should be activated.\n\
\n\
## Instructions\n\
\n\
1. Step one...\n\
2. Step two...\n\
3. Step three...\n\
\n\
## Examples\n\
\n\
Provide example inputs and expected outputs.\n",
    ),
];

/// Definition content for a builtin skill name.
pub fn builtin_skill(name: &str) -> Option<&'static str> {
    BUILTIN_SKILLS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, content)| *content)
}

/// Classify a source string.
///
/// Decision order: builtin name table, `https://github.com/` URL, existing
/// `.zip` file, existing local directory. Anything else fails closed.
pub fn resolve_source(source: &str) -> Result<ResolvedSource> {
    if source.is_empty() {
        return Err(Error::invalid_source("source is required"));
    }

    if builtin_skill(source).is_some() {
        return Ok(ResolvedSource {
            kind: SourceKind::Builtin,
            resolved: source.to_string(),
        });
    }

    if source.starts_with("https://github.com/") {
        return Ok(ResolvedSource {
            kind: SourceKind::Github,
            resolved: source.to_string(),
        });
    }

    let candidate = expand_tilde(source);
    if candidate.exists() {
        let candidate = candidate.canonicalize().unwrap_or(candidate);
        if candidate.is_dir() {
            return Ok(ResolvedSource {
                kind: SourceKind::Local,
                resolved: candidate.display().to_string(),
            });
        }
        if candidate
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
        {
            return Ok(ResolvedSource {
                kind: SourceKind::Zip,
                resolved: candidate.display().to_string(),
            });
        }
        return Err(Error::invalid_source(format!(
            "source is not a directory or zip file: {}",
            candidate.display()
        )));
    }

    Err(Error::source_not_found(source))
}

fn expand_tilde(source: &str) -> PathBuf {
    if let Some(rest) = source.strip_prefix("~/")
        && let Some(home) = std::env::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(source)
}

// ── GitHub URLs ──────────────────────────────────────────────────────────────

/// Parsed `https://github.com/<owner>/<repo>[/tree/<ref>[/<subpath>]]` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubSource {
    pub owner: String,
    pub repo: String,
    /// Ref from the URL; `None` means "use the repository's default branch".
    pub git_ref: Option<String>,
    /// Repo-relative subpath, no leading slash, empty for the repo root.
    pub path: String,
}

impl GithubSource {
    /// Label used as the default namespace for multi-skill installs:
    /// the last subpath component, or the repository name.
    pub fn source_label(&self) -> String {
        self.path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(&self.repo)
            .to_string()
    }
}

/// Parse and sanitize a GitHub URL.
///
/// Any `..` path segment fails closed before a network call is made.
pub fn parse_github_url(url: &str) -> Result<GithubSource> {
    let invalid = || {
        Error::invalid_source(
            "unsupported GitHub URL; use https://github.com/<owner>/<repo>[/tree/<ref>/<path>]",
        )
    };

    let rest = url
        .trim()
        .trim_end_matches('/')
        .strip_prefix("https://github.com/")
        .ok_or_else(invalid)?;

    let mut segments = rest.split('/');
    let owner = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let repo = segments
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches(".git"))
        .filter(|s| !s.is_empty())
        .ok_or_else(invalid)?;

    let tail: Vec<&str> = segments.collect();
    let (git_ref, path_segments) = match tail.split_first() {
        None => (None, &[][..]),
        Some((&"tree", rest)) => {
            let (r, path) = rest.split_first().ok_or_else(invalid)?;
            (Some(r.to_string()), path)
        },
        Some(_) => return Err(invalid()),
    };

    if path_segments.iter().any(|s| *s == "..") || owner == ".." || repo == ".." {
        return Err(Error::invalid_source("path traversal detected in URL"));
    }

    Ok(GithubSource {
        owner: owner.to_string(),
        repo: repo.to_string(),
        git_ref,
        path: path_segments.join("/"),
    })
}

/// Label for a local source path: its directory name.
pub fn local_source_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "local".to_string())
}
