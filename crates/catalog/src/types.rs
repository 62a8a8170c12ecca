use std::path::PathBuf;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

// ── Sources ──────────────────────────────────────────────────────────────────

/// Classified kind of an install source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Shipped with the catalog (name table lookup).
    Builtin,
    /// A directory on the local filesystem.
    Local,
    /// A `https://github.com/...` repository URL.
    Github,
    /// A `.zip` archive on the local filesystem.
    Zip,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Builtin => write!(f, "builtin"),
            Self::Local => write!(f, "local"),
            Self::Github => write!(f, "github"),
            Self::Zip => write!(f, "zip"),
        }
    }
}

/// A source string after classification. Produced once per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub kind: SourceKind,
    /// Builtin name, canonical local path, URL, or zip path.
    pub resolved: String,
}

/// A detected skill directory before installation.
///
/// `name` comes from the skill's declared frontmatter identity, falling back
/// to the directory name when the frontmatter omits it.
#[derive(Debug, Clone)]
pub struct SkillInfo {
    pub name: String,
    pub source_path: PathBuf,
}

// ── Origin records ───────────────────────────────────────────────────────────

/// Provenance of an installed skill, keyed by skill id in the origin ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Origin {
    pub source: String,
    pub kind: SourceKind,
    /// Git ref the skill was fetched at (github sources).
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Source-relative subpath of the skill directory.
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    /// Content-only hash recorded at install/update time.
    #[serde(default)]
    pub content_hash: String,
    /// Archive mtime in nanoseconds (zip sources).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mtime: Option<u64>,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
}

impl Origin {
    /// Fresh record for a just-installed skill.
    pub fn new(source: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            source: source.into(),
            kind,
            git_ref: None,
            path: String::new(),
            commit_sha: None,
            content_hash: String::new(),
            source_mtime: None,
            added_at: Utc::now(),
            updated_at: None,
            history: Vec::new(),
        }
    }
}

/// One applied update in an origin's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub from_commit: String,
    pub to_commit: String,
    pub updated_at: DateTime<Utc>,
}

// ── Operation reports ────────────────────────────────────────────────────────
//
// Expected outcomes (exists, local modifications, nothing found) are report
// states, never `Err`: callers branch on enumerated results.

/// Per-skill outcome within a batch add.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddDetail {
    pub skill_id: String,
    pub success: bool,
    pub message: String,
}

/// Aggregate outcome of an add operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddReport {
    pub success: bool,
    /// Single added id, or comma-joined ids for multi-adds. Empty on failure.
    pub skill_id: String,
    pub message: String,
    pub added: Vec<String>,
    pub skipped: Vec<String>,
    pub details: Vec<AddDetail>,
}

impl AddReport {
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Enumerated outcome of reconciling one skill against its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Installed content already matches the source.
    UpToDate,
    Updated {
        from_commit: String,
        to_commit: String,
    },
    /// Dry-run: the transition that would be applied.
    WouldUpdate {
        from_commit: String,
        to_commit: String,
    },
    /// Local modifications present and `force` not given.
    Blocked,
    /// No origin, builtin, or a kind with no update path.
    NotUpdatable { reason: String },
    Failed { reason: String },
}

/// Per-skill outcome within an update run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDetail {
    pub skill_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub from_commit: String,
    #[serde(default)]
    pub to_commit: String,
}

/// Aggregate outcome of an update operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReport {
    pub success: bool,
    pub skill_id: String,
    pub message: String,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
    /// Set when an update was refused because the installed copy differs
    /// from what was recorded at install time.
    pub local_modified: bool,
    pub details: Vec<UpdateDetail>,
}

impl UpdateReport {
    #[must_use]
    pub fn failure(skill_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            skill_id: skill_id.into(),
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Outcome of a remove operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveReport {
    pub success: bool,
    pub skill_id: String,
    pub message: String,
}

/// Non-mutating update availability probe.
#[derive(Debug, Clone)]
pub struct UpdateCheck {
    pub available: bool,
    pub reason: String,
    /// Short identifier of the newer content, when known.
    pub new_commit: String,
}
