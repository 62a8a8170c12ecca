//! Config schema types for the skill catalog.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Ceilings enforced while downloading and extracting archives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchLimits {
    /// Maximum tarball download size in bytes.
    pub max_download_bytes: u64,
    /// Maximum size of a single extracted file in bytes.
    pub max_file_bytes: u64,
    /// Maximum cumulative extracted size per archive in bytes.
    pub max_extracted_bytes: u64,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_download_bytes: 200_000_000,
            max_file_bytes: 5_000_000,
            max_extracted_bytes: 10_000_000,
        }
    }
}

/// Catalog configuration.
///
/// A plain value: components take `&CatalogConfig` in their constructors,
/// so tests build isolated instances without touching the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Root directory holding installed skills (`name/` or `namespace/name/`).
    pub skills_dir: PathBuf,
    /// Directory holding catalog metadata (`origins.json`, index state).
    pub meta_dir: PathBuf,
    /// Token for GitHub API requests (private repos, rate limits).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    /// Network timeout for fetch operations, in seconds.
    pub fetch_timeout_secs: u64,
    pub limits: FetchLimits,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let data = data_root();
        Self {
            skills_dir: data.join("skills"),
            meta_dir: data.join("meta"),
            github_token: None,
            fetch_timeout_secs: 60,
            limits: FetchLimits::default(),
        }
    }
}

impl CatalogConfig {
    /// Config rooted at a single base directory. Used by tests and embedders.
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            skills_dir: base.join("skills"),
            meta_dir: base.join("meta"),
            ..Self::default()
        }
    }

    /// Path of the origin ledger file.
    pub fn origins_path(&self) -> PathBuf {
        self.meta_dir.join("origins.json")
    }

    /// Path of the search-index state file.
    pub fn index_state_path(&self) -> PathBuf {
        self.meta_dir.join("index-state.json")
    }
}

fn data_root() -> PathBuf {
    directories::ProjectDirs::from("", "", "skilldock")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".skilldock"))
}
