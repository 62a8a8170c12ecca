use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::CatalogConfig;

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "skilldock.toml",
    "skilldock.yaml",
    "skilldock.yml",
    "skilldock.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<CatalogConfig, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./skilldock.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/skilldock/skilldock.{toml,yaml,yml,json}` (user-global)
///
/// Returns `CatalogConfig::default()` if no config file is found, then
/// applies `SKILLDOCK_SKILLS_DIR` / `SKILLDOCK_META_DIR` / `GITHUB_TOKEN`
/// environment overrides.
pub fn discover_and_load() -> CatalogConfig {
    let mut cfg = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                CatalogConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        CatalogConfig::default()
    };
    apply_env_overrides(&mut cfg);
    cfg
}

fn apply_env_overrides(cfg: &mut CatalogConfig) {
    if let Ok(dir) = std::env::var("SKILLDOCK_SKILLS_DIR")
        && !dir.is_empty()
    {
        cfg.skills_dir = PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("SKILLDOCK_META_DIR")
        && !dir.is_empty()
    {
        cfg.meta_dir = PathBuf::from(dir);
    }
    if cfg.github_token.is_none()
        && let Ok(token) = std::env::var("GITHUB_TOKEN")
        && !token.is_empty()
    {
        cfg.github_token = Some(token);
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/skilldock/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "skilldock").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user-global data directory.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "skilldock").map(|d| d.data_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<CatalogConfig, String> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| e.to_string()),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(raw).map_err(|e| e.to_string()),
        _ => Err(format!("unsupported config format: .{ext}")),
    }
}
