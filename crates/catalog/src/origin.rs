//! Per-skill provenance ledger.
//!
//! A single JSON map (`skill id -> origin record`) persisted beside the
//! catalog. The ledger is best-effort provenance, not the source of truth
//! for which skills exist — the filesystem is. Loading therefore tolerates
//! a missing or corrupt file by degrading to an empty map with a warning.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use skilldock_config::CatalogConfig;

use crate::{error::Result, types::Origin};

/// Storage interface for origin records.
///
/// Callers depend on this trait so the flat-file backend can be swapped
/// without touching the add/update/remove engines.
pub trait OriginRepository: Send + Sync {
    fn get(&self, skill_id: &str) -> Option<Origin>;
    fn put(&self, skill_id: &str, origin: Origin) -> Result<()>;
    fn delete(&self, skill_id: &str) -> Result<()>;
    fn all(&self) -> BTreeMap<String, Origin>;

    /// Read-modify-write a single record. Returns false when absent.
    fn update_entry(&self, skill_id: &str, apply: &mut dyn FnMut(&mut Origin)) -> Result<bool>;
}

/// Flat-file origin store with atomic whole-file rewrites.
pub struct JsonOriginStore {
    path: PathBuf,
}

impl JsonOriginStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn for_config(config: &CatalogConfig) -> Self {
        Self::new(config.origins_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, Origin> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), %e, "failed to read origin ledger");
                return BTreeMap::new();
            },
        };
        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), %e, "corrupt origin ledger, starting empty");
                BTreeMap::new()
            },
        }
    }

    /// Save atomically via temp file + rename.
    fn save(&self, map: &BTreeMap<String, Origin>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(map)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl OriginRepository for JsonOriginStore {
    fn get(&self, skill_id: &str) -> Option<Origin> {
        self.load().get(skill_id).cloned()
    }

    fn put(&self, skill_id: &str, origin: Origin) -> Result<()> {
        let mut map = self.load();
        map.insert(skill_id.to_string(), origin);
        self.save(&map)
    }

    fn delete(&self, skill_id: &str) -> Result<()> {
        let mut map = self.load();
        if map.remove(skill_id).is_some() {
            self.save(&map)?;
        }
        Ok(())
    }

    fn all(&self) -> BTreeMap<String, Origin> {
        self.load()
    }

    fn update_entry(&self, skill_id: &str, apply: &mut dyn FnMut(&mut Origin)) -> Result<bool> {
        let mut map = self.load();
        let Some(origin) = map.get_mut(skill_id) else {
            return Ok(false);
        };
        apply(origin);
        self.save(&map)?;
        Ok(true)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::{HistoryEntry, SourceKind},
    };

    fn store(tmp: &Path) -> JsonOriginStore {
        JsonOriginStore::new(tmp.join("meta/origins.json"))
    }

    #[test]
    fn missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(store(tmp.path()).all().is_empty());
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        std::fs::create_dir_all(tmp.path().join("meta")).unwrap();
        std::fs::write(s.path(), "{ not json").unwrap();
        assert!(s.all().is_empty());
        assert!(s.get("anything").is_none());
    }

    #[test]
    fn record_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());

        let mut origin = Origin::new("https://github.com/o/r", SourceKind::Github);
        origin.git_ref = Some("main".into());
        origin.content_hash = "sha256:abc".into();
        s.put("my-skill", origin).unwrap();

        let loaded = s.get("my-skill").unwrap();
        assert_eq!(loaded.kind, SourceKind::Github);
        assert_eq!(loaded.git_ref.as_deref(), Some("main"));
        assert_eq!(loaded.content_hash, "sha256:abc");

        s.delete("my-skill").unwrap();
        assert!(s.get("my-skill").is_none());
        // Deleting a missing id is a no-op.
        s.delete("my-skill").unwrap();
    }

    #[test]
    fn update_entry_appends_history() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        s.put("skill", Origin::new("/src", SourceKind::Local)).unwrap();

        let found = s
            .update_entry("skill", &mut |o| {
                o.content_hash = "sha256:new".into();
                o.history.push(HistoryEntry {
                    from_commit: "aaaaaaa".into(),
                    to_commit: "bbbbbbb".into(),
                    updated_at: chrono::Utc::now(),
                });
            })
            .unwrap();
        assert!(found);

        let loaded = s.get("skill").unwrap();
        assert_eq!(loaded.content_hash, "sha256:new");
        assert_eq!(loaded.history.len(), 1);

        assert!(!s.update_entry("absent", &mut |_| {}).unwrap());
    }

    #[test]
    fn ref_field_serializes_as_ref() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        let mut origin = Origin::new("https://github.com/o/r", SourceKind::Github);
        origin.git_ref = Some("main".into());
        s.put("skill", origin).unwrap();

        let raw = std::fs::read_to_string(s.path()).unwrap();
        assert!(raw.contains("\"ref\": \"main\""));
        assert!(raw.contains("\"kind\": \"github\""));
    }
}
