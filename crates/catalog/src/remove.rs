//! Remove engine: delete installed skills and their provenance.

use std::path::Component;

use skilldock_config::CatalogConfig;

use crate::{origin::OriginRepository, types::RemoveReport};

/// Remove an installed skill by id.
///
/// The directory is removed first, then the origin record, so the ledger
/// never references an id whose directory removal failed. Expected outcomes
/// (unknown id, bad id) are reported, not raised.
pub fn remove_skill(
    skill_id: &str,
    config: &CatalogConfig,
    origins: &dyn OriginRepository,
) -> RemoveReport {
    if !is_valid_skill_id(skill_id) {
        return RemoveReport {
            success: false,
            skill_id: skill_id.to_string(),
            message: format!("invalid skill id: '{skill_id}'"),
        };
    }

    let dest = config.skills_dir.join(skill_id);
    if !dest.exists() {
        return RemoveReport {
            success: false,
            skill_id: skill_id.to_string(),
            message: format!("skill '{skill_id}' not found"),
        };
    }

    if let Err(e) = std::fs::remove_dir_all(&dest) {
        return RemoveReport {
            success: false,
            skill_id: skill_id.to_string(),
            message: format!("failed to remove '{skill_id}': {e}"),
        };
    }

    if let Err(e) = origins.delete(skill_id) {
        tracing::warn!(%skill_id, %e, "failed to delete origin record");
    }

    // Prune a now-empty namespace directory.
    if skill_id.contains('/')
        && let Some(parent) = dest.parent()
        && std::fs::read_dir(parent).is_ok_and(|mut d| d.next().is_none())
    {
        let _ = std::fs::remove_dir(parent);
    }

    tracing::info!(%skill_id, "removed skill");
    RemoveReport {
        success: true,
        skill_id: skill_id.to_string(),
        message: format!("removed '{skill_id}'"),
    }
}

/// A skill id is `name` or `namespace/name`: relative, no traversal, at most
/// one separator.
fn is_valid_skill_id(skill_id: &str) -> bool {
    if skill_id.is_empty() || skill_id.contains('\\') || skill_id.matches('/').count() > 1 {
        return false;
    }
    let path = std::path::Path::new(skill_id);
    path.components()
        .all(|c| matches!(c, Component::Normal(n) if !n.to_string_lossy().starts_with('.')))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            origin::JsonOriginStore,
            types::{Origin, SourceKind},
        },
        skilldock_config::CatalogConfig,
    };

    fn setup(tmp: &std::path::Path) -> (CatalogConfig, JsonOriginStore) {
        let config = CatalogConfig::rooted_at(tmp);
        let origins = JsonOriginStore::for_config(&config);
        (config, origins)
    }

    fn install(config: &CatalogConfig, origins: &JsonOriginStore, id: &str) {
        let dir = config.skills_dir.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), "---\nname: x\n---\nb\n").unwrap();
        origins.put(id, Origin::new("/src", SourceKind::Local)).unwrap();
    }

    #[test]
    fn removes_directory_and_origin() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, origins) = setup(tmp.path());
        install(&config, &origins, "my-skill");

        let report = remove_skill("my-skill", &config, &origins);
        assert!(report.success);
        assert!(!config.skills_dir.join("my-skill").exists());
        assert!(origins.get("my-skill").is_none());
    }

    #[test]
    fn prunes_empty_namespace_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, origins) = setup(tmp.path());
        install(&config, &origins, "ns/my-skill");

        let report = remove_skill("ns/my-skill", &config, &origins);
        assert!(report.success);
        assert!(!config.skills_dir.join("ns").exists());
    }

    #[test]
    fn keeps_namespace_dir_with_siblings() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, origins) = setup(tmp.path());
        install(&config, &origins, "ns/a");
        install(&config, &origins, "ns/b");

        assert!(remove_skill("ns/a", &config, &origins).success);
        assert!(config.skills_dir.join("ns/b").is_dir());
    }

    #[test]
    fn unknown_id_is_reported_not_raised() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, origins) = setup(tmp.path());
        let report = remove_skill("absent", &config, &origins);
        assert!(!report.success);
        assert!(report.message.contains("not found"));
    }

    #[test]
    fn traversal_ids_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, origins) = setup(tmp.path());
        for id in ["../escape", "a/../b", "/abs", "", ".hidden", "a/b/c"] {
            let report = remove_skill(id, &config, &origins);
            assert!(!report.success, "id {id:?} should be rejected");
            assert!(report.message.contains("invalid skill id"));
        }
    }
}
