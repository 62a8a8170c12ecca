//! Search-index staleness tracking.
//!
//! The search engine consumes exactly one interface from the catalog core:
//! [`IndexStateStore::should_reindex`]. The decision is driven by the
//! metadata-sensitive directory-state hash, so even touch-only changes to a
//! skill trigger a rebuild rather than risk serving a stale index.

use std::path::{Path, PathBuf};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{
    error::Result,
    hash::{self, DirState},
};

/// Identity of the embedding setup an index was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSignature {
    pub embedding_provider: String,
    pub embedding_model: String,
}

/// Snapshot of what an index was (or would be) built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexState {
    pub schema_version: String,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub skills_hash: String,
    pub skill_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

/// Why a reindex is (or is not) needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexReason {
    Force,
    SkipAuto,
    NoState,
    SchemaChanged,
    ProviderChanged,
    ModelChanged,
    HashChanged,
    Unchanged,
}

impl std::fmt::Display for ReindexReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Force => "force",
            Self::SkipAuto => "skip_auto",
            Self::NoState => "no_state",
            Self::SchemaChanged => "schema_changed",
            Self::ProviderChanged => "provider_changed",
            Self::ModelChanged => "model_changed",
            Self::HashChanged => "hash_changed",
            Self::Unchanged => "unchanged",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a staleness check.
#[derive(Debug, Clone)]
pub struct ReindexDecision {
    pub need: bool,
    pub reason: ReindexReason,
    /// The state a rebuild would persist.
    pub state: IndexState,
    /// The previously persisted state, when readable.
    pub previous: Option<IndexState>,
}

/// Persistence and change detection for index state.
pub struct IndexStateStore {
    schema_version: String,
    state_path: PathBuf,
}

impl IndexStateStore {
    pub fn new(schema_version: impl Into<String>, state_path: PathBuf) -> Self {
        Self {
            schema_version: schema_version.into(),
            state_path,
        }
    }

    /// State computed from the skills directory as it is right now.
    pub fn build_current_state(
        &self,
        skills_dir: &Path,
        signature: &EmbeddingSignature,
    ) -> IndexState {
        let DirState { hash, count } = hash::state_hash(skills_dir);
        IndexState {
            schema_version: self.schema_version.clone(),
            embedding_provider: signature.embedding_provider.clone(),
            embedding_model: signature.embedding_model.clone(),
            skills_hash: hash,
            skill_count: count,
            built_at: None,
            skills_dir: None,
            db_path: None,
        }
    }

    /// Decide whether the index must be rebuilt.
    ///
    /// Checks run in a fixed order: force, skip_auto, missing state, schema
    /// version, embedding provider, embedding model, skills hash.
    pub fn should_reindex(
        &self,
        skills_dir: &Path,
        signature: &EmbeddingSignature,
        force: bool,
        skip_auto: bool,
    ) -> ReindexDecision {
        let state = self.build_current_state(skills_dir, signature);
        let previous = self.load_state();

        let (need, reason) = if force {
            (true, ReindexReason::Force)
        } else if skip_auto {
            (false, ReindexReason::SkipAuto)
        } else {
            match &previous {
                None => (true, ReindexReason::NoState),
                Some(prev) if prev.schema_version != self.schema_version => {
                    (true, ReindexReason::SchemaChanged)
                },
                Some(prev) if prev.embedding_provider != signature.embedding_provider => {
                    (true, ReindexReason::ProviderChanged)
                },
                Some(prev) if prev.embedding_model != signature.embedding_model => {
                    (true, ReindexReason::ModelChanged)
                },
                Some(prev) if prev.skills_hash != state.skills_hash => {
                    (true, ReindexReason::HashChanged)
                },
                Some(_) => (false, ReindexReason::Unchanged),
            }
        };

        ReindexDecision {
            need,
            reason,
            state,
            previous,
        }
    }

    /// Persist a state snapshot after a successful rebuild.
    pub fn persist(&self, state: &IndexState, skills_dir: &Path, db_path: &Path) -> Result<()> {
        let mut payload = state.clone();
        payload.built_at = Some(Utc::now());
        payload.skills_dir = Some(skills_dir.to_path_buf());
        payload.db_path = Some(db_path.to_path_buf());

        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.state_path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&payload)?)?;
        std::fs::rename(&tmp, &self.state_path)?;
        Ok(())
    }

    fn load_state(&self) -> Option<IndexState> {
        if !self.state_path.exists() {
            return None;
        }
        let raw = match std::fs::read_to_string(&self.state_path) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %self.state_path.display(), %e, "failed to read index state");
                return None;
            },
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(path = %self.state_path.display(), %e, "corrupt index state, forcing rebuild");
                None
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn signature() -> EmbeddingSignature {
        EmbeddingSignature {
            embedding_provider: "none".into(),
            embedding_model: "bm25".into(),
        }
    }

    fn setup(tmp: &Path) -> (IndexStateStore, PathBuf) {
        let skills_dir = tmp.join("skills");
        let demo = skills_dir.join("demo");
        std::fs::create_dir_all(&demo).unwrap();
        std::fs::write(demo.join("SKILL.md"), "---\nname: demo\n---\nbody\n").unwrap();
        (
            IndexStateStore::new("v3", tmp.join("meta/index-state.json")),
            skills_dir,
        )
    }

    #[test]
    fn first_run_then_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, skills_dir) = setup(tmp.path());

        let decision = store.should_reindex(&skills_dir, &signature(), false, false);
        assert!(decision.need);
        assert_eq!(decision.reason, ReindexReason::NoState);
        assert_eq!(decision.state.skill_count, 1);

        store
            .persist(&decision.state, &skills_dir, &tmp.path().join("db"))
            .unwrap();

        let again = store.should_reindex(&skills_dir, &signature(), false, false);
        assert!(!again.need);
        assert_eq!(again.reason, ReindexReason::Unchanged);
        assert!(again.previous.unwrap().built_at.is_some());
    }

    #[test]
    fn content_change_triggers_hash_changed() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, skills_dir) = setup(tmp.path());
        let decision = store.should_reindex(&skills_dir, &signature(), false, false);
        store
            .persist(&decision.state, &skills_dir, &tmp.path().join("db"))
            .unwrap();

        std::fs::write(
            skills_dir.join("demo/SKILL.md"),
            "---\nname: demo\n---\nbody changed\n",
        )
        .unwrap();

        let decision = store.should_reindex(&skills_dir, &signature(), false, false);
        assert!(decision.need);
        assert_eq!(decision.reason, ReindexReason::HashChanged);
    }

    #[test]
    fn force_and_skip_auto_take_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, skills_dir) = setup(tmp.path());
        let decision = store.should_reindex(&skills_dir, &signature(), false, false);
        store
            .persist(&decision.state, &skills_dir, &tmp.path().join("db"))
            .unwrap();

        let forced = store.should_reindex(&skills_dir, &signature(), true, false);
        assert!(forced.need);
        assert_eq!(forced.reason, ReindexReason::Force);

        let skipped = store.should_reindex(&skills_dir, &signature(), false, true);
        assert!(!skipped.need);
        assert_eq!(skipped.reason, ReindexReason::SkipAuto);
    }

    #[test]
    fn signature_changes_are_detected_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, skills_dir) = setup(tmp.path());
        let decision = store.should_reindex(&skills_dir, &signature(), false, false);
        store
            .persist(&decision.state, &skills_dir, &tmp.path().join("db"))
            .unwrap();

        let provider = EmbeddingSignature {
            embedding_provider: "openai".into(),
            embedding_model: "bm25".into(),
        };
        assert_eq!(
            store
                .should_reindex(&skills_dir, &provider, false, false)
                .reason,
            ReindexReason::ProviderChanged
        );

        let model = EmbeddingSignature {
            embedding_provider: "none".into(),
            embedding_model: "other-model".into(),
        };
        assert_eq!(
            store.should_reindex(&skills_dir, &model, false, false).reason,
            ReindexReason::ModelChanged
        );

        let other_schema = IndexStateStore::new("v4", tmp.path().join("meta/index-state.json"));
        assert_eq!(
            other_schema
                .should_reindex(&skills_dir, &signature(), false, false)
                .reason,
            ReindexReason::SchemaChanged
        );
    }

    #[test]
    fn corrupt_state_degrades_to_no_state() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, skills_dir) = setup(tmp.path());
        std::fs::create_dir_all(tmp.path().join("meta")).unwrap();
        std::fs::write(tmp.path().join("meta/index-state.json"), "{ nope").unwrap();

        let decision = store.should_reindex(&skills_dir, &signature(), false, false);
        assert!(decision.need);
        assert_eq!(decision.reason, ReindexReason::NoState);
    }
}
