//! Skill catalog synchronization engine.
//!
//! Skills are directories containing a `SKILL.md` file with YAML frontmatter
//! and markdown instructions. This crate resolves install sources (builtin,
//! local directory, GitHub URL, zip archive), fetches and safely extracts
//! archives, hashes content, reconciles add/update/remove operations against
//! recorded provenance, and decides search-index staleness.

pub mod add;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod github;
pub mod hash;
pub mod origin;
pub mod parse;
pub mod remove;
pub mod source;
pub mod state;
pub mod types;
pub mod update;
pub mod validate;

pub use {
    add::{AddOptions, add_skill},
    error::{Error, Result},
    github::GithubClient,
    origin::{JsonOriginStore, OriginRepository},
    remove::remove_skill,
    state::{EmbeddingSignature, IndexStateStore, ReindexDecision, ReindexReason},
    types::{
        AddReport, Origin, RemoveReport, ResolvedSource, SkillInfo, SourceKind, UpdateCheck,
        UpdateOutcome, UpdateReport,
    },
    update::{UpdateOptions, check_update, detect_local_modification, update_all, update_skill},
};
