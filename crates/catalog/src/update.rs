//! Update reconciler: compare installed skills against their recorded
//! sources and apply or refuse updates.
//!
//! Checking is cheap by design: local sources are re-hashed, GitHub sources
//! are compared via the remote tree digest. A full archive fetch happens
//! only in the apply phase. Local edits are never silently discarded — an
//! update over modified content requires `force`.

use std::path::{Path, PathBuf};

use {chrono::Utc, skilldock_config::CatalogConfig};

use crate::{
    add, detect,
    detect::SKILL_FILE,
    fetch,
    github::GithubClient,
    hash,
    origin::OriginRepository,
    source,
    types::{
        HistoryEntry, Origin, SourceKind, UpdateCheck, UpdateDetail, UpdateOutcome, UpdateReport,
    },
};

/// Caller-tunable update behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Overwrite local modifications.
    pub force: bool,
    /// Report the intended transition without mutating anything.
    pub dry_run: bool,
}

/// Short display form of a commit SHA or tagged hash.
fn short(value: &str) -> String {
    let hex = value.split_once(':').map_or(value, |(_, h)| h);
    hex.chars().take(7).collect()
}

/// True when the installed copy differs from the hash recorded at
/// install/update time. Missing origin or missing stored hash means "cannot
/// tell", reported as unmodified.
pub fn detect_local_modification(
    skill_id: &str,
    config: &CatalogConfig,
    origins: &dyn OriginRepository,
) -> bool {
    let Some(origin) = origins.get(skill_id) else {
        return false;
    };
    if origin.content_hash.is_empty() {
        return false;
    }
    let (current, _) = hash::content_hash(&config.skills_dir.join(skill_id));
    origin.content_hash != current
}

/// Non-mutating probe: is newer content available for this skill?
pub async fn check_update(
    skill_id: &str,
    config: &CatalogConfig,
    github: &GithubClient,
    origins: &dyn OriginRepository,
) -> UpdateCheck {
    let unavailable = |reason: String| UpdateCheck {
        available: false,
        reason,
        new_commit: String::new(),
    };

    let Some(origin) = origins.get(skill_id) else {
        return unavailable("no origin info (cannot update)".to_string());
    };

    match origin.kind {
        SourceKind::Builtin => unavailable("built-in skill cannot be updated".to_string()),
        SourceKind::Zip => {
            unavailable("zip sources cannot be checked; re-add from the archive".to_string())
        },
        SourceKind::Local | SourceKind::Github => {
            let (source_hash, source_reason) =
                source_hash(&origin, skill_id, github, origins).await;
            if let Some(reason) = source_reason {
                return unavailable(reason);
            }
            let (installed_hash, installed_reason) =
                hash::content_hash(&config.skills_dir.join(skill_id));
            if let Some(reason) = installed_reason {
                return unavailable(format!("installed skill unreadable: {reason}"));
            }
            if source_hash == installed_hash {
                return unavailable("already at latest content".to_string());
            }
            UpdateCheck {
                available: true,
                reason: if origin.kind == SourceKind::Github {
                    "remote content differs".to_string()
                } else {
                    "local source changed".to_string()
                },
                new_commit: short(&source_hash),
            }
        },
    }
}

/// Source-side hash for an origin, dispatched by kind.
/// Returns `(hash, reason)`; a reason means "treat as unknown".
async fn source_hash(
    origin: &Origin,
    skill_id: &str,
    github: &GithubClient,
    origins: &dyn OriginRepository,
) -> (String, Option<String>) {
    match origin.kind {
        SourceKind::Local => match local_source_path(origin, skill_id) {
            Ok(path) => hash::content_hash(&path),
            Err(reason) => (String::new(), Some(reason)),
        },
        SourceKind::Github => github_source_hash(origin, skill_id, github, origins).await,
        kind => (String::new(), Some(format!("origin kind '{kind}' has no source hash"))),
    }
}

/// Resolve the skill directory within a local source.
///
/// The source can be a container directory with the skill inside, or the
/// skill directory itself.
fn resolve_local_skill_path(source_base: &Path, skill_id: &str) -> Option<PathBuf> {
    let tail = skill_id.rsplit('/').next().unwrap_or(skill_id);
    [
        source_base.join(skill_id),
        source_base.join(tail),
        source_base.to_path_buf(),
    ]
    .into_iter()
    .find(|candidate| candidate.join(SKILL_FILE).exists())
}

fn local_source_path(origin: &Origin, skill_id: &str) -> Result<PathBuf, String> {
    let base = Path::new(&origin.source);
    if !base.exists() {
        return Err(format!("source path not found: {}", base.display()));
    }
    if !base.is_dir() {
        return Err(format!("source is not a directory: {}", base.display()));
    }

    if !origin.path.is_empty() {
        let candidate = base.join(&origin.path);
        if candidate.join(SKILL_FILE).exists() {
            return Ok(candidate);
        }
    }
    resolve_local_skill_path(base, skill_id)
        .ok_or_else(|| format!("could not find skill in source: {}", base.display()))
}

/// Remote digest for a GitHub origin via the tree API — no download.
///
/// When the recorded path points at a parent directory, the probe narrows to
/// `<path>/<name>` and persists the narrowed path on success.
async fn github_source_hash(
    origin: &Origin,
    skill_id: &str,
    github: &GithubClient,
    origins: &dyn OriginRepository,
) -> (String, Option<String>) {
    if origin.source.is_empty() {
        return (String::new(), Some("missing source URL".to_string()));
    }
    let parsed = match source::parse_github_url(&origin.source) {
        Ok(p) => p,
        Err(e) => return (String::new(), Some(e.to_string())),
    };

    let git_ref = match &parsed.git_ref {
        Some(r) => r.clone(),
        None => github.default_branch(&parsed.owner, &parsed.repo).await,
    };

    let path = if !origin.path.is_empty() {
        origin.path.clone()
    } else if !parsed.path.is_empty() {
        parsed.path.clone()
    } else {
        skill_id.rsplit('/').next().unwrap_or(skill_id).to_string()
    };

    let mut remote = github
        .tree_digest(&parsed.owner, &parsed.repo, &git_ref, &path)
        .await;

    if remote.is_none() || path == parsed.path {
        let tail = skill_id.rsplit('/').next().unwrap_or(skill_id);
        let candidate = [parsed.path.as_str(), tail]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");
        if candidate != path
            && let Some(alt) = github
                .tree_digest(&parsed.owner, &parsed.repo, &git_ref, &candidate)
                .await
        {
            remote = Some(alt);
            let narrowed = candidate.clone();
            if let Err(e) = origins.update_entry(skill_id, &mut |o| o.path = narrowed.clone()) {
                tracing::warn!(%skill_id, %e, "failed to persist narrowed origin path");
            }
        }
    }

    // Root-level single-skill repos record the skill name as their path even
    // though the content sits at the repository root; fall back to the URL
    // subpath before treating the remote as unknown.
    if remote.is_none() && path != parsed.path {
        remote = github
            .tree_digest(&parsed.owner, &parsed.repo, &git_ref, &parsed.path)
            .await;
    }

    match remote {
        Some(h) => (h, None),
        None => (
            String::new(),
            Some("could not fetch remote tree (treated as unknown)".to_string()),
        ),
    }
}

/// Reconcile one skill against its source.
pub async fn reconcile_skill(
    skill_id: &str,
    config: &CatalogConfig,
    github: &GithubClient,
    origins: &dyn OriginRepository,
    opts: UpdateOptions,
) -> UpdateOutcome {
    if !config.skills_dir.join(skill_id).exists() {
        return UpdateOutcome::NotUpdatable {
            reason: format!("skill '{skill_id}' not found"),
        };
    }
    let Some(origin) = origins.get(skill_id) else {
        return UpdateOutcome::NotUpdatable {
            reason: format!("skill '{skill_id}' has no origin info (cannot update)"),
        };
    };

    match origin.kind {
        SourceKind::Builtin => UpdateOutcome::NotUpdatable {
            reason: "built-in skill cannot be updated".to_string(),
        },
        SourceKind::Zip => UpdateOutcome::NotUpdatable {
            reason: "zip sources cannot be updated; re-add from the archive".to_string(),
        },
        SourceKind::Local => update_from_local(skill_id, &origin, config, origins, opts),
        SourceKind::Github => {
            update_from_github(skill_id, &origin, config, github, origins, opts).await
        },
    }
}

/// Update a single skill, reported in the aggregate shape.
pub async fn update_skill(
    skill_id: &str,
    config: &CatalogConfig,
    github: &GithubClient,
    origins: &dyn OriginRepository,
    opts: UpdateOptions,
) -> UpdateReport {
    let outcome = reconcile_skill(skill_id, config, github, origins, opts).await;
    report_from_outcome(skill_id, &outcome)
}

fn report_from_outcome(skill_id: &str, outcome: &UpdateOutcome) -> UpdateReport {
    let id = skill_id.to_string();
    match outcome {
        UpdateOutcome::UpToDate => UpdateReport {
            success: true,
            skill_id: id.clone(),
            message: "already up to date".to_string(),
            skipped: vec![id],
            ..UpdateReport::default()
        },
        UpdateOutcome::Updated {
            from_commit,
            to_commit,
        } => UpdateReport {
            success: true,
            skill_id: id.clone(),
            message: format!("updated ({from_commit} -> {to_commit})"),
            updated: vec![id.clone()],
            details: vec![UpdateDetail {
                skill_id: id,
                success: true,
                message: "updated".to_string(),
                from_commit: from_commit.clone(),
                to_commit: to_commit.clone(),
            }],
            ..UpdateReport::default()
        },
        UpdateOutcome::WouldUpdate {
            from_commit,
            to_commit,
        } => UpdateReport {
            success: true,
            skill_id: id.clone(),
            message: format!("would update ({from_commit} -> {to_commit})"),
            updated: vec![id.clone()],
            details: vec![UpdateDetail {
                skill_id: id,
                success: true,
                message: "would update".to_string(),
                from_commit: from_commit.clone(),
                to_commit: to_commit.clone(),
            }],
            ..UpdateReport::default()
        },
        UpdateOutcome::Blocked => UpdateReport {
            skill_id: id,
            message: "local modifications detected; use force to overwrite".to_string(),
            local_modified: true,
            ..UpdateReport::default()
        },
        UpdateOutcome::NotUpdatable { reason } | UpdateOutcome::Failed { reason } => {
            UpdateReport::failure(id, reason.clone())
        },
    }
}

fn update_from_local(
    skill_id: &str,
    origin: &Origin,
    config: &CatalogConfig,
    origins: &dyn OriginRepository,
    opts: UpdateOptions,
) -> UpdateOutcome {
    let source_path = match local_source_path(origin, skill_id) {
        Ok(p) => p,
        Err(reason) => return UpdateOutcome::Failed { reason },
    };

    // Self-heal an origin recorded without a path.
    if origin.path.is_empty()
        && let Ok(rel) = source_path.strip_prefix(Path::new(&origin.source))
    {
        let rel = rel.to_string_lossy().replace('\\', "/");
        if !rel.is_empty()
            && let Err(e) = origins.update_entry(skill_id, &mut |o| o.path = rel.clone())
        {
            tracing::warn!(%skill_id, %e, "failed to persist resolved origin path");
        }
    }

    let (source_hash, source_reason) = hash::content_hash(&source_path);
    if let Some(reason) = source_reason {
        return UpdateOutcome::Failed {
            reason: format!("source not readable: {reason}"),
        };
    }
    let dest = config.skills_dir.join(skill_id);
    let (current_hash, current_reason) = hash::content_hash(&dest);
    if let Some(reason) = current_reason {
        return UpdateOutcome::Failed {
            reason: format!("installed skill unreadable: {reason}"),
        };
    }

    let stored = origin.content_hash.as_str();

    // Current matches source: up to date, even when locally edited to match.
    if source_hash == current_hash {
        resync_stored_hash(skill_id, stored, &current_hash, origins);
        return UpdateOutcome::UpToDate;
    }

    let has_local_mods = !stored.is_empty() && stored != current_hash;
    if has_local_mods && !opts.force {
        return UpdateOutcome::Blocked;
    }

    let from = short(&current_hash);
    let to = short(&source_hash);
    if opts.dry_run {
        return UpdateOutcome::WouldUpdate {
            from_commit: from,
            to_commit: to,
        };
    }

    if let Err(e) = replace_dir(&source_path, &dest) {
        return UpdateOutcome::Failed {
            reason: format!("failed to update: {e}"),
        };
    }

    finalize_update(skill_id, &dest, None, &from, &to, origins);
    tracing::info!(%skill_id, "updated skill from local source");
    UpdateOutcome::Updated {
        from_commit: from,
        to_commit: to,
    }
}

async fn update_from_github(
    skill_id: &str,
    origin: &Origin,
    config: &CatalogConfig,
    github: &GithubClient,
    origins: &dyn OriginRepository,
    opts: UpdateOptions,
) -> UpdateOutcome {
    if origin.source.is_empty() {
        return UpdateOutcome::Failed {
            reason: "missing GitHub source URL".to_string(),
        };
    }
    let old_commit = origin
        .commit_sha
        .as_deref()
        .map(short)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    let stored = origin.content_hash.as_str();

    // Phase 1: decide via the cheap remote digest, no download.
    let dest = config.skills_dir.join(skill_id);
    let (current_hash, current_reason) = hash::content_hash(&dest);
    if let Some(reason) = current_reason {
        return UpdateOutcome::Failed {
            reason: format!("installed skill unreadable: {reason}"),
        };
    }

    let (remote_hash, remote_reason) = github_source_hash(origin, skill_id, github, origins).await;
    if let Some(reason) = remote_reason {
        return UpdateOutcome::Failed {
            reason: format!("cannot check remote: {reason}"),
        };
    }

    if remote_hash == current_hash {
        resync_stored_hash(skill_id, stored, &current_hash, origins);
        return UpdateOutcome::UpToDate;
    }

    let has_local_mods = !stored.is_empty() && stored != current_hash;
    if has_local_mods && !opts.force {
        return UpdateOutcome::Blocked;
    }

    if opts.dry_run {
        return UpdateOutcome::WouldUpdate {
            from_commit: old_commit,
            to_commit: "latest".to_string(),
        };
    }

    // Phase 2: fetch and apply.
    let parsed = match source::parse_github_url(&origin.source) {
        Ok(p) => p,
        Err(e) => return UpdateOutcome::Failed { reason: e.to_string() },
    };
    let mut fetched = match fetch::fetch_github(github, &parsed).await {
        Ok(f) => f,
        Err(e) => {
            return UpdateOutcome::Failed {
                reason: format!("failed to fetch from GitHub: {e}"),
            };
        },
    };
    let new_commit = fetched
        .commit_sha
        .as_deref()
        .map(short)
        .unwrap_or_else(|| "latest".to_string());

    // Origin paths are repository-relative; strip the URL subpath to get the
    // extraction-relative skill location.
    let url_prefix = parsed.path.as_str();
    let relative = if url_prefix.is_empty() {
        origin.path.clone()
    } else if origin.path == url_prefix {
        String::new()
    } else if let Some(rest) = origin.path.strip_prefix(&format!("{url_prefix}/")) {
        rest.to_string()
    } else {
        origin.path.clone()
    };

    let copy_source: PathBuf = if !relative.is_empty() && fetched.path().join(&relative).exists() {
        fetched.path().join(&relative)
    } else {
        match detect::detect_skills(fetched.path()) {
            Ok(skills) if skills.len() == 1 => {
                if skills[0].source_path == *fetched.path() {
                    if let Err(e) = fetched.rename_root(&skills[0].name) {
                        return UpdateOutcome::Failed { reason: e.to_string() };
                    }
                    fetched.path().to_path_buf()
                } else {
                    skills[0].source_path.clone()
                }
            },
            _ => fetched.path().to_path_buf(),
        }
    };

    if let Err(e) = replace_dir(&copy_source, &dest) {
        return UpdateOutcome::Failed {
            reason: format!("failed to update: {e}"),
        };
    }

    finalize_update(
        skill_id,
        &dest,
        fetched.commit_sha.clone(),
        &old_commit,
        &new_commit,
        origins,
    );
    tracing::info!(%skill_id, from = %old_commit, to = %new_commit, "updated skill from github");
    UpdateOutcome::Updated {
        from_commit: old_commit,
        to_commit: new_commit,
    }
}

/// Remove the installed directory and copy fresh content in. A failed copy
/// rolls the partial destination back before reporting.
fn replace_dir(source_path: &Path, dest: &Path) -> crate::error::Result<()> {
    std::fs::remove_dir_all(dest)?;
    match add::copy_skill_dir(source_path, dest) {
        Ok(()) => Ok(()),
        Err(e) => {
            if dest.exists() {
                let _ = std::fs::remove_dir_all(dest);
            }
            Err(e)
        },
    }
}

/// Hash-scheme drift: when installed content already matches the source but
/// the stored baseline disagrees, resync it silently. Not a local mod.
fn resync_stored_hash(
    skill_id: &str,
    stored: &str,
    current_hash: &str,
    origins: &dyn OriginRepository,
) {
    if stored != current_hash {
        let current = current_hash.to_string();
        if let Err(e) = origins.update_entry(skill_id, &mut |o| o.content_hash = current.clone()) {
            tracing::warn!(%skill_id, %e, "failed to resync stored content hash");
        }
    }
}

fn finalize_update(
    skill_id: &str,
    dest: &Path,
    commit_sha: Option<String>,
    from: &str,
    to: &str,
    origins: &dyn OriginRepository,
) {
    let (new_hash, reason) = hash::content_hash(dest);
    if let Some(reason) = reason {
        tracing::warn!(%skill_id, %reason, "could not hash updated skill");
    }
    let now = Utc::now();
    let entry = HistoryEntry {
        from_commit: from.to_string(),
        to_commit: to.to_string(),
        updated_at: now,
    };
    let result = origins.update_entry(skill_id, &mut |o| {
        o.content_hash = new_hash.clone();
        if let Some(sha) = &commit_sha {
            o.commit_sha = Some(sha.clone());
        }
        o.updated_at = Some(now);
        o.history.push(entry.clone());
    });
    if let Err(e) = result {
        tracing::warn!(%skill_id, %e, "failed to update origin record");
    }
}

/// Update every origin-tracked skill, optionally limited to `only`.
///
/// Builtins are skipped; one skill's failure never blocks the others.
pub async fn update_all(
    config: &CatalogConfig,
    github: &GithubClient,
    origins: &dyn OriginRepository,
    opts: UpdateOptions,
    only: Option<&[String]>,
) -> UpdateReport {
    let all = origins.all();
    let selected: Vec<(String, Origin)> = all
        .into_iter()
        .filter(|(id, _)| only.is_none_or(|ids| ids.contains(id)))
        .collect();

    if selected.is_empty() {
        return UpdateReport {
            success: true,
            message: "no skills to update".to_string(),
            ..UpdateReport::default()
        };
    }

    let mut updated = Vec::new();
    let mut skipped = Vec::new();
    let mut details = Vec::new();
    let mut errors = Vec::new();

    for (skill_id, origin) in selected {
        if origin.kind == SourceKind::Builtin {
            continue;
        }
        let report = update_skill(&skill_id, config, github, origins, opts).await;
        updated.extend(report.updated);
        skipped.extend(report.skipped.clone());
        details.extend(report.details);
        if !report.success && report.skipped.is_empty() {
            errors.push(format!("{skill_id}: {}", report.message));
            details.push(UpdateDetail {
                skill_id: skill_id.clone(),
                success: false,
                message: report.message,
                from_commit: String::new(),
                to_commit: String::new(),
            });
        }
    }

    let mut parts = Vec::new();
    if !updated.is_empty() {
        parts.push(format!("updated {} skill(s)", updated.len()));
    }
    if !skipped.is_empty() {
        parts.push(format!("skipped {} (up to date)", skipped.len()));
    }
    if !errors.is_empty() {
        parts.push(format!("{} error(s)", errors.len()));
    }

    UpdateReport {
        success: errors.is_empty(),
        skill_id: updated.join(","),
        message: if parts.is_empty() {
            "no skills to update".to_string()
        } else {
            parts.join(", ")
        },
        updated,
        skipped,
        errors,
        local_modified: false,
        details,
    }
}
