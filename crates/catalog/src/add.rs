//! Add engine: install skills from builtin, local, GitHub, and zip sources.
//!
//! A batch is never transactional across skills: each skill installs or
//! fails independently, with partial copies rolled back per skill. The only
//! batch-fatal precondition is a duplicate candidate id, which aborts before
//! anything is written.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use skilldock_config::CatalogConfig;

use crate::{
    detect::{self, SKILL_FILE},
    error::{Error, Result},
    fetch::{self, FetchedSource},
    github::GithubClient,
    hash::{self, is_excluded_name},
    origin::OriginRepository,
    parse, source,
    types::{AddDetail, AddReport, Origin, ResolvedSource, SkillInfo, SourceKind},
    validate,
};

/// Caller-tunable add behavior.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Overwrite an existing skill with the same id.
    pub force: bool,
    /// Install under `namespace/name` ids. Defaults to false for single-skill
    /// sources and true for multi-skill sources.
    pub keep_structure: Option<bool>,
    /// Namespace override; multi-skill sources default to the source label.
    pub namespace: Option<String>,
    /// Rename a single-skill install to this id.
    pub rename_to: Option<String>,
}

/// Add skills from a source string into the catalog.
pub async fn add_skill(
    source_str: &str,
    config: &CatalogConfig,
    github: &GithubClient,
    origins: &dyn OriginRepository,
    opts: &AddOptions,
) -> AddReport {
    let resolved = match source::resolve_source(source_str) {
        Ok(r) => r,
        Err(e) => return AddReport::failure(e.to_string()),
    };

    if resolved.kind == SourceKind::Builtin {
        return add_builtin(&resolved.resolved, config, origins, opts.force);
    }

    match materialize(&resolved, config, github).await {
        Ok(m) => install_from_dir(m, &resolved, config, github, origins, opts).await,
        Err(e) => AddReport::failure(e.to_string()),
    }
}

/// A source materialized as a local directory plus its origin template.
struct Materialized {
    /// Keeps the scoped temp dir alive for the duration of the install.
    fetched: Option<FetchedSource>,
    source_path: PathBuf,
    source_label: String,
    origin_template: Origin,
}

async fn materialize(
    resolved: &ResolvedSource,
    config: &CatalogConfig,
    github: &GithubClient,
) -> Result<Materialized> {
    match resolved.kind {
        SourceKind::Github => {
            let parsed = source::parse_github_url(&resolved.resolved)?;
            let fetched = fetch::fetch_github(github, &parsed).await?;

            let mut origin = Origin::new(&resolved.resolved, SourceKind::Github);
            origin.git_ref = fetched.git_ref.clone();
            origin.commit_sha = fetched.commit_sha.clone();
            origin.path = parsed.path.clone();

            Ok(Materialized {
                source_path: fetched.path().to_path_buf(),
                source_label: parsed.source_label(),
                origin_template: origin,
                fetched: Some(fetched),
            })
        },
        SourceKind::Zip => {
            let zip_path = PathBuf::from(&resolved.resolved);
            let fetched = fetch::fetch_zip(&zip_path, &config.limits).await?;

            let mut origin = Origin::new(&resolved.resolved, SourceKind::Zip);
            origin.source_mtime = std::fs::metadata(&zip_path)
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_nanos() as u64);

            let source_label = zip_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "zip".to_string());

            Ok(Materialized {
                source_path: fetched.path().to_path_buf(),
                source_label,
                origin_template: origin,
                fetched: Some(fetched),
            })
        },
        SourceKind::Local => {
            let path = PathBuf::from(&resolved.resolved);
            Ok(Materialized {
                fetched: None,
                source_label: source::local_source_label(&path),
                origin_template: Origin::new(&resolved.resolved, SourceKind::Local),
                source_path: path,
            })
        },
        SourceKind::Builtin => Err(Error::invalid_source("builtin sources are not materialized")),
    }
}

async fn install_from_dir(
    mut materialized: Materialized,
    resolved: &ResolvedSource,
    config: &CatalogConfig,
    github: &GithubClient,
    origins: &dyn OriginRepository,
    opts: &AddOptions,
) -> AddReport {
    let mut skills = match detect::detect_skills(&materialized.source_path) {
        Ok(s) => s,
        Err(e) => return AddReport::failure(e.to_string()),
    };

    if resolved.kind == SourceKind::Zip {
        if skills.is_empty() {
            return AddReport::failure(format!(
                "no skills found in {}",
                materialized.source_path.display()
            ));
        }
        if skills.len() != 1 {
            return AddReport::failure(format!(
                "zip must contain exactly one skill (found {}); split the archive into separate zip files",
                skills.len()
            ));
        }
    }

    // Fetched single-skill sources land in an anonymous extraction root;
    // re-root under the declared name so name-matches-directory validation
    // holds for the source as it will for the installed copy.
    if skills.len() == 1 {
        if let Some(fetched) = materialized.fetched.as_mut()
            && skills[0].source_path == *fetched.path()
        {
            let name = skills[0].name.clone();
            if let Err(e) = fetched.rename_root(&name) {
                return AddReport::failure(e.to_string());
            }
            materialized.source_path = fetched.path().to_path_buf();
            skills = match detect::detect_skills(&materialized.source_path) {
                Ok(s) => s,
                Err(e) => return AddReport::failure(e.to_string()),
            };
        }
        // A single skill's origin path is pinned to its name so later update
        // checks hash the narrowest tree.
        if materialized.origin_template.path.is_empty()
            && let Some(first) = skills.first()
        {
            materialized.origin_template.path = first.name.clone();
        }
    }

    // Local container directories may also carry zip archives to install.
    let root_is_skill = materialized.source_path.join(SKILL_FILE).exists();
    let zip_files: Vec<PathBuf> = if resolved.kind == SourceKind::Local && !root_is_skill {
        let mut zips: Vec<PathBuf> = std::fs::read_dir(&materialized.source_path)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| {
                        p.is_file()
                            && p.extension().is_some_and(|e| e.eq_ignore_ascii_case("zip"))
                    })
                    .collect()
            })
            .unwrap_or_default();
        zips.sort();
        zips
    } else {
        Vec::new()
    };

    if skills.is_empty() && zip_files.is_empty() {
        return AddReport::failure(format!(
            "no skills found in {}",
            materialized.source_path.display()
        ));
    }

    let keep_structure = if skills.len() == 1 {
        opts.keep_structure.unwrap_or(false)
    } else {
        opts.keep_structure.unwrap_or(true)
    };
    let namespace = opts
        .namespace
        .clone()
        .unwrap_or_else(|| materialized.source_label.clone());
    let rename_single = if skills.len() == 1 {
        opts.rename_to.as_deref()
    } else {
        None
    };

    let mut details: Vec<AddDetail> = Vec::new();
    let mut batch: Vec<(SkillInfo, String)> = Vec::new();

    if !skills.is_empty() {
        let ids = match candidate_ids(&skills, keep_structure, &namespace, rename_single) {
            Ok(ids) => ids,
            Err(e) => return AddReport::failure(e.to_string()),
        };
        batch = skills.into_iter().zip(ids).collect();
        match install_batch(&batch, config, opts.force, rename_single, &mut details) {
            Ok(()) => {},
            Err(e) => return AddReport::failure(e.to_string()),
        }

        record_origins(&batch, &materialized, config, origins, &details);
    }

    // Recurse into sibling zip archives, honoring only the caller's own
    // namespace choice (not the label-derived default). Origins for these are
    // recorded by the recursive call.
    let mut zip_messages: Vec<String> = Vec::new();
    for zip_file in zip_files {
        let zip_opts = AddOptions {
            force: opts.force,
            keep_structure: Some(opts.namespace.is_some()),
            namespace: opts.namespace.clone(),
            rename_to: None,
        };
        let report = Box::pin(add_skill(
            &zip_file.display().to_string(),
            config,
            github,
            origins,
            &zip_opts,
        ))
        .await;
        if !report.success && report.added.is_empty() && !report.message.is_empty() {
            zip_messages.push(report.message.clone());
        }
        details.extend(report.details);
    }

    build_report(details, zip_messages)
}

/// Compute candidate ids, aborting the batch on intra-batch duplicates.
fn candidate_ids(
    skills: &[SkillInfo],
    keep_structure: bool,
    namespace: &str,
    rename_single: Option<&str>,
) -> Result<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();
    for skill in skills {
        let mut name = skill.name.clone();
        if let Some(rename) = rename_single
            && skills.len() == 1
        {
            name = rename.to_string();
        }
        let id = if keep_structure {
            format!("{namespace}/{name}")
        } else {
            name
        };
        if ids.contains(&id) {
            return Err(Error::invalid_source(format!(
                "duplicate skill id detected in batch: {id}"
            )));
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Validate and copy each batch entry, recording per-skill outcomes.
fn install_batch(
    batch: &[(SkillInfo, String)],
    config: &CatalogConfig,
    force: bool,
    rename_single: Option<&str>,
    details: &mut Vec<AddDetail>,
) -> Result<()> {
    std::fs::create_dir_all(&config.skills_dir)?;

    for (skill, skill_id) in batch {
        let issues = validate::validate_skill_dir(&skill.source_path);
        for issue in issues
            .iter()
            .filter(|i| i.severity == validate::Severity::Warning)
        {
            tracing::warn!(dir = %skill.source_path.display(), %issue.message, "skill validation warning");
        }
        if validate::has_fatal(&issues) {
            let fatal: Vec<&str> = issues
                .iter()
                .filter(|i| i.severity == validate::Severity::Fatal)
                .map(|i| i.message.as_str())
                .collect();
            details.push(AddDetail {
                skill_id: skill_id.clone(),
                success: false,
                message: format!(
                    "invalid SKILL.md in {}: {}",
                    skill.source_path.display(),
                    fatal.join("; ")
                ),
            });
            continue;
        }

        let dest = config.skills_dir.join(skill_id);
        if dest.exists() {
            if !force {
                details.push(AddDetail {
                    skill_id: skill_id.clone(),
                    success: false,
                    message: format!("skill '{skill_id}' exists; use force to overwrite"),
                });
                continue;
            }
            if let Err(e) = std::fs::remove_dir_all(&dest) {
                details.push(AddDetail {
                    skill_id: skill_id.clone(),
                    success: false,
                    message: format!("failed to replace '{skill_id}': {e}"),
                });
                continue;
            }
        }

        let copied = dest
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .map_err(Error::from)
            .and_then(|_| copy_skill_dir(&skill.source_path, &dest));

        match copied {
            Ok(()) => {
                if let Some(rename) = rename_single {
                    rewrite_installed_name(&dest, rename);
                }
                tracing::info!(%skill_id, "installed skill");
                details.push(AddDetail {
                    skill_id: skill_id.clone(),
                    success: true,
                    message: format!("added '{skill_id}'"),
                });
            },
            Err(e) => {
                // Per-skill rollback: never leave a partial install behind.
                if dest.exists() {
                    let _ = std::fs::remove_dir_all(&dest);
                }
                details.push(AddDetail {
                    skill_id: skill_id.clone(),
                    success: false,
                    message: format!("failed to add '{skill_id}': {e}"),
                });
            },
        }
    }

    Ok(())
}

/// Record origins for the successfully added batch entries, content hash
/// computed from the installed copy.
fn record_origins(
    batch: &[(SkillInfo, String)],
    materialized: &Materialized,
    config: &CatalogConfig,
    origins: &dyn OriginRepository,
    details: &[AddDetail],
) {
    let succeeded: HashSet<&str> = details
        .iter()
        .filter(|d| d.success)
        .map(|d| d.skill_id.as_str())
        .collect();

    for (skill, skill_id) in batch {
        if !succeeded.contains(skill_id.as_str()) {
            continue;
        }
        let installed = config.skills_dir.join(skill_id);
        let (content_hash, reason) = hash::content_hash(&installed);
        if let Some(reason) = reason {
            tracing::warn!(%skill_id, %reason, "could not hash installed skill");
        }

        let rel = skill
            .source_path
            .strip_prefix(&materialized.source_path)
            .map(|r| {
                r.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default();

        let mut origin = materialized.origin_template.clone();
        origin.content_hash = content_hash;
        origin.path = if origin.kind == SourceKind::Github {
            // GitHub paths are repository-relative: template prefix (the URL
            // subpath or the pinned single-skill name) joined with the
            // skill's subdirectory within the fetched tree.
            let prefix = origin.path.trim_end_matches('/');
            if prefix.is_empty() {
                rel
            } else if rel.is_empty() || rel == prefix || prefix.ends_with(&format!("/{rel}")) {
                prefix.to_string()
            } else {
                format!("{prefix}/{rel}")
            }
        } else if rel.is_empty() {
            origin.path
        } else {
            rel
        };

        if let Err(e) = origins.put(skill_id, origin) {
            tracing::warn!(%skill_id, %e, "failed to record origin");
        }
    }
}

fn build_report(details: Vec<AddDetail>, mut extra_messages: Vec<String>) -> AddReport {
    let added: Vec<String> = details
        .iter()
        .filter(|d| d.success)
        .map(|d| d.skill_id.clone())
        .collect();
    let skipped: Vec<String> = details
        .iter()
        .filter(|d| !d.success)
        .map(|d| d.skill_id.clone())
        .collect();

    let mut skipped_messages: Vec<String> = details
        .iter()
        .filter(|d| !d.success)
        .map(|d| d.message.clone())
        .collect();
    skipped_messages.append(&mut extra_messages);

    let message = if !skipped_messages.is_empty() {
        summarize_skipped(&skipped_messages)
    } else if !added.is_empty() {
        let mut seen = HashSet::new();
        details
            .iter()
            .filter(|d| d.success && seen.insert(d.message.clone()))
            .map(|d| d.message.clone())
            .collect::<Vec<_>>()
            .join("; ")
    } else {
        "no skills added".to_string()
    };

    AddReport {
        success: skipped.is_empty() && !added.is_empty(),
        skill_id: added.join(","),
        message,
        added,
        skipped,
        details,
    }
}

/// Concise summary for skipped skills.
fn summarize_skipped(reasons: &[String]) -> String {
    let exists = reasons.iter().filter(|r| r.contains("exists")).count();
    let invalid = reasons
        .iter()
        .filter(|r| r.contains("invalid SKILL.md"))
        .count();
    let others: Vec<&String> = reasons
        .iter()
        .filter(|r| !r.contains("exists") && !r.contains("invalid SKILL.md"))
        .collect();

    let mut parts = Vec::new();
    if exists > 0 {
        parts.push(format!("{exists} already exist"));
    }
    if invalid > 0 {
        parts.push(format!("{invalid} invalid SKILL.md"));
    }
    if let Some(first) = others.first() {
        if others.len() == 1 {
            parts.push((*first).clone());
        } else {
            parts.push(format!("{first} (+{} more)", others.len() - 1));
        }
    }

    if parts.is_empty() {
        "no skills added".to_string()
    } else {
        parts.join("; ")
    }
}

/// Write a builtin skill's definition into the catalog.
fn add_builtin(
    name: &str,
    config: &CatalogConfig,
    origins: &dyn OriginRepository,
    force: bool,
) -> AddReport {
    let Some(content) = source::builtin_skill(name) else {
        return AddReport::failure(format!("unknown builtin skill: {name}"));
    };

    let dest = config.skills_dir.join(name);
    if dest.exists() && !force {
        return AddReport {
            success: false,
            skill_id: name.to_string(),
            message: format!("skill '{name}' exists; use force to overwrite"),
            added: Vec::new(),
            skipped: vec![name.to_string()],
            details: vec![AddDetail {
                skill_id: name.to_string(),
                success: false,
                message: format!("skill '{name}' exists; use force to overwrite"),
            }],
        };
    }

    let write = || -> Result<()> {
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
        std::fs::create_dir_all(&dest)?;
        std::fs::write(dest.join(SKILL_FILE), content)?;
        Ok(())
    };
    if let Err(e) = write() {
        if dest.exists() {
            let _ = std::fs::remove_dir_all(&dest);
        }
        return AddReport::failure(format!("failed to add '{name}': {e}"));
    }

    let mut origin = Origin::new(name, SourceKind::Builtin);
    let (content_hash, _) = hash::content_hash(&dest);
    origin.content_hash = content_hash;
    if let Err(e) = origins.put(name, origin) {
        tracing::warn!(skill_id = %name, %e, "failed to record origin");
    }

    tracing::info!(skill_id = %name, "installed builtin skill");
    AddReport {
        success: true,
        skill_id: name.to_string(),
        message: format!("added '{name}'"),
        added: vec![name.to_string()],
        skipped: Vec::new(),
        details: vec![AddDetail {
            skill_id: name.to_string(),
            success: true,
            message: format!("added '{name}'"),
        }],
    }
}

/// Copy a skill directory, rejecting symlinks and excluding hidden/junk
/// entries. Callers own rollback of a partially written destination.
pub(crate) fn copy_skill_dir(source: &Path, dest: &Path) -> Result<()> {
    ensure_no_symlinks(source)?;

    let walker = walkdir::WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded_name(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry = entry.map_err(|e| Error::message(format!("walk failed: {e}")))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::message(e.to_string()))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn ensure_no_symlinks(source: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| Error::message(format!("walk failed: {e}")))?;
        if entry.path_is_symlink() {
            return Err(Error::security(format!(
                "symlinks are not allowed in skills: {}",
                entry.path().display()
            )));
        }
    }
    Ok(())
}

/// Rewrite the installed copy's frontmatter name after a rename, keeping the
/// name-matches-directory contract intact.
fn rewrite_installed_name(dest: &Path, name: &str) {
    let skill_md = dest.join(SKILL_FILE);
    match std::fs::read_to_string(&skill_md) {
        Ok(raw) => {
            if let Err(e) = std::fs::write(&skill_md, parse::set_frontmatter_name(&raw, name)) {
                tracing::warn!(path = %skill_md.display(), %e, "failed to rewrite frontmatter name");
            }
        },
        Err(e) => {
            tracing::warn!(path = %skill_md.display(), %e, "failed to read installed SKILL.md");
        },
    }
}
