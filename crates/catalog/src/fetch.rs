//! Archive materialization: tarball and zip extraction into scoped temp dirs.
//!
//! Extraction is hostile-input territory. Symlink and hard-link members fail
//! the whole extraction, member paths may not escape the extraction root,
//! hidden and junk entries are skipped, and per-file plus cumulative size
//! ceilings are enforced while writing.

use std::{
    io::Read as _,
    path::{Component, Path, PathBuf},
};

use {skilldock_config::FetchLimits, tempfile::TempDir};

use crate::{
    error::{Error, Result},
    github::GithubClient,
    hash::is_excluded_name,
    source::GithubSource,
};

/// A fetched source materialized on local disk.
///
/// The backing [`TempDir`] is removed on drop, on every exit path — callers
/// never clean up manually.
pub struct FetchedSource {
    temp: TempDir,
    root: PathBuf,
    /// Commit the content was fetched at, when known (github sources).
    pub commit_sha: Option<String>,
    /// Ref the content was fetched at (github sources).
    pub git_ref: Option<String>,
}

impl FetchedSource {
    /// Directory holding the extracted content.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Re-root the content under `<name>/` inside the same temp dir, so a
    /// single-skill source satisfies name-matches-directory validation.
    pub fn rename_root(&mut self, name: &str) -> Result<()> {
        let new_root = self.temp.path().join(name);
        if new_root == self.root {
            return Ok(());
        }
        std::fs::rename(&self.root, &new_root)?;
        self.root = new_root;
        Ok(())
    }
}

/// Fetch a GitHub source: resolve the ref, stream the tarball, extract the
/// requested subtree into a scoped temp dir.
pub async fn fetch_github(client: &GithubClient, src: &GithubSource) -> Result<FetchedSource> {
    let git_ref = match &src.git_ref {
        Some(r) => r.clone(),
        None => client.default_branch(&src.owner, &src.repo).await,
    };
    let commit_sha = client
        .latest_commit_sha(&src.owner, &src.repo, &git_ref)
        .await;

    let tarball = client
        .download_tarball(&src.owner, &src.repo, &git_ref)
        .await?;

    let temp = tempfile::Builder::new().prefix("skilldock-gh-").tempdir()?;
    let dest = temp.path().join("src");
    let tar_path = tarball.path().to_path_buf();
    let subpath = src.path.clone();
    let limits = client.limits();
    tokio::task::spawn_blocking(move || extract_tarball(&tar_path, &subpath, &dest, &limits))
        .await
        .map_err(|e| Error::message(format!("extraction task failed: {e}")))??;
    drop(tarball);

    tracing::info!(owner = %src.owner, repo = %src.repo, %git_ref, "fetched github source");
    Ok(FetchedSource {
        root: temp.path().join("src"),
        temp,
        commit_sha,
        git_ref: Some(git_ref),
    })
}

/// Extract a local zip archive into a scoped temp dir.
pub async fn fetch_zip(zip_path: &Path, limits: &FetchLimits) -> Result<FetchedSource> {
    let temp = tempfile::Builder::new().prefix("skilldock-zip-").tempdir()?;
    let dest = temp.path().join("src");
    let zip_path = zip_path.to_path_buf();
    let limits = *limits;
    tokio::task::spawn_blocking(move || extract_zip(&zip_path, &dest, &limits))
        .await
        .map_err(|e| Error::message(format!("extraction task failed: {e}")))??;

    Ok(FetchedSource {
        root: temp.path().join("src"),
        temp,
        commit_sha: None,
        git_ref: None,
    })
}

/// Extract the members of a GitHub tarball under `subpath` into `dest`.
///
/// GitHub tarballs wrap everything in a single synthetic `<owner>-<repo>-<sha>/`
/// directory; that root is discovered from the member list and stripped
/// together with `subpath` to produce catalog-relative names.
pub fn extract_tarball(
    tar_path: &Path,
    subpath: &str,
    dest: &Path,
    limits: &FetchLimits,
) -> Result<()> {
    let root = discover_tarball_root(tar_path)?;

    let mut prefix: Vec<String> = vec![root];
    prefix.extend(
        subpath
            .split('/')
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned),
    );

    let file = std::fs::File::open(tar_path)?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));

    std::fs::create_dir_all(dest)?;
    let mut total: u64 = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(rel) = strip_prefix_components(&path, &prefix)? else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        if rel
            .components()
            .any(|c| matches!(c, Component::Normal(n) if is_excluded_name(&n.to_string_lossy())))
        {
            continue;
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            return Err(Error::security(format!(
                "archive contains a link member: {}",
                path.display()
            )));
        }

        let target = dest.join(&rel);
        if entry_type.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if !entry_type.is_file() {
            continue;
        }

        let size = entry.header().size()?;
        if size > limits.max_file_bytes {
            return Err(Error::size_limit(
                format!("archive member {}", rel.display()),
                limits.max_file_bytes,
            ));
        }
        total += size;
        if total > limits.max_extracted_bytes {
            return Err(Error::size_limit(
                "cumulative extracted content",
                limits.max_extracted_bytes,
            ));
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

/// First pass over the member list: the single synthetic top-level directory.
fn discover_tarball_root(tar_path: &Path) -> Result<String> {
    let file = std::fs::File::open(tar_path)?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));

    let mut roots: Vec<String> = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        // Pseudo-entries (pax global headers) never define the root.
        let entry_type = entry.header().entry_type();
        if !(entry_type.is_file() || entry_type.is_dir()) {
            continue;
        }
        let path = entry.path()?;
        if let Some(Component::Normal(first)) = path.components().next() {
            let name = first.to_string_lossy().to_string();
            if !roots.contains(&name) {
                roots.push(name);
            }
        }
    }
    roots.sort();
    roots
        .into_iter()
        .next()
        .ok_or_else(|| Error::invalid_source("tarball is empty"))
}

/// Strip `prefix` components from a member path.
///
/// `Ok(None)` when the member is outside the prefix; traversal components
/// anywhere in the path fail closed.
fn strip_prefix_components(path: &Path, prefix: &[String]) -> Result<Option<PathBuf>> {
    let mut components = path.components();

    for expected in prefix {
        match components.next() {
            Some(Component::Normal(actual)) if actual.to_string_lossy() == *expected => {},
            Some(Component::CurDir) => return Ok(None),
            Some(Component::ParentDir | Component::RootDir | Component::Prefix(_)) => {
                return Err(Error::security(format!(
                    "archive contains unsafe path: {}",
                    path.display()
                )));
            },
            _ => return Ok(None),
        }
    }

    let mut rel = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(c) => rel.push(c),
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::security(format!(
                    "archive contains unsafe path: {}",
                    path.display()
                )));
            },
        }
    }
    Ok(Some(rel))
}

/// Extract a zip archive into `dest` with the same member validation as
/// tarballs: no links, no escaping names, hidden/junk skipped, size caps
/// enforced during writing.
pub fn extract_zip(zip_path: &Path, dest: &Path, limits: &FetchLimits) -> Result<()> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::invalid_source(format!("not a valid zip archive: {e}")))?;

    std::fs::create_dir_all(dest)?;
    let mut total: u64 = 0;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::invalid_source(format!("unreadable zip member: {e}")))?;

        let Some(rel) = entry.enclosed_name() else {
            return Err(Error::security(format!(
                "zip member escapes extraction root: {}",
                entry.name()
            )));
        };
        if rel
            .components()
            .any(|c| matches!(c, Component::Normal(n) if is_excluded_name(&n.to_string_lossy())))
        {
            continue;
        }

        // Unix mode bits: S_IFLNK marks a symlink member.
        if entry
            .unix_mode()
            .is_some_and(|mode| mode & 0o170000 == 0o120000)
        {
            return Err(Error::security(format!(
                "zip contains a symlink member: {}",
                entry.name()
            )));
        }

        let target = dest.join(&rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // The declared size is untrusted; enforce the cap on actual bytes.
        let mut out = std::fs::File::create(&target)?;
        let written = std::io::copy(&mut (&mut entry).take(limits.max_file_bytes + 1), &mut out)?;
        if written > limits.max_file_bytes {
            return Err(Error::size_limit(
                format!("zip member {}", rel.display()),
                limits.max_file_bytes,
            ));
        }
        total += written;
        if total > limits.max_extracted_bytes {
            return Err(Error::size_limit(
                "cumulative extracted content",
                limits.max_extracted_bytes,
            ));
        }
    }

    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write as _};

    fn limits() -> FetchLimits {
        FetchLimits::default()
    }

    /// Gzipped tarball from `(path, contents)` pairs.
    fn make_tarball(entries: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let gz = flate2::write::GzEncoder::new(
            file.reopen().unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(gz);
        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        file
    }

    #[test]
    fn tarball_root_is_stripped() {
        let tar = make_tarball(&[
            ("repo-abc123/SKILL.md", b"---\nname: s\n---\nbody\n"),
            ("repo-abc123/assets/data.txt", b"data"),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        extract_tarball(tar.path(), "", tmp.path(), &limits()).unwrap();
        assert!(tmp.path().join("SKILL.md").is_file());
        assert!(tmp.path().join("assets/data.txt").is_file());
    }

    #[test]
    fn subpath_limits_extraction() {
        let tar = make_tarball(&[
            ("repo-abc/skills/a/SKILL.md", b"a"),
            ("repo-abc/skills/b/SKILL.md", b"b"),
            ("repo-abc/README.md", b"readme"),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        extract_tarball(tar.path(), "skills/a", tmp.path(), &limits()).unwrap();
        assert!(tmp.path().join("SKILL.md").is_file());
        assert!(!tmp.path().join("README.md").exists());
        assert!(!tmp.path().join("b").exists());
    }

    #[test]
    fn hidden_and_junk_members_are_skipped() {
        let tar = make_tarball(&[
            ("repo/SKILL.md", b"s"),
            ("repo/.git/HEAD", b"ref"),
            ("repo/.env", b"SECRET=1"),
            ("repo/__pycache__/mod.pyc", b"\x00"),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        extract_tarball(tar.path(), "", tmp.path(), &limits()).unwrap();
        assert!(tmp.path().join("SKILL.md").is_file());
        assert!(!tmp.path().join(".git").exists());
        assert!(!tmp.path().join(".env").exists());
        assert!(!tmp.path().join("__pycache__").exists());
    }

    #[test]
    fn symlink_member_fails_whole_extraction() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let gz = flate2::write::GzEncoder::new(
            file.reopen().unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(gz);

        let mut header = tar::Header::new_gnu();
        header.set_size(1);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "repo/ok.txt", &b"x"[..])
            .unwrap();

        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_size(0);
        link.set_cksum();
        builder
            .append_link(&mut link, "repo/escape", "/etc/passwd")
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let err = extract_tarball(file.path(), "", tmp.path(), &limits()).unwrap_err();
        assert!(matches!(err, Error::SecurityViolation { .. }));
    }

    #[test]
    fn per_file_cap_is_enforced() {
        let big = vec![b'x'; 2048];
        let tar = make_tarball(&[("repo/big.bin", big.as_slice())]);
        let tmp = tempfile::tempdir().unwrap();
        let small = FetchLimits {
            max_file_bytes: 1024,
            ..FetchLimits::default()
        };
        let err = extract_tarball(tar.path(), "", tmp.path(), &small).unwrap_err();
        assert!(matches!(err, Error::SizeLimitExceeded { .. }));
    }

    #[test]
    fn cumulative_cap_is_enforced() {
        let chunk = vec![b'x'; 600];
        let tar = make_tarball(&[
            ("repo/a.bin", chunk.as_slice()),
            ("repo/b.bin", chunk.as_slice()),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        let small = FetchLimits {
            max_file_bytes: 1024,
            max_extracted_bytes: 1000,
            ..FetchLimits::default()
        };
        let err = extract_tarball(tar.path(), "", tmp.path(), &small).unwrap_err();
        assert!(matches!(err, Error::SizeLimitExceeded { .. }));
    }

    #[test]
    fn traversal_member_fails_closed() {
        // The tar builder's safe path API refuses to emit `..`, so write the
        // traversing name straight into the header's name field to produce the
        // malicious member this test needs.
        let file = tempfile::NamedTempFile::new().unwrap();
        let gz = flate2::write::GzEncoder::new(
            file.reopen().unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(gz);

        let mut header = tar::Header::new_gnu();
        let name = b"repo/../../escape.txt";
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
        header.set_size(1);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, &b"x"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let err = extract_tarball(file.path(), "", tmp.path(), &limits()).unwrap_err();
        assert!(matches!(err, Error::SecurityViolation { .. }));
    }

    fn make_zip(entries: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (path, contents) in entries {
            writer.start_file(*path, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    #[test]
    fn zip_extracts_and_skips_hidden() {
        let zipf = make_zip(&[
            ("my-skill/SKILL.md", b"---\nname: my-skill\n---\nbody\n"),
            ("my-skill/.DS_Store", b"junk"),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        extract_zip(zipf.path(), tmp.path(), &limits()).unwrap();
        assert!(tmp.path().join("my-skill/SKILL.md").is_file());
        assert!(!tmp.path().join("my-skill/.DS_Store").exists());
    }

    #[test]
    fn zip_symlink_mode_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        // `start_file` forces the regular-file type bit, so use the dedicated
        // symlink API to emit a member whose mode carries S_IFLNK.
        let options = zip::write::SimpleFileOptions::default();
        writer.add_symlink("link", "/etc/passwd", options).unwrap();
        writer.finish().unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let err = extract_zip(file.path(), tmp.path(), &limits()).unwrap_err();
        assert!(matches!(err, Error::SecurityViolation { .. }));
    }

    #[test]
    fn zip_per_file_cap_uses_actual_bytes() {
        let big = vec![b'x'; 4096];
        let zipf = make_zip(&[("skill/big.bin", big.as_slice())]);
        let tmp = tempfile::tempdir().unwrap();
        let small = FetchLimits {
            max_file_bytes: 1024,
            ..FetchLimits::default()
        };
        let err = extract_zip(zipf.path(), tmp.path(), &small).unwrap_err();
        assert!(matches!(err, Error::SizeLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn fetched_source_cleans_up_on_drop() {
        let zipf = make_zip(&[("s/SKILL.md", b"---\nname: s\n---\nb\n")]);
        let fetched = fetch_zip(zipf.path(), &limits()).await.unwrap();
        let root = fetched.path().to_path_buf();
        assert!(root.is_dir());
        drop(fetched);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn rename_root_stays_inside_temp_dir() {
        let zipf = make_zip(&[("SKILL.md", b"---\nname: demo\n---\nb\n")]);
        let mut fetched = fetch_zip(zipf.path(), &limits()).await.unwrap();
        let temp_parent = fetched.path().parent().unwrap().to_path_buf();
        fetched.rename_root("demo").unwrap();
        assert_eq!(fetched.path(), temp_parent.join("demo"));
        assert!(fetched.path().join("SKILL.md").is_file());
    }
}
