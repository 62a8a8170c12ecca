//! Content-addressable hashing over skill directories.
//!
//! Two distinct modes, both producing `sha256:<hex>` tagged strings:
//!
//! - [`state_hash`] is metadata-sensitive (mtime, size) and feeds index
//!   staleness detection, where any on-disk change must trigger a rebuild.
//! - [`content_hash`] covers file paths and bytes only, so identical content
//!   fetched at a different time or place yields an identical digest. Its
//!   per-file digest is the git blob SHA-1, which makes the result
//!   reproducible from GitHub's tree-listing API without a download.

use std::path::Path;

use {
    sha1::{Digest as _, Sha1},
    sha2::Sha256,
};

use crate::detect::SKILL_FILE;

/// Entries never installed, hashed, or extracted.
const EXCLUDED_NAMES: &[&str] = &[
    ".git",
    ".env",
    "__pycache__",
    ".DS_Store",
    ".Spotlight-V100",
    ".Trashes",
    "Thumbs.db",
    "desktop.ini",
];

/// True for hidden (dot-prefixed) and known junk entry names.
pub(crate) fn is_excluded_name(name: &str) -> bool {
    name.starts_with('.') || EXCLUDED_NAMES.contains(&name)
}

/// Directory-state digest of the skills root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirState {
    /// Tagged hash, empty string when the skills root does not exist.
    pub hash: String,
    /// Number of skill definition files covered.
    pub count: usize,
}

/// Hash the skills root for staleness detection.
///
/// For every immediate subdirectory containing a `SKILL.md`, emits
/// `rel_path:mtime_ns:size:sha1(bytes)`; lines are sorted, joined with `|`,
/// and hashed with SHA-256. Deliberately sensitive to touch-only changes.
/// Unreadable file bytes degrade to an `err` marker instead of aborting.
pub fn state_hash(skills_dir: &Path) -> DirState {
    if !skills_dir.is_dir() {
        return DirState {
            hash: String::new(),
            count: 0,
        };
    }

    let mut lines = Vec::new();
    let entries = match std::fs::read_dir(skills_dir) {
        Ok(e) => e,
        Err(_) => {
            return DirState {
                hash: String::new(),
                count: 0,
            };
        },
    };

    for entry in entries.flatten() {
        let skill_dir = entry.path();
        if !skill_dir.is_dir() {
            continue;
        }
        let skill_md = skill_dir.join(SKILL_FILE);
        let meta = match std::fs::metadata(&skill_md) {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let body_digest = match std::fs::read(&skill_md) {
            Ok(bytes) => hex(&Sha1::digest(&bytes)),
            Err(_) => "err".to_string(),
        };
        let rel = format!("{}/{SKILL_FILE}", entry.file_name().to_string_lossy());
        lines.push(format!("{rel}:{mtime_ns}:{}:{body_digest}", meta.len()));
    }

    let count = lines.len();
    DirState {
        hash: digest_lines(lines),
        count,
    }
}

/// Content-only hash of a single skill directory tree.
///
/// Returns `(hash, failure_reason)`; a non-empty reason means the hash could
/// not be computed and callers must treat the state as unknown. Never panics
/// or returns `Err` — an unreadable source is an expected condition.
pub fn content_hash(dir: &Path) -> (String, Option<String>) {
    if !dir.is_dir() {
        return (
            String::new(),
            Some(format!("not a directory: {}", dir.display())),
        );
    }

    let mut lines = Vec::new();
    let walker = walkdir::WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !is_excluded_name(&e.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => return (String::new(), Some(format!("unreadable entry: {e}"))),
        };
        if entry.file_type().is_symlink() {
            return (
                String::new(),
                Some(format!("symlink in tree: {}", entry.path().display())),
            );
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match entry.path().strip_prefix(dir) {
            Ok(r) => rel_string(r),
            Err(e) => return (String::new(), Some(e.to_string())),
        };
        let bytes = match std::fs::read(entry.path()) {
            Ok(b) => b,
            Err(e) => {
                return (
                    String::new(),
                    Some(format!("unreadable file {rel}: {e}")),
                );
            },
        };
        lines.push(format!("{rel}:{}", git_blob_sha1(&bytes)));
    }

    if lines.is_empty() {
        return (
            String::new(),
            Some(format!("no files under {}", dir.display())),
        );
    }

    (digest_lines(lines), None)
}

/// Git blob object digest: `sha1("blob <len>\0" ++ bytes)`.
pub fn git_blob_sha1(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", bytes.len()).as_bytes());
    hasher.update(bytes);
    hex(&hasher.finalize())
}

/// Combine per-file lines into the tagged outer digest.
///
/// Shared by both local hashing and the remote tree digest so the two are
/// byte-for-byte comparable.
pub fn digest_lines(mut lines: Vec<String>) -> String {
    lines.sort();
    let joined = lines.join("|");
    format!("sha256:{}", hex(&Sha256::digest(joined.as_bytes())))
}

/// Relative path rendered with forward slashes, platform-independently.
fn rel_string(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
