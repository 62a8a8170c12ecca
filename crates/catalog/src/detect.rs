//! Skill detection: find skill directories within a resolved source.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    parse,
    types::SkillInfo,
};

/// The skill definition file every skill directory must carry.
pub const SKILL_FILE: &str = "SKILL.md";

/// Detect skills under `path`.
///
/// A root-level `SKILL.md` makes the source a single skill. Otherwise the
/// immediate children are scanned, plus one additional nesting level for
/// namespaced layouts, deduplicating by resolved directory. An empty result
/// is valid and means "nothing to install".
pub fn detect_skills(path: &Path) -> Result<Vec<SkillInfo>> {
    if !path.exists() {
        return Err(Error::source_not_found(path.display().to_string()));
    }
    if !path.is_dir() {
        return Err(Error::invalid_source(format!(
            "source must be a directory: {}",
            path.display()
        )));
    }

    if path.join(SKILL_FILE).is_file() {
        return Ok(vec![load_info(path)]);
    }

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut skills = Vec::new();

    for child in sorted_subdirs(path) {
        if child.join(SKILL_FILE).is_file() {
            push_unique(&child, &mut seen, &mut skills);
            continue;
        }
        // One extra level for `namespace/name` layouts.
        for grandchild in sorted_subdirs(&child) {
            if grandchild.join(SKILL_FILE).is_file() {
                push_unique(&grandchild, &mut seen, &mut skills);
            }
        }
    }

    Ok(skills)
}

fn push_unique(dir: &Path, seen: &mut HashSet<PathBuf>, skills: &mut Vec<SkillInfo>) {
    let resolved = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    if seen.insert(resolved) {
        skills.push(load_info(dir));
    }
}

/// Skill info for a directory known to contain `SKILL.md`.
///
/// The declared frontmatter name wins; an unreadable or unparsable file
/// falls back to the directory name and is left for validation to flag.
fn load_info(skill_dir: &Path) -> SkillInfo {
    let dir_name = skill_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name = match std::fs::read_to_string(skill_dir.join(SKILL_FILE)) {
        Ok(content) => match parse::parse_meta(&content) {
            Ok(meta) if !meta.name.is_empty() => meta.name,
            Ok(_) => dir_name,
            Err(e) => {
                tracing::debug!(dir = %skill_dir.display(), %e, "unparsable SKILL.md, using directory name");
                dir_name
            },
        },
        Err(e) => {
            tracing::debug!(dir = %skill_dir.display(), %e, "unreadable SKILL.md, using directory name");
            dir_name
        },
    };

    SkillInfo {
        name,
        source_path: skill_dir.to_path_buf(),
    }
}

fn sorted_subdirs(path: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = match std::fs::read_dir(path) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(_) => Vec::new(),
    };
    dirs.sort();
    dirs
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn create_skill(root: &Path, name: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {}\ndescription: d\n---\nbody\n", name.rsplit('/').next().unwrap()),
        )
        .unwrap();
    }

    #[test]
    fn single_skill_at_root() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("SKILL.md"),
            "---\nname: root-skill\ndescription: d\n---\nbody\n",
        )
        .unwrap();
        let skills = detect_skills(tmp.path()).unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "root-skill");
    }

    #[test]
    fn multiple_children_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        create_skill(tmp.path(), "skill-b");
        create_skill(tmp.path(), "skill-a");
        create_skill(tmp.path(), "skill-c");
        let skills = detect_skills(tmp.path()).unwrap();
        let names: Vec<_> = skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["skill-a", "skill-b", "skill-c"]);
    }

    #[test]
    fn nested_namespace_level_is_scanned() {
        let tmp = tempfile::tempdir().unwrap();
        create_skill(tmp.path(), "group/inner-skill");
        let skills = detect_skills(tmp.path()).unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "inner-skill");
    }

    #[test]
    fn name_comes_from_frontmatter() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("dir-name");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            "---\nname: declared-name\ndescription: d\n---\nbody\n",
        )
        .unwrap();
        let skills = detect_skills(tmp.path()).unwrap();
        assert_eq!(skills[0].name, "declared-name");
    }

    #[test]
    fn no_skills_is_empty_not_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("README.md"), "hello").unwrap();
        std::fs::create_dir_all(tmp.path().join("empty-dir")).unwrap();
        assert!(detect_skills(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_source_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            detect_skills(&tmp.path().join("nope")),
            Err(Error::SourceNotFound { .. })
        ));
    }

    #[test]
    fn file_source_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let f = tmp.path().join("file.txt");
        std::fs::write(&f, "content").unwrap();
        assert!(matches!(
            detect_skills(&f),
            Err(Error::InvalidSource { .. })
        ));
    }
}
