//! Script tree discovery: a sorted recursive walk filtered by a file-name glob.

use std::path::{Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use tracing::warn;
use walkdir::WalkDir;

use crate::errors::{AuditError, AuditResult};

pub const DEFAULT_SCRIPT_PATTERN: &str = "*.sq?";

/// One discovered script file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ScriptFile {
    /// Size in whole KiB, rounded down.
    pub fn size_kib(&self) -> u64 {
        self.size_bytes / 1024
    }
}

/// Compile `pattern` as a glob over file names below `root`.
///
/// A pattern without a `/` matches the file name at any depth.
pub fn compile_pattern(root: &Path, pattern: &str) -> AuditResult<Override> {
    let malformed = |reason: String| AuditError::MalformedPattern {
        pattern: pattern.to_string(),
        reason,
    };
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(malformed("empty pattern".to_string()));
    }
    if trimmed.starts_with('!') {
        return Err(malformed("negated patterns are not supported".to_string()));
    }
    let mut builder = OverrideBuilder::new(root);
    builder
        .add(trimmed)
        .map_err(|e| malformed(e.to_string()))?;
    builder.build().map_err(|e| malformed(e.to_string()))
}

/// Discovered files plus the per-entry failures that were skipped.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<ScriptFile>,
    pub skipped: Vec<AuditError>,
}

/// Walk `root` in file-name order and keep the files matching `pattern`.
///
/// Unreadable entries are logged and skipped; only a malformed pattern fails.
pub fn discover_scripts(root: &Path, pattern: &str) -> AuditResult<Discovery> {
    let matcher = compile_pattern(root, pattern)?;
    let mut discovery = Discovery::default();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let artifact = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                warn!(%artifact, error = %err, "skipping script tree entry");
                discovery
                    .skipped
                    .push(AuditError::corpus_access(artifact, err));
                continue;
            }
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !matcher.matched(entry.path(), false).is_whitelist() {
            continue;
        }
        // Links are kept when their target is a file.
        let metadata = if file_type.is_symlink() {
            std::fs::metadata(entry.path()).map_err(|e| e.to_string())
        } else {
            entry.metadata().map_err(|e| e.to_string())
        };
        match metadata {
            Ok(meta) if meta.is_file() => discovery.files.push(ScriptFile {
                path: entry.path().to_path_buf(),
                size_bytes: meta.len(),
            }),
            Ok(_) => {}
            Err(reason) => {
                let artifact = entry.path().display().to_string();
                warn!(%artifact, error = %reason, "skipping unreachable script");
                discovery
                    .skipped
                    .push(AuditError::corpus_access(artifact, reason));
            }
        }
    }
    Ok(discovery)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str, bytes: usize) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x".repeat(bytes)).unwrap();
    }

    #[test]
    fn test_default_pattern_matches_sqr_and_sqc_at_any_depth() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.sqr", 10);
        touch(dir.path(), "a.sqc", 2048);
        touch(dir.path(), "nested/c.sqr", 1);
        touch(dir.path(), "notes.txt", 1);
        touch(dir.path(), "d.sqlx", 1);

        let found = discover_scripts(dir.path(), DEFAULT_SCRIPT_PATTERN).unwrap();
        let names: Vec<_> = found
            .files
            .iter()
            .map(|f| f.path.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.sqc", "b.sqr", "nested/c.sqr"]);
        assert_eq!(found.files[0].size_kib(), 2);
        assert!(found.skipped.is_empty());
    }

    #[test]
    fn test_malformed_pattern_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_scripts(dir.path(), "*.sq[").unwrap_err();
        assert!(matches!(err, AuditError::MalformedPattern { .. }));
        assert!(err.is_fatal());
        assert!(discover_scripts(dir.path(), "  ").is_err());
    }

    #[test]
    fn test_missing_root_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let found = discover_scripts(&dir.path().join("absent"), DEFAULT_SCRIPT_PATTERN).unwrap();
        assert!(found.files.is_empty());
        assert_eq!(found.skipped.len(), 1);
        assert!(!found.skipped[0].is_fatal());
    }

    #[cfg(unix)]
    #[test]
    fn test_linked_scripts_are_followed_and_dangling_links_skipped() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        touch(outside.path(), "shared.sqc", 3000);
        symlink(outside.path().join("shared.sqc"), dir.path().join("linked.sqc")).unwrap();
        symlink(dir.path().join("missing.sqr"), dir.path().join("dangling.sqr")).unwrap();
        std::fs::create_dir(outside.path().join("lib.sqr")).unwrap();
        symlink(outside.path().join("lib.sqr"), dir.path().join("dirlink.sqr")).unwrap();

        let found = discover_scripts(dir.path(), DEFAULT_SCRIPT_PATTERN).unwrap();
        assert_eq!(found.files.len(), 1);
        assert_eq!(found.files[0].path, dir.path().join("linked.sqc"));
        assert_eq!(found.files[0].size_kib(), 2);

        assert_eq!(found.skipped.len(), 1);
        match &found.skipped[0] {
            AuditError::CorpusAccess { artifact, .. } => {
                assert!(artifact.ends_with("dangling.sqr"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
