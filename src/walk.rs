//! Source tree traversal.
//!
//! Walks a directory in file-name order, pruning ignored directory names
//! and dropping files that match exclude globs. Unreadable entries are
//! skipped rather than failing the walk.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

use crate::models::SourceFile;

/// Collect every file under `root`.
///
/// `ignored_dirs` are matched against directory names at any depth below
/// the root (the root itself is never pruned). `exclude_globs` are matched
/// against the `/`-separated path relative to `root`; `.git` internals are
/// always excluded.
pub fn walk_source_tree(
    root: &Path,
    ignored_dirs: &[String],
    exclude_globs: &[String],
) -> Result<Vec<SourceFile>> {
    let ignored: HashSet<&str> = ignored_dirs.iter().map(String::as_str).collect();

    let mut excludes = vec!["**/.git/**".to_string(), ".git/**".to_string()];
    excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !ignored.contains(entry.file_name().to_string_lossy().as_ref())
        });

    let mut files = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = relative_slash_path(root, path);

        if exclude_set.is_match(&relative) {
            continue;
        }

        files.push(SourceFile {
            path: path.to_path_buf(),
            relative,
        });
    }

    Ok(files)
}

/// `path` relative to `base` with `/` separators. Falls back to the full
/// path when `path` is not under `base`.
pub fn relative_slash_path(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
