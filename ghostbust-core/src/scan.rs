//! Python source discovery with early directory pruning.
//!
//! Patterns given on the command line may be:
//! - a file (`app.py`)
//! - a directory (every `.py` file below it)
//! - a glob (`src/**/*.py`, `tests/test_?.py`)
//!
//! Virtualenvs, caches and VCS metadata are never descended into.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::pattern::{glob_to_regex, is_glob};

/// Directories to exclude by default.
const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".nox",
    ".mypy_cache",
    ".pytest_cache",
    "node_modules",
    ".ghostbust",
];

/// Checks if a directory entry should be pruned (excluded from traversal).
#[inline]
fn is_excluded_dir(entry: &walkdir::DirEntry, excludes: &HashSet<&str>) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excludes.contains(name))
}

fn is_python_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "py")
}

/// Gathers all .py files recursively below `root`.
pub fn gather_py_files(root: &Path) -> Result<Vec<PathBuf>> {
    let excludes: HashSet<&str> = EXCLUDED_DIRS.iter().copied().collect();

    let mut files = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e, &excludes))
        .par_bridge()
        .filter_map(|entry| match entry {
            Ok(e) if is_python_file(e.path()) => Some(Ok(e.into_path())),
            Ok(_) => None,
            Err(e) => Some(Err(e.into())),
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to gather .py files from {}", root.display()))?;
    files.sort();
    Ok(files)
}

/// Split a glob into the literal directory prefix and the pattern part.
fn split_glob(pattern: &str) -> (PathBuf, String) {
    let mut base = PathBuf::new();
    let mut rest: Vec<String> = Vec::new();
    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy().to_string();
        if rest.is_empty() && !is_glob(&text) {
            base.push(component.as_os_str());
        } else if !matches!(component, Component::RootDir) {
            rest.push(text);
        }
    }
    (base, rest.join("/"))
}

/// Files below `base` whose `/`-separated relative path matches `glob`.
fn expand_glob(base: &Path, glob: &str) -> Result<Vec<PathBuf>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let regex = glob_to_regex(glob, '/')?;
    let excludes: HashSet<&str> = EXCLUDED_DIRS.iter().copied().collect();

    let mut out = Vec::new();
    for entry in WalkDir::new(base)
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e, &excludes))
    {
        let entry = entry.with_context(|| format!("Failed to walk {}", base.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(base) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if regex.is_match(&rel) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

/// Resolve `patterns` relative to `root` into a sorted, de-duplicated file list.
///
/// A pattern that matches nothing is logged and skipped.
pub fn gather_sources<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let matched: Vec<PathBuf> = if is_glob(pattern) {
            let (base, glob) = split_glob(pattern);
            expand_glob(&root.join(base), &glob)?
        } else {
            let path = root.join(pattern);
            if path.is_dir() {
                gather_py_files(&path)?
            } else if path.is_file() {
                vec![path]
            } else {
                Vec::new()
            }
        };

        if matched.is_empty() {
            warn!(pattern = %pattern, "pattern matched no files");
        }
        files.extend(matched);
    }

    Ok(files.into_iter().collect())
}
