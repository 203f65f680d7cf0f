//! Normalization of declarations and invocation records to a common key.
//!
//! The two sides never agree textually: the extractor sees paths as the user
//! typed them, the profiler sees them as the interpreter opened them (often
//! relative to the run's working directory), and the profiler labels nested
//! functions by their bare code name. Both sides are reduced to
//! `(canonical file, code line, bare name)`.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::declare::CallableDeclaration;
use crate::trace::InvocationRecord;

/// Comparable identity of a callable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallableKey {
    pub file: PathBuf,
    pub line: usize,
    pub name: String,
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Bare code name from a profiler label. Newer interpreters may report a
/// dotted qualified name; older ones only the code object's name.
fn bare_name(label: &str) -> &str {
    label.rsplit('.').next().unwrap_or(label)
}

/// Path canonicalizer with memoization; one per resolution pass.
#[derive(Debug, Default)]
pub struct PathNormalizer {
    memo: HashMap<PathBuf, PathBuf>,
}

impl PathNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute, symlink-free form of `path` interpreted relative to `base`.
    /// Files that no longer exist fall back to a lexical cleanup.
    pub fn normalize(&mut self, path: &Path, base: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        };
        if let Some(hit) = self.memo.get(&joined) {
            return hit.clone();
        }
        let normalized = fs::canonicalize(&joined).unwrap_or_else(|_| lexical_clean(&joined));
        self.memo.insert(joined, normalized.clone());
        normalized
    }

    /// Key for a declaration whose path is relative to `base`.
    pub fn declaration_key(&mut self, decl: &CallableDeclaration, base: &Path) -> CallableKey {
        CallableKey {
            file: self.normalize(&decl.source_file, base),
            line: decl.code_line,
            name: decl.name.clone(),
        }
    }

    /// Key for a record from a run in `working_dir`; `None` for built-ins and
    /// synthetic frames, which can never match a declaration.
    pub fn record_key(&mut self, record: &InvocationRecord, working_dir: &Path) -> Option<CallableKey> {
        if record.is_synthetic() {
            return None;
        }
        Some(CallableKey {
            file: self.normalize(Path::new(&record.file), working_dir),
            line: record.line,
            name: bare_name(&record.function).to_string(),
        })
    }
}
