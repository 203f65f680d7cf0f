//! Builder pattern API for orphan analysis.
//!
//! Provides a fluent interface over discovery, extraction, cache lookup and
//! resolution:
//!
//! ```rust,ignore
//! use ghostbust_core::prelude::*;
//!
//! let report = Ghostbust::new("/path/to/project")
//!     .with_patterns(["src/**/*.py"])
//!     .with_policy(ExclusionPolicy::standard())
//!     .orphans()?;
//!
//! for orphan in &report.orphans {
//!     println!("{} never ran", orphan.qualified_name);
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cache::TraceCache;
use crate::config::default_cache_dir;
use crate::declare::{extract_declarations, CallableDeclaration};
use crate::resolve::{ExclusionPolicy, OrphanReport, OrphanResolver};
use crate::scan::gather_sources;
use crate::trace::Trace;

/// Builder for configuring an orphan analysis.
#[derive(Debug, Clone)]
pub struct Ghostbust {
    /// Project root; patterns and relative paths are resolved against it
    root: PathBuf,

    /// Trace cache location
    cache_dir: PathBuf,

    /// Source file patterns (files, directories, globs)
    patterns: Vec<String>,

    policy: ExclusionPolicy,

    /// Cached trace hashes (or unique prefixes) to use; empty means all
    traces: Vec<String>,
}

impl Ghostbust {
    /// Create a new analysis builder for the given project root.
    ///
    /// Defaults: every `.py` file below the root, the standard exclusion
    /// policy, every cached trace.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache_dir: default_cache_dir(&root),
            root,
            patterns: vec![".".to_string()],
            policy: ExclusionPolicy::standard(),
            traces: Vec::new(),
        }
    }

    /// Use the trace cache at `dir` (relative paths are below the root).
    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_dir = self.root.join(dir);
        self
    }

    /// Replace the source patterns.
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_policy(mut self, policy: ExclusionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Restrict evidence to the given cached traces.
    pub fn with_traces<I, S>(mut self, hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.traces = hashes.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> TraceCache {
        TraceCache::open(&self.cache_dir)
    }

    /// Discover source files and extract their declarations.
    pub fn declarations(&self) -> Result<Vec<CallableDeclaration>> {
        let files = gather_sources(&self.root, &self.patterns)?;
        info!(files = files.len(), "extracting declarations");
        let decls = extract_declarations(&files)?;
        Ok(decls)
    }

    /// The selected traces, or every cached trace when none were selected.
    pub fn traces(&self) -> Result<Vec<Trace>> {
        let cache = self.cache();
        if self.traces.is_empty() {
            return cache
                .load_all()
                .with_context(|| format!("Failed to load traces from {}", cache.root().display()));
        }

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.traces.len());
        for prefix in &self.traces {
            let hash = cache.resolve_hash(prefix)?;
            if seen.insert(hash.clone()) {
                out.push(cache.retrieve(&hash)?);
            }
        }
        for t in &out {
            debug!(hash = %t.content_hash, invoked = t.invoked_count(), "selected trace");
        }
        Ok(out)
    }

    /// Run the full analysis.
    pub fn orphans(&self) -> Result<OrphanReport> {
        let decls = self.declarations()?;
        let traces = self.traces()?;
        Ok(self.resolve(&decls, &traces))
    }

    /// Resolve already-loaded declarations and traces under this policy.
    pub fn resolve(&self, declarations: &[CallableDeclaration], traces: &[Trace]) -> OrphanReport {
        OrphanResolver::new(&self.policy)
            .with_base_dir(&self.root)
            .resolve(declarations, traces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::fs;

    use crate::cache::content_hash;
    use crate::trace::InvocationRecord;

    fn create_project(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("ghostbust_builder_test")
            .join(format!("{}_{}", name, std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("app.py"),
            "def called():\n    pass\n\ndef never_called():\n    pass\n\ncalled()\n",
        )
        .unwrap();
        dir
    }

    fn fake_trace(root: &Path, calls: &[(usize, &str)]) -> Trace {
        Trace {
            content_hash: content_hash(b"called()", &[] as &[&str]),
            script: root.join("app.py"),
            args: Vec::new(),
            working_dir: root.to_path_buf(),
            created_at: Utc::now(),
            partial: false,
            exit_code: Some(0),
            fault: None,
            records: calls
                .iter()
                .map(|(line, name)| InvocationRecord {
                    file: root.join("app.py").to_string_lossy().to_string(),
                    line: *line,
                    function: name.to_string(),
                    calls: 1,
                    primitive_calls: 1,
                    self_time: 0.0,
                    cumulative_time: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_defaults() {
        let b = Ghostbust::new("/tmp/project");
        assert_eq!(b.patterns, vec![".".to_string()]);
        assert!(b.traces.is_empty());
    }

    #[test]
    fn test_orphans_from_cached_trace() {
        let root = create_project("cached");
        let analysis = Ghostbust::new(&root)
            .with_cache_dir(".cache")
            .with_policy(ExclusionPolicy::none());

        analysis.cache().store(&fake_trace(&root, &[(1, "called")])).unwrap();

        let report = analysis.orphans().unwrap();
        let names: Vec<&str> = report.orphans.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["never_called"]);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_unknown_trace_selection_fails() {
        let root = create_project("unknown");
        let err = Ghostbust::new(&root)
            .with_cache_dir(".cache")
            .with_traces(["deadbeef"])
            .traces()
            .unwrap_err();
        assert!(err.to_string().contains("deadbeef"));
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_repeated_trace_selection_counted_once() {
        let root = create_project("repeated");
        let analysis = Ghostbust::new(&root).with_cache_dir(".cache");
        let first = fake_trace(&root, &[(1, "called")]);
        let mut second = fake_trace(&root, &[(4, "never_called")]);
        second.content_hash = content_hash(b"never_called()", &[] as &[&str]);
        analysis.cache().store(&first).unwrap();
        analysis.cache().store(&second).unwrap();

        // full hash, other trace, then a prefix of the first again
        let selected = analysis
            .with_traces([
                first.content_hash.clone(),
                second.content_hash.clone(),
                first.content_hash[..10].to_string(),
            ])
            .traces()
            .unwrap();
        let hashes: Vec<&str> = selected.iter().map(|t| t.content_hash.as_str()).collect();
        assert_eq!(hashes, vec![first.content_hash.as_str(), second.content_hash.as_str()]);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_empty_cache_everything_orphaned() {
        let root = create_project("empty");
        let report = Ghostbust::new(&root)
            .with_cache_dir(".cache")
            .with_policy(ExclusionPolicy::none())
            .orphans()
            .unwrap();
        assert_eq!(report.orphans.len(), 2);
        assert_eq!(report.stats.traces, 0);
        fs::remove_dir_all(&root).ok();
    }
}
