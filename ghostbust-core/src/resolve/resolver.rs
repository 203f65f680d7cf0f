//! Set reconciliation of declared callables against observed invocations.
//!
//! orphans = declared - excluded - invoked, where "invoked" is the union of
//! normalized record keys over every trace considered.
//!
//! Declarations in files that no trace ever touched are all orphans: there is
//! no evidence of their use.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::normalize::{CallableKey, PathNormalizer};
use super::policy::ExclusionPolicy;
use crate::declare::CallableDeclaration;
use crate::trace::Trace;

/// Counters describing one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanStats {
    pub declared: usize,
    pub excluded: usize,
    pub invoked: usize,
    pub orphans: usize,
    pub traces: usize,
    pub partial_traces: usize,
}

/// Declared callables with no observed invocation, ordered by file then line.
#[derive(Debug, Clone, Serialize)]
pub struct OrphanReport {
    pub orphans: Vec<CallableDeclaration>,
    pub stats: OrphanStats,
    /// Hashes of traces that came from faulted or interrupted runs
    pub partial_hashes: Vec<String>,
}

impl OrphanReport {
    /// True when some evidence came from runs that did not complete.
    pub fn has_partial_evidence(&self) -> bool {
        !self.partial_hashes.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }
}

/// Reconciles declarations with traces under an exclusion policy.
pub struct OrphanResolver<'p> {
    policy: &'p ExclusionPolicy,
    /// Directory that relative declaration paths are interpreted against
    base_dir: PathBuf,
}

impl<'p> OrphanResolver<'p> {
    /// Resolver interpreting relative declaration paths against the current
    /// directory.
    pub fn new(policy: &'p ExclusionPolicy) -> Self {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self { policy, base_dir }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Union of invocation keys across `traces`.
    fn invoked_keys(&self, traces: &[Trace], normalizer: &mut PathNormalizer) -> HashSet<CallableKey> {
        let mut invoked = HashSet::new();
        for trace in traces {
            let base: &Path = &trace.working_dir;
            invoked.extend(
                trace
                    .records
                    .iter()
                    .filter(|r| r.calls > 0)
                    .filter_map(|r| normalizer.record_key(r, base)),
            );
        }
        invoked
    }

    pub fn resolve(&self, declarations: &[CallableDeclaration], traces: &[Trace]) -> OrphanReport {
        let mut normalizer = PathNormalizer::new();
        let invoked = self.invoked_keys(traces, &mut normalizer);

        let mut stats = OrphanStats {
            declared: declarations.len(),
            traces: traces.len(),
            ..Default::default()
        };

        let partial_hashes: Vec<String> = traces
            .iter()
            .filter(|t| t.partial)
            .map(|t| t.content_hash.clone())
            .collect();
        stats.partial_traces = partial_hashes.len();
        if !partial_hashes.is_empty() {
            warn!(
                partial = partial_hashes.len(),
                "resolving against partial traces; some orphans may be false positives"
            );
        }

        let mut orphans = Vec::new();
        for decl in declarations {
            if let Some(reason) = self.policy.exclusion_reason(decl) {
                debug!(name = %decl.qualified_name, ?reason, "excluded");
                stats.excluded += 1;
                continue;
            }
            let key = normalizer.declaration_key(decl, &self.base_dir);
            if invoked.contains(&key) {
                stats.invoked += 1;
            } else {
                orphans.push(decl.clone());
            }
        }

        orphans.sort_by(|a, b| {
            a.source_file
                .cmp(&b.source_file)
                .then(a.line_number.cmp(&b.line_number))
                .then_with(|| a.qualified_name.cmp(&b.qualified_name))
        });
        stats.orphans = orphans.len();

        debug!(?stats, "resolved orphans");
        OrphanReport {
            orphans,
            stats,
            partial_hashes,
        }
    }
}

/// Compute the orphan report for `declarations` against `traces`.
pub fn resolve_orphans(
    declarations: &[CallableDeclaration],
    traces: &[Trace],
    policy: &ExclusionPolicy,
) -> OrphanReport {
    OrphanResolver::new(policy).resolve(declarations, traces)
}
