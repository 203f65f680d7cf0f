//! Orphan resolution: declared callables minus observed invocations.
//!
//! # Components
//!
//! - `normalize`: common key shape for declarations and profiler records
//! - `policy`: exclusion rules (dunders, entry points, stubs, decorators, patterns)
//! - `resolver`: the set difference and report
//!
//! Calls built from computed names (`getattr(obj, name)()`) are visible here
//! only if the profiler saw them run; the extractor never sees the call site.

pub mod normalize;
pub mod policy;
pub mod resolver;

pub use normalize::{lexical_clean, CallableKey, PathNormalizer};
pub use policy::{ExclusionPolicy, ExclusionReason, DEFAULT_DECORATORS, DEFAULT_ENTRY_POINTS};
pub use resolver::{resolve_orphans, OrphanReport, OrphanResolver, OrphanStats};
