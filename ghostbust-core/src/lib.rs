//! ghostbust-core: runtime dead-code detection for Python programs.
//!
//! A script is executed under the interpreter's deterministic profiler and
//! every function invocation is recorded as a [`Trace`]. Traces are stored in
//! a content-addressed cache. Separately, Python sources are parsed and every
//! `def` becomes a [`CallableDeclaration`]. Declarations that no trace ever
//! invoked are reported as orphans.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ghostbust_core::prelude::*;
//!
//! let cache = TraceCache::open(".ghostbust");
//! match profile(Path::new("app.py"), &ProfileOptions::default()) {
//!     Ok(trace) => { cache.store(&trace)?; }
//!     Err(e) => {
//!         if let Some(partial) = e.into_partial_trace() {
//!             cache.store(&partial)?;
//!         }
//!     }
//! }
//!
//! let report = Ghostbust::new(".").with_patterns(["app.py"]).orphans()?;
//! ```
//!
//! # Module Organization
//!
//! - [`trace`]: Profiled execution and the trace model
//! - [`cache`]: Content-addressed trace store with atomic writes
//! - [`declare`]: Syntax-tree extraction of declared callables
//! - [`resolve`]: Key normalization, exclusion policy and orphan resolution
//! - [`scan`]: Source file discovery
//! - [`report`]: Plain text and JSON output
//! - [`builder`]: Fluent builder API
//! - [`error`]: Typed error handling

pub mod builder;
pub mod cache;
pub mod config;
pub mod declare;
pub mod error;
pub mod logging;
pub mod pattern;
pub mod prelude;
pub mod report;
pub mod resolve;
pub mod scan;
pub mod trace;

// ============================================================================
// Explicit Re-exports
// ============================================================================

// Error types
pub use error::{GhostbustError, GhostbustResult, IoResultExt};

// Builder API
pub use builder::Ghostbust;

// Cache
pub use cache::{content_hash, file_hash, CacheEntry, CacheMetadata, TraceCache};

// Configuration
pub use config::{load_config, GhostbustConfig, CONFIG_FILE};

// Declarations
pub use declare::{extract_declarations, extract_file, extract_from_source, CallableDeclaration};

// Logging
pub use logging::{init_structured_logging, LogFormat};

// Reporting
pub use report::{print_json, print_plain, render_cache_list, render_stats};

// Resolution
pub use resolve::{
    resolve_orphans, ExclusionPolicy, ExclusionReason, OrphanReport, OrphanResolver, OrphanStats,
};

// File scanning
pub use scan::{gather_py_files, gather_sources};

// Tracing
pub use trace::{profile, top_records, InvocationRecord, ProfileOptions, SortKey, Trace};
