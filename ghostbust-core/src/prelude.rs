//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use ghostbust_core::prelude::*;
//! ```

// Errors
pub use crate::error::{GhostbustError, GhostbustResult};

// Profiling
pub use crate::trace::{profile, InvocationRecord, ProfileOptions, Trace};

// Cache
pub use crate::cache::{content_hash, TraceCache};

// Declarations
pub use crate::declare::{extract_declarations, CallableDeclaration};

// Resolution
pub use crate::resolve::{resolve_orphans, ExclusionPolicy, OrphanReport};

// File discovery
pub use crate::scan::gather_sources;

// Configuration
pub use crate::config::{load_config, GhostbustConfig};

// Builder API
pub use crate::builder::Ghostbust;
