//! Execution tracing: run a script under the interpreter's profiler and
//! capture which callables were entered.
//!
//! # Components
//!
//! - `model`: `Trace` and `InvocationRecord`, the profiler-independent view
//! - `tracer`: drives the interpreter as a child process and builds a `Trace`
//! - `stats`: sorting and truncation of records for inspection
//!
//! The profiler's own output format never leaves this module; everything
//! downstream works on `InvocationRecord`.

pub mod model;
pub mod stats;
pub mod tracer;

pub use model::{InvocationRecord, Trace};
pub use stats::{top_records, SortKey};
pub use tracer::{profile, ProfileOptions, DEFAULT_PYTHON};
