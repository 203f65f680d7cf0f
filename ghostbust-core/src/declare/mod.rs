//! Static extraction of declared callables from Python sources.
//!
//! # Components
//!
//! - `extractor`: walks tree-sitter syntax trees and records every `def`
//! - `module_path`: module names from package layout, `__qualname__`-style
//!   scope rendering
//!
//! # Example Usage
//!
//! ```ignore
//! use ghostbust_core::declare::extract_declarations;
//!
//! let decls = extract_declarations(&[PathBuf::from("app.py")])?;
//! for d in &decls {
//!     println!("{} at {}:{}", d.qualified_name, d.source_file.display(), d.line_number);
//! }
//! ```

pub mod extractor;
pub mod module_path;

pub use extractor::{extract_declarations, extract_file, extract_from_source, CallableDeclaration};
pub use module_path::{module_name, ScopeKind, ScopeStack};
