//! Exclusion policy: declarations that are legitimately never called directly.
//!
//! Built-in rules:
//! - Dunder/magic methods (`__init__`, `__eq__`, ...), invoked by the runtime
//! - Entry points (`main` by default), invoked from outside the traced run
//! - Stubs (body is only a docstring, `pass`, `...` or `raise NotImplementedError`)
//! - Decorators whose targets are invoked indirectly (property accessors,
//!   abstract methods, overload signatures)
//!
//! User patterns match bare or qualified names and decorator callees.

use regex::Regex;
use serde::Serialize;

use crate::declare::CallableDeclaration;
use crate::error::GhostbustResult;
use crate::pattern::glob_to_regex;

/// Entry-point names excluded by default.
pub const DEFAULT_ENTRY_POINTS: &[&str] = &["main"];

/// Decorators excluded by default.
pub const DEFAULT_DECORATORS: &[&str] = &[
    "property",
    "*.setter",
    "*.getter",
    "*.deleter",
    "abstractmethod",
    "abc.abstractmethod",
    "overload",
    "typing.overload",
];

/// Why a declaration was left out of orphan consideration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum ExclusionReason {
    Dunder,
    EntryPoint(String),
    Stub,
    Name(String),
    Decorator(String),
}

/// A glob pattern kept next to its compiled form for reporting.
#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    fn new(source: &str) -> GhostbustResult<Self> {
        Ok(Self {
            source: source.to_string(),
            regex: glob_to_regex(source, '.')?,
        })
    }

    fn compile<S: AsRef<str>>(sources: &[S]) -> GhostbustResult<Vec<Self>> {
        sources.iter().map(|s| Self::new(s.as_ref())).collect()
    }
}

/// Configurable rules removing declarations from orphan consideration.
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    pub exclude_dunder: bool,
    pub exclude_stubs: bool,
    entry_points: Vec<Pattern>,
    names: Vec<Pattern>,
    decorators: Vec<Pattern>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExclusionPolicy {
    /// Exclude nothing: every uncalled declaration is an orphan.
    pub fn none() -> Self {
        Self {
            exclude_dunder: false,
            exclude_stubs: false,
            entry_points: Vec::new(),
            names: Vec::new(),
            decorators: Vec::new(),
        }
    }

    /// Dunders, stubs, `main`, and the default decorator list.
    pub fn standard() -> Self {
        let mut policy = Self::none();
        policy.exclude_dunder = true;
        policy.exclude_stubs = true;
        // Built-in patterns are plain identifiers and globs; they always compile.
        policy.entry_points = DEFAULT_ENTRY_POINTS
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();
        policy.decorators = DEFAULT_DECORATORS
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();
        policy
    }

    pub fn with_dunder(mut self, enabled: bool) -> Self {
        self.exclude_dunder = enabled;
        self
    }

    pub fn with_stubs(mut self, enabled: bool) -> Self {
        self.exclude_stubs = enabled;
        self
    }

    /// Replace the entry-point name patterns.
    pub fn with_entry_points<S: AsRef<str>>(mut self, patterns: &[S]) -> GhostbustResult<Self> {
        self.entry_points = Pattern::compile(patterns)?;
        Ok(self)
    }

    /// Add name patterns (matched against bare and qualified names).
    pub fn with_names<S: AsRef<str>>(mut self, patterns: &[S]) -> GhostbustResult<Self> {
        self.names.extend(Pattern::compile(patterns)?);
        Ok(self)
    }

    /// Add decorator patterns (matched against decorator callees).
    pub fn with_decorators<S: AsRef<str>>(mut self, patterns: &[S]) -> GhostbustResult<Self> {
        self.decorators.extend(Pattern::compile(patterns)?);
        Ok(self)
    }

    /// The first rule that excludes `decl`, if any.
    pub fn exclusion_reason(&self, decl: &CallableDeclaration) -> Option<ExclusionReason> {
        if self.exclude_dunder && is_dunder(&decl.name) {
            return Some(ExclusionReason::Dunder);
        }

        let matches_name =
            |p: &&Pattern| p.regex.is_match(&decl.name) || p.regex.is_match(&decl.qualified_name);

        if let Some(p) = self.entry_points.iter().find(matches_name) {
            return Some(ExclusionReason::EntryPoint(p.source.clone()));
        }
        if let Some(p) = self.names.iter().find(matches_name) {
            return Some(ExclusionReason::Name(p.source.clone()));
        }
        for callee in decl.decorator_names() {
            if let Some(p) = self.decorators.iter().find(|p| p.regex.is_match(callee)) {
                return Some(ExclusionReason::Decorator(p.source.clone()));
            }
        }
        if self.exclude_stubs && decl.is_stub {
            return Some(ExclusionReason::Stub);
        }
        None
    }

    pub fn is_excluded(&self, decl: &CallableDeclaration) -> bool {
        self.exclusion_reason(decl).is_some()
    }
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}
