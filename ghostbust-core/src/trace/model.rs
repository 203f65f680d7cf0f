//! Trace data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One profiled callable: where it lives and how often / how long it ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// Source file as reported by the profiler (may be relative to the
    /// run's working directory, or a pseudo-file such as `~`)
    pub file: String,
    /// First line of the callable's code object (0 for built-ins)
    pub line: usize,
    /// Bare function name, or a pseudo-name such as `<module>`
    pub function: String,
    /// Total number of calls, recursive ones included
    pub calls: u64,
    /// Calls that were not induced via recursion
    #[serde(default)]
    pub primitive_calls: u64,
    /// Seconds spent in this callable excluding sub-calls
    pub self_time: f64,
    /// Seconds spent in this callable including sub-calls
    pub cumulative_time: f64,
}

impl InvocationRecord {
    /// Profiler-style identifier, `file:line(function)`.
    pub fn identifier(&self) -> String {
        format!("{}:{}({})", self.file, self.line, self.function)
    }

    /// Built-ins and synthetic frames have no source file to match against.
    pub fn is_synthetic(&self) -> bool {
        self.file == "~"
            || self.file.starts_with('<')
            || self.function.starts_with('<')
            || self.line == 0
    }

    /// Average self time per call.
    pub fn per_call(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.self_time / self.calls as f64
        }
    }
}

/// The full set of invocation records from one execution of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Cache key: hash over the script bytes and its arguments
    pub content_hash: String,
    /// Absolute path of the profiled script
    pub script: PathBuf,
    /// Arguments passed after the script path
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory of the run; relative record paths resolve against it
    pub working_dir: PathBuf,
    /// When the profiling run started
    pub created_at: DateTime<Utc>,
    /// True when the run faulted, was interrupted, or was killed
    #[serde(default)]
    pub partial: bool,
    /// Exit code of the script, if it exited normally
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Description of the fault for partial runs
    #[serde(default)]
    pub fault: Option<String>,
    /// Records in the profiler's native order
    pub records: Vec<InvocationRecord>,
}

impl Trace {
    /// Number of callables with at least one recorded call.
    pub fn invoked_count(&self) -> usize {
        self.records.iter().filter(|r| r.calls > 0).count()
    }

    /// Total profiled time (the sum of self times).
    pub fn total_time(&self) -> f64 {
        self.records.iter().map(|r| r.self_time).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file: &str, line: usize, function: &str) -> InvocationRecord {
        InvocationRecord {
            file: file.to_string(),
            line,
            function: function.to_string(),
            calls: 4,
            primitive_calls: 4,
            self_time: 0.5,
            cumulative_time: 1.0,
        }
    }

    #[test]
    fn test_identifier_format() {
        let r = record("app.py", 12, "handler");
        assert_eq!(r.identifier(), "app.py:12(handler)");
    }

    #[test]
    fn test_synthetic_records() {
        assert!(record("~", 0, "<built-in method builtins.print>").is_synthetic());
        assert!(record("<string>", 1, "<module>").is_synthetic());
        assert!(record("app.py", 1, "<module>").is_synthetic());
        assert!(!record("app.py", 3, "main").is_synthetic());
    }

    #[test]
    fn test_per_call() {
        let r = record("app.py", 3, "main");
        assert!((r.per_call() - 0.125).abs() < f64::EPSILON);

        let mut zero = r.clone();
        zero.calls = 0;
        assert_eq!(zero.per_call(), 0.0);
    }
}
