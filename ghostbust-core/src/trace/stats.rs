//! Ordering of invocation records for inspection, mirroring the profiler's
//! own statistics listing.

use std::cmp::Ordering;
use std::str::FromStr;

use super::model::{InvocationRecord, Trace};
use crate::error::GhostbustError;

/// Column to sort profile statistics by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Number of calls, most first
    Calls,
    /// Self time, largest first
    TotTime,
    /// Self time per call, largest first
    PerCall,
    /// Cumulative time, largest first
    #[default]
    CumTime,
    /// File name, then line, ascending
    FileName,
}

impl SortKey {
    /// All accepted names, for help text.
    pub const NAMES: &'static [&'static str] = &["ncalls", "tottime", "percall", "cumtime", "filename"];

    /// Profiler name of this column.
    pub fn name(self) -> &'static str {
        match self {
            Self::Calls => "ncalls",
            Self::TotTime => "tottime",
            Self::PerCall => "percall",
            Self::CumTime => "cumtime",
            Self::FileName => "filename",
        }
    }

    fn compare(self, a: &InvocationRecord, b: &InvocationRecord) -> Ordering {
        let desc = |x: f64, y: f64| y.partial_cmp(&x).unwrap_or(Ordering::Equal);
        match self {
            Self::Calls => b.calls.cmp(&a.calls),
            Self::TotTime => desc(a.self_time, b.self_time),
            Self::PerCall => desc(a.per_call(), b.per_call()),
            Self::CumTime => desc(a.cumulative_time, b.cumulative_time),
            Self::FileName => a.file.cmp(&b.file).then(a.line.cmp(&b.line)),
        }
    }
}

impl FromStr for SortKey {
    type Err = GhostbustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ncalls" | "calls" => Ok(Self::Calls),
            "tottime" => Ok(Self::TotTime),
            "percall" => Ok(Self::PerCall),
            "cumtime" | "cumulative" => Ok(Self::CumTime),
            "filename" | "file" => Ok(Self::FileName),
            other => Err(GhostbustError::invalid_argument(format!(
                "unknown sort key '{}', expected one of: {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

/// The `limit` highest-ranked records of `trace` under `sort`.
///
/// Ties keep the profiler's original order.
pub fn top_records(trace: &Trace, sort: SortKey, limit: usize) -> Vec<&InvocationRecord> {
    let mut records: Vec<&InvocationRecord> = trace.records.iter().collect();
    records.sort_by(|a, b| sort.compare(a, b));
    records.truncate(limit);
    records
}
