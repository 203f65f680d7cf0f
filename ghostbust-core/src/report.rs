//! Output formatting - plaintext tables and JSON.

use serde_json::json;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::cache::CacheEntry;
use crate::declare::CallableDeclaration;
use crate::resolve::OrphanReport;
use crate::trace::{top_records, SortKey, Trace};

/// Width of the function-name column.
const NAME_WIDTH: usize = 28;
const INDENT: &str = "  ";

/// `path` relative to `base` when it lies below it, otherwise unchanged.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let canon = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    let (full, base) = (canon(path), canon(base));
    full.strip_prefix(&base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > NAME_WIDTH {
        let head: String = name.chars().take(NAME_WIDTH - 3).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

/// One row per declaration: name column, then `file:line`.
pub fn render_table(decls: &[CallableDeclaration], base: &Path) -> String {
    let mut out = String::new();
    for d in decls {
        let location = format!("{}:{}", relative_to(&d.source_file, base).display(), d.line_number);
        let _ = writeln!(
            out,
            "{}{:<width$} {}",
            INDENT,
            truncate_name(&d.name),
            location,
            width = NAME_WIDTH
        );
    }
    out
}

/// Prints orphans in plain text format.
pub fn print_plain(report: &OrphanReport, base: &Path) {
    if report.is_empty() {
        println!("No orphaned functions found.");
        return;
    }
    println!(
        "ORPHANED FUNCTIONS ({} of {} declared, {} excluded, {} trace(s)):",
        report.stats.orphans, report.stats.declared, report.stats.excluded, report.stats.traces
    );
    print!("{}", render_table(&report.orphans, base));
}

/// The JSON document for an orphan report.
pub fn report_json(report: &OrphanReport) -> serde_json::Value {
    json!({
        "orphans": report.orphans,
        "stats": report.stats,
        "partial_traces": report.partial_hashes,
    })
}

/// Prints orphans in JSON format.
pub fn print_json(report: &OrphanReport) {
    match serde_json::to_string_pretty(&report_json(report)) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("[WARN] JSON serialization failed: {}", e),
    }
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

/// Profiler-style statistics listing for a trace.
pub fn render_stats(trace: &Trace, sort: SortKey, limit: usize) -> String {
    let calls: u64 = trace.records.iter().map(|r| r.calls).sum();
    let primitive: u64 = trace.records.iter().map(|r| r.primitive_calls).sum();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}{} function calls ({} primitive calls) in {:.3} seconds",
        INDENT,
        calls,
        primitive,
        trace.total_time()
    );
    if trace.partial {
        let _ = writeln!(
            out,
            "{}PARTIAL RUN: {}",
            INDENT,
            trace.fault.as_deref().unwrap_or("run did not complete")
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{}Ordered by: {}", INDENT, sort.name());
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:>9} {:>8} {:>8} {:>8} {:>8} filename:lineno(function)",
        "ncalls", "tottime", "percall", "cumtime", "percall"
    );

    for r in top_records(trace, sort, limit) {
        let ncalls = if r.calls == r.primitive_calls {
            r.calls.to_string()
        } else {
            format!("{}/{}", r.calls, r.primitive_calls)
        };
        let cum_per_call = if r.primitive_calls == 0 {
            0.0
        } else {
            r.cumulative_time / r.primitive_calls as f64
        };
        let location = if r.file == "~" {
            r.identifier()
        } else {
            format!("{}:{}({})", file_name(&r.file), r.line, r.function)
        };
        let _ = writeln!(
            out,
            "{:>9} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {}",
            ncalls,
            r.self_time,
            r.per_call(),
            r.cumulative_time,
            cum_per_call,
            location
        );
    }
    out
}

/// One line per cache entry: short hash, date, script, flags.
pub fn render_cache_list(entries: &[CacheEntry], base: &Path) -> String {
    let mut out = String::new();
    for e in entries {
        let mut script = relative_to(&e.script, base).display().to_string();
        if !e.args.is_empty() {
            script.push(' ');
            script.push_str(&e.args.join(" "));
        }
        let _ = writeln!(
            out,
            "{}{}  {}  {}{}",
            INDENT,
            &e.hash[..e.hash.len().min(12)],
            e.created_at.format("%Y-%m-%d %H:%M:%S"),
            script,
            if e.partial { "  (partial)" } else { "" }
        );
    }
    out
}
