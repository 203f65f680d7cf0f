//! Runs a target script under `cProfile` and converts the result into a `Trace`.
//!
//! The interpreter is a child process. A small driver program (embedded from
//! `driver.py`) runs the script as `__main__`, catches whatever it raises, and
//! writes the profiler's stats as JSON to a scratch file that we read back.
//! The driver always writes what it captured, so a faulting script still
//! yields records up to the fault.
//!
//! The call blocks until the child exits. There is no retry. While the child
//! runs, SIGINT no longer terminates this process: the child receives the same
//! Ctrl-C from the terminal, its driver records the `KeyboardInterrupt` and
//! writes what it captured, and we return that partial trace as usual.

use chrono::Utc;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::model::{InvocationRecord, Trace};
use crate::cache::content_hash;
use crate::error::{GhostbustError, GhostbustResult, IoResultExt};

/// Interpreter used when neither the options nor `GHOSTBUST_PYTHON` name one.
pub const DEFAULT_PYTHON: &str = "python3";

const DRIVER: &str = include_str!("driver.py");

/// How to run the target script.
#[derive(Debug, Clone)]
pub struct ProfileOptions {
    /// Argument vector passed to the script after its own path
    pub args: Vec<String>,
    /// Working directory of the run (defaults to the current directory)
    pub working_dir: Option<PathBuf>,
    /// Interpreter executable
    pub python: String,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            working_dir: None,
            python: std::env::var("GHOSTBUST_PYTHON").unwrap_or_else(|_| DEFAULT_PYTHON.to_string()),
        }
    }
}

impl ProfileOptions {
    /// Set the script's argument vector.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Run the script from a specific directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Use a specific interpreter.
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }
}

/// What the driver writes back.
#[derive(Debug, Deserialize)]
struct DriverOutput {
    exit_code: i32,
    fault: Option<String>,
    records: Vec<InvocationRecord>,
}

/// Scratch file for the driver's output, removed on every exit path.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "ghostbust-trace.{}.{}.json",
            std::process::id(),
            nanos
        ));
        Self { path }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Catches SIGINT for as long as it lives.
struct InterruptLatch {
    flag: Arc<AtomicBool>,
    id: Option<signal_hook::SigId>,
}

impl InterruptLatch {
    fn install() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let id = match signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag)) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "could not install interrupt handler");
                None
            }
        };
        Self { flag, id }
    }

    fn interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Drop for InterruptLatch {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            signal_hook::low_level::unregister(id);
        }
    }
}

fn absolute(path: &Path) -> GhostbustResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().with_path(path)?;
    Ok(cwd.join(path))
}

/// Profile `script` to completion and return its trace.
///
/// `script` must be a readable source file: the cache key hashes its bytes,
/// so a directory or zip application is rejected with `GhostbustError::Io`.
///
/// A script that raises, exits non-zero, or is interrupted produces
/// `GhostbustError::ExecutionFault` carrying the partial trace
/// (`partial == true`). A child killed before its driver wrote anything
/// still yields a partial trace, with no records. A failure to start the
/// interpreter produces `GhostbustError::Launch`.
pub fn profile(script: &Path, options: &ProfileOptions) -> GhostbustResult<Trace> {
    let script = absolute(script)?;
    let bytes = fs::read(&script).with_path(&script)?;
    let extra: Vec<&[u8]> = options.args.iter().map(|a| a.as_bytes()).collect();
    let hash = content_hash(&bytes, &extra);

    let working_dir = match &options.working_dir {
        Some(dir) => absolute(dir)?,
        None => std::env::current_dir().with_path(&script)?,
    };

    info!(
        script = %script.display(),
        hash = %hash,
        python = %options.python,
        "profiling script"
    );

    let created_at = Utc::now();
    let scratch = ScratchFile::new();
    let latch = InterruptLatch::install();
    let status = Command::new(&options.python)
        .arg("-c")
        .arg(DRIVER)
        .arg(&scratch.path)
        .arg(&script)
        .args(&options.args)
        .current_dir(&working_dir)
        .status()
        .map_err(|e| GhostbustError::Launch {
            interpreter: options.python.clone(),
            script: script.clone(),
            message: e.to_string(),
        })?;

    let interrupted = latch.interrupted();
    drop(latch);
    if interrupted {
        warn!(script = %script.display(), "interrupted, collecting partial trace");
    }

    let output = read_driver_output(&scratch.path);
    let (records, exit_code, fault) = match output {
        Some(out) => (out.records, Some(out.exit_code), out.fault),
        None if interrupted => (
            Vec::new(),
            status.code(),
            Some(format!("{} after interrupt", describe_abnormal_exit(status))),
        ),
        None => (Vec::new(), status.code(), Some(describe_abnormal_exit(status))),
    };

    let fault = match fault {
        Some(f) => Some(f),
        None if !status.success() => Some(describe_abnormal_exit(status)),
        None => None,
    };

    let trace = Trace {
        content_hash: hash,
        script: script.clone(),
        args: options.args.clone(),
        working_dir,
        created_at,
        partial: fault.is_some(),
        exit_code,
        fault: fault.clone(),
        records,
    };

    debug!(records = trace.records.len(), partial = trace.partial, "trace captured");

    match fault {
        Some(message) => {
            warn!(
                script = %script.display(),
                records = trace.records.len(),
                fault = %message,
                "script faulted, keeping partial trace"
            );
            Err(GhostbustError::ExecutionFault {
                script,
                message,
                trace: Box::new(trace),
            })
        }
        None => Ok(trace),
    }
}

/// The driver may not have run to completion (killed, interpreter crash);
/// a missing or truncated file means nothing was captured.
fn read_driver_output(path: &Path) -> Option<DriverOutput> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(out) => Some(out),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable profiler output");
            None
        }
    }
}

fn describe_abnormal_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("interpreter exited with status {}", code),
        None => "interpreter terminated by signal".to_string(),
    }
}
