//! ghostbust CLI - runtime detection of orphaned Python functions.
//!
//! Workflow:
//! - `ghostbust profile app.py -- --flag` runs the script under the profiler
//!   and caches the trace
//! - `ghostbust orphans src` lists functions no cached trace ever invoked

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;

use ghostbust_core::report::render_table;
use ghostbust_core::{
    extract_declarations, file_hash, gather_sources, init_structured_logging, load_config,
    print_json, print_plain, profile, render_cache_list, render_stats, ExclusionPolicy, Ghostbust,
    GhostbustConfig, GhostbustError, LogFormat, SortKey, TraceCache,
};

const EMPTY_CACHE: &str = "Profiler cache is currently empty. Use \"ghostbust profile\" first.";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Runtime code analysis of orphaned (dead code) Python functions"
)]
pub struct Cli {
    /// Trace cache directory (overrides ghostbust.toml and GHOSTBUST_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Profile a Python script and add its trace to the cache
    Profile {
        script: PathBuf,

        /// Arguments passed to the script (after `--`)
        #[arg(last = true)]
        args: Vec<String>,

        #[command(flatten)]
        listing: Listing,

        /// Working directory for the run
        #[arg(long, value_name = "DIR")]
        cwd: Option<PathBuf>,

        /// Interpreter executable
        #[arg(long, value_name = "EXE")]
        python: Option<String>,
    },

    /// List the profiler stats for a cached script run
    Stats {
        script: PathBuf,

        /// Arguments the script was profiled with (after `--`)
        #[arg(last = true)]
        args: Vec<String>,

        #[command(flatten)]
        listing: Listing,
    },

    /// List scripts currently in the profiler cache
    Cache {
        /// Output entries in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove one cached trace by hash (or unique hash prefix)
    Evict { hash: String },

    /// Clear the profiler cache
    Clear,

    /// List functions declared within code sources
    Inspect {
        /// Files, directories or globs
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// List declared functions which are never used
    Orphans(OrphanArgs),
}

/// Options for the statistics listing.
#[derive(Args, Debug)]
struct Listing {
    /// Number of rows to show
    #[arg(short = 'n', long = "numlines", default_value_t = 25)]
    numlines: usize,

    /// Sort column: ncalls, tottime, percall, cumtime, filename
    #[arg(short = 's', long = "sortby", default_value = "cumtime")]
    sortby: SortKey,
}

#[derive(Args, Debug)]
struct OrphanArgs {
    /// Files, directories or globs
    #[arg(required = true)]
    patterns: Vec<String>,

    /// Only use these cached traces (hash or unique prefix); repeatable
    #[arg(long = "trace", value_name = "HASH")]
    traces: Vec<String>,

    /// Output results in JSON format
    #[arg(long)]
    json: bool,

    /// Report dunder methods instead of excluding them
    #[arg(long)]
    no_dunder: bool,

    /// Report stub functions instead of excluding them
    #[arg(long)]
    no_stubs: bool,

    /// Disable every exclusion rule, including ghostbust.toml
    #[arg(long)]
    all: bool,

    /// Additional name patterns to exclude (bare or qualified globs)
    #[arg(long, value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Additional decorators whose functions are excluded
    #[arg(long, value_name = "PATTERN")]
    exclude_decorator: Vec<String>,

    /// Entry-point names; replaces the configured list
    #[arg(long, value_name = "NAME")]
    entry_point: Vec<String>,
}

/// Shared state for every command.
struct Session {
    root: PathBuf,
    config: GhostbustConfig,
    cache_dir: PathBuf,
}

impl Session {
    fn load(cli: &Cli) -> Result<Self> {
        let root = std::env::current_dir().context("Failed to determine current directory")?;
        let config = load_config(&root)?.unwrap_or_default();
        let cache_dir = match &cli.cache_dir {
            Some(dir) => root.join(dir),
            None => config.cache_dir(&root),
        };
        debug!(root = %root.display(), cache_dir = %cache_dir.display(), "session ready");
        Ok(Self {
            root,
            config,
            cache_dir,
        })
    }

    fn cache(&self) -> TraceCache {
        TraceCache::open(&self.cache_dir)
    }
}

/// Configured policy adjusted by command-line flags.
fn exclusion_policy(config: &GhostbustConfig, args: &OrphanArgs) -> Result<ExclusionPolicy> {
    let mut policy = if args.all {
        ExclusionPolicy::none()
    } else {
        config.exclusion_policy()?
    };
    if args.no_dunder {
        policy = policy.with_dunder(false);
    }
    if args.no_stubs {
        policy = policy.with_stubs(false);
    }
    if !args.entry_point.is_empty() {
        policy = policy.with_entry_points(&args.entry_point)?;
    }
    Ok(policy
        .with_names(&args.exclude)?
        .with_decorators(&args.exclude_decorator)?)
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

fn cmd_profile(
    ctx: &Session,
    script: &Path,
    args: &[String],
    listing: &Listing,
    cwd: Option<&Path>,
    python: Option<&str>,
) -> Result<()> {
    let mut options = ctx.config.profile_options().with_args(args.to_vec());
    if let Some(dir) = cwd {
        options = options.with_working_dir(dir);
    }
    if let Some(python) = python {
        options = options.with_python(python);
    }

    eprintln!("Profiling {}...", script.display());
    let (trace, fault) = match profile(script, &options) {
        Ok(trace) => (trace, None),
        Err(GhostbustError::ExecutionFault { message, trace, .. }) => (*trace, Some(message)),
        Err(e) => return Err(e).context("Profiling failed"),
    };

    ctx.cache()
        .store(&trace)
        .with_context(|| format!("Failed to cache trace for {}", script.display()))?;
    print!("{}", render_stats(&trace, listing.sortby, listing.numlines));

    if let Some(message) = fault {
        eprintln!(
            "[WARN] {} did not complete ({}); partial trace cached as {}",
            script.display(),
            message,
            short(&trace.content_hash)
        );
        std::process::exit(trace.exit_code.filter(|c| *c != 0).unwrap_or(1));
    }
    Ok(())
}

fn cmd_stats(ctx: &Session, script: &Path, args: &[String], listing: &Listing) -> Result<()> {
    let lookup = file_hash(script, args).and_then(|hash| ctx.cache().retrieve(&hash));
    match lookup {
        Ok(trace) => {
            print!("{}", render_stats(&trace, listing.sortby, listing.numlines));
            Ok(())
        }
        // an unreadable script has no cache entry either
        Err(GhostbustError::NotFound { .. } | GhostbustError::Io { .. }) => {
            println!(
                "No cache entry for \"{}\".  Use \"ghostbust profile\" first.",
                script.display()
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_cache(ctx: &Session, json: bool) -> Result<()> {
    let entries = ctx.cache().list()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("{}", EMPTY_CACHE);
    } else {
        print!("{}", render_cache_list(&entries, &ctx.root));
    }
    Ok(())
}

fn cmd_evict(ctx: &Session, prefix: &str) -> Result<()> {
    let cache = ctx.cache();
    let hash = cache.resolve_hash(prefix)?;
    cache.evict(&hash)?;
    println!("Evicted {}", short(&hash));
    Ok(())
}

fn cmd_clear(ctx: &Session) -> Result<()> {
    let removed = ctx.cache().clear()?;
    println!("Removed {} cached trace(s).", removed);
    Ok(())
}

fn cmd_inspect(ctx: &Session, patterns: &[String]) -> Result<()> {
    let files = gather_sources(&ctx.root, patterns)?;
    let decls = extract_declarations(&files)?;
    print!("{}", render_table(&decls, &ctx.root));
    Ok(())
}

fn cmd_orphans(ctx: &Session, args: &OrphanArgs) -> Result<()> {
    let analysis = Ghostbust::new(&ctx.root)
        .with_cache_dir(&ctx.cache_dir)
        .with_patterns(args.patterns.iter().cloned())
        .with_policy(exclusion_policy(&ctx.config, args)?)
        .with_traces(args.traces.iter().cloned());

    let traces = analysis.traces()?;
    if traces.is_empty() {
        println!("{}", EMPTY_CACHE);
        return Ok(());
    }

    let decls = analysis.declarations()?;
    let report = analysis.resolve(&decls, &traces);

    if report.has_partial_evidence() {
        eprintln!(
            "[WARN] {} trace(s) came from runs that did not complete; some orphans may be false positives",
            report.partial_hashes.len()
        );
    }

    if args.json {
        print_json(&report);
    } else {
        print_plain(&report, &ctx.root);
    }

    std::process::exit(if report.is_empty() { 0 } else { 1 });
}

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] ghostbust internal error: {}", info);
        eprintln!("[PANIC] The process will exit with code 2.");
        std::process::exit(2);
    }));

    let cli = Cli::parse();

    init_structured_logging(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    let ctx = Session::load(&cli)?;

    match &cli.command {
        Command::Profile {
            script,
            args,
            listing,
            cwd,
            python,
        } => cmd_profile(&ctx, script, args, listing, cwd.as_deref(), python.as_deref()),
        Command::Stats {
            script,
            args,
            listing,
        } => cmd_stats(&ctx, script, args, listing),
        Command::Cache { json } => cmd_cache(&ctx, *json),
        Command::Evict { hash } => cmd_evict(&ctx, hash),
        Command::Clear => cmd_clear(&ctx),
        Command::Inspect { patterns } => cmd_inspect(&ctx, patterns),
        Command::Orphans(args) => cmd_orphans(&ctx, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghostbust_core::CallableDeclaration;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ghostbust").chain(args.iter().copied())).unwrap()
    }

    fn decl(name: &str) -> CallableDeclaration {
        CallableDeclaration {
            qualified_name: format!("app.{}", name),
            name: name.to_string(),
            source_file: PathBuf::from("app.py"),
            line_number: 1,
            code_line: 1,
            decorators: Vec::new(),
            is_method: false,
            is_async: false,
            is_stub: false,
        }
    }

    fn orphan_args(extra: &[&str]) -> OrphanArgs {
        let mut argv = vec!["orphans", "src"];
        argv.extend_from_slice(extra);
        match parse(&argv).command {
            Command::Orphans(args) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_profile_with_script_args() {
        let cli = parse(&["profile", "app.py", "-n", "10", "-s", "tottime", "--", "--fast", "-x"]);
        match cli.command {
            Command::Profile { script, args, listing, .. } => {
                assert_eq!(script, PathBuf::from("app.py"));
                assert_eq!(args, vec!["--fast", "-x"]);
                assert_eq!(listing.numlines, 10);
                assert_eq!(listing.sortby, SortKey::TotTime);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_listing_defaults() {
        match parse(&["stats", "app.py"]).command {
            Command::Stats { listing, args, .. } => {
                assert_eq!(listing.numlines, 25);
                assert_eq!(listing.sortby, SortKey::CumTime);
                assert!(args.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_sort_key_rejected() {
        let err = Cli::try_parse_from(["ghostbust", "stats", "app.py", "-s", "bogus"]).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["cache", "--cache-dir", "/tmp/traces", "--log-json"]);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/traces")));
        assert!(cli.log_json);
    }

    #[test]
    fn test_orphans_requires_pattern() {
        assert!(Cli::try_parse_from(["ghostbust", "orphans"]).is_err());
        assert!(Cli::try_parse_from(["ghostbust", "inspect"]).is_err());
    }

    #[test]
    fn test_orphans_repeated_traces() {
        let args = orphan_args(&["--trace", "abc", "--trace", "def", "--json"]);
        assert_eq!(args.traces, vec!["abc", "def"]);
        assert!(args.json);
    }

    #[test]
    fn test_policy_flags() {
        let config = GhostbustConfig::default();

        let standard = exclusion_policy(&config, &orphan_args(&[])).unwrap();
        assert!(standard.is_excluded(&decl("__repr__")));
        assert!(standard.is_excluded(&decl("main")));

        let no_dunder = exclusion_policy(&config, &orphan_args(&["--no-dunder"])).unwrap();
        assert!(!no_dunder.is_excluded(&decl("__repr__")));
        assert!(no_dunder.is_excluded(&decl("main")));

        let all = exclusion_policy(&config, &orphan_args(&["--all"])).unwrap();
        assert!(!all.is_excluded(&decl("main")));

        let custom = exclusion_policy(
            &config,
            &orphan_args(&["--exclude", "test_*", "--entry-point", "cli"]),
        )
        .unwrap();
        assert!(custom.is_excluded(&decl("test_login")));
        assert!(custom.is_excluded(&decl("cli")));
        assert!(!custom.is_excluded(&decl("main")));
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
        assert_eq!(short("abc"), "abc");
    }
}
