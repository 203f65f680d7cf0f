//! Content-addressed trace cache using SHA-256 keys.
//!
//! Each profiled run is stored as `<cache dir>/traces/<hash>.json`, where the
//! hash covers the script bytes and its arguments. Identical inputs are served
//! from disk instead of re-running the program.
//!
//! # Write safety
//!
//! - One writer per hash: a `<hash>.lock` file is created exclusively and
//!   removed by a guard on every exit path
//! - Atomic replace: entries are written to a temp file and renamed, so readers
//!   never observe a partially written entry
//! - Writes to different hashes never contend
//!
//! # Versioning
//!
//! Every entry carries a format version. Entries written by an incompatible
//! format are reported as corrupt rather than silently ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::error::{GhostbustError, GhostbustResult, IoResultExt};
use crate::trace::Trace;

/// Current cache format version. Increment when the entry layout changes.
const CACHE_VERSION: u32 = 1;

/// Ghostbust version that wrote an entry.
const GHOSTBUST_VERSION: &str = env!("CARGO_PKG_VERSION");

const TRACES_DIR: &str = "traces";
const ENTRY_EXT: &str = "json";
const LOCK_EXT: &str = "lock";

/// How often and how long a writer waits for another writer of the same hash.
const LOCK_ATTEMPTS: u32 = 50;
const LOCK_WAIT: Duration = Duration::from_millis(20);

/// Locks older than this were left behind by a crashed writer.
const STALE_LOCK_AGE: Duration = Duration::from_secs(120);

/// Compute the cache key for a script and the inputs that affect its behaviour.
///
/// Each part is length-prefixed so that moving bytes between the script and
/// its arguments always changes the key. The algorithm is unsalted and stable
/// across processes.
pub fn content_hash<S: AsRef<[u8]>>(script_bytes: &[u8], extra_inputs: &[S]) -> String {
    let mut sha = Sha256::new();
    sha.update((script_bytes.len() as u64).to_le_bytes());
    sha.update(script_bytes);
    for input in extra_inputs {
        let bytes = input.as_ref();
        sha.update((bytes.len() as u64).to_le_bytes());
        sha.update(bytes);
    }
    format!("{:x}", sha.finalize())
}

/// Hash a script file on disk together with its arguments.
pub fn file_hash<S: AsRef<[u8]>>(script: &Path, args: &[S]) -> GhostbustResult<String> {
    let bytes = fs::read(script).with_path(script)?;
    Ok(content_hash(&bytes, args))
}

/// Entry metadata for version checking.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheMetadata {
    /// Cache format version
    pub cache_version: u32,
    /// Ghostbust version that wrote this entry
    pub ghostbust_version: String,
    /// Unix seconds when the entry was written
    #[serde(default)]
    pub stored_at: u64,
}

impl CacheMetadata {
    /// Create metadata for the current environment.
    pub fn current() -> Self {
        let stored_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            cache_version: CACHE_VERSION,
            ghostbust_version: GHOSTBUST_VERSION.to_string(),
            stored_at,
        }
    }

    /// Check if an entry can be read by this version.
    pub fn is_compatible(&self) -> bool {
        self.cache_version == CACHE_VERSION
    }
}

/// On-disk form of one cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    metadata: CacheMetadata,
    trace: Trace,
}

/// Summary of a cached trace for listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub hash: String,
    pub script: PathBuf,
    pub args: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub partial: bool,
    pub record_count: usize,
}

impl CacheEntry {
    fn from_trace(trace: &Trace) -> Self {
        Self {
            hash: trace.content_hash.clone(),
            script: trace.script.clone(),
            args: trace.args.clone(),
            created_at: trace.created_at,
            partial: trace.partial,
            record_count: trace.records.len(),
        }
    }
}

/// Exclusive writer lock for one hash; released when dropped.
struct WriteLock {
    path: PathBuf,
}

impl WriteLock {
    fn acquire(path: PathBuf, hash: &str) -> GhostbustResult<Self> {
        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if break_stale_lock(&path) {
                        warn!(hash = %hash, "removed stale cache lock");
                        continue;
                    }
                    thread::sleep(LOCK_WAIT);
                }
                Err(e) => return Err(GhostbustError::io(&path, e)),
            }
        }
        Err(GhostbustError::CacheLocked {
            hash: hash.to_string(),
        })
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn is_stale(lock: &Path) -> bool {
    fs::metadata(lock)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

/// Take a stale lock out of the way.
///
/// The lock is moved aside rather than deleted so that two writers judging
/// the same lock stale cannot delete each other's replacement: only one
/// rename succeeds, and a lock that turns out to be fresh once moved is
/// linked back into place.
fn break_stale_lock(lock: &Path) -> bool {
    if !is_stale(lock) {
        return false;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let aside = lock.with_extension(format!("{}.{}.{}", LOCK_EXT, std::process::id(), nanos));
    if fs::rename(lock, &aside).is_err() {
        // another writer moved it first
        return false;
    }
    if is_stale(&aside) {
        let _ = fs::remove_file(&aside);
        return true;
    }
    if fs::hard_link(&aside, lock).is_err() {
        let _ = fs::rename(&aside, lock);
    }
    let _ = fs::remove_file(&aside);
    false
}

/// Hashes are used as file names; only lowercase hex is accepted.
fn validate_hash(hash: &str) -> GhostbustResult<()> {
    if hash.is_empty()
        || hash.len() > 64
        || !hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(GhostbustError::invalid_argument(format!(
            "'{}' is not a trace hash",
            hash
        )));
    }
    Ok(())
}

/// Handle to a trace cache directory.
///
/// Handles are cheap and hold no open files; every operation touches the
/// filesystem directly, so several handles (in one process or many) can share
/// a directory.
#[derive(Debug, Clone)]
pub struct TraceCache {
    root: PathBuf,
}

impl TraceCache {
    /// Open the cache rooted at `dir`. Nothing is created until the first store.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { root: dir.into() }
    }

    /// The cache's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn traces_dir(&self) -> PathBuf {
        self.root.join(TRACES_DIR)
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.traces_dir().join(format!("{}.{}", hash, ENTRY_EXT))
    }

    /// Persist `trace` under its content hash, replacing any existing entry.
    pub fn store(&self, trace: &Trace) -> GhostbustResult<PathBuf> {
        let hash = trace.content_hash.as_str();
        validate_hash(hash)?;

        let dir = self.traces_dir();
        fs::create_dir_all(&dir).with_path(&dir)?;

        let _lock = WriteLock::acquire(dir.join(format!("{}.{}", hash, LOCK_EXT)), hash)?;

        let envelope = CacheEnvelope {
            metadata: CacheMetadata::current(),
            trace: trace.clone(),
        };
        let json = serde_json::to_string(&envelope).map_err(|e| {
            GhostbustError::invalid_argument(format!("trace {} is not serializable: {}", hash, e))
        })?;

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let temp_path = dir.join(format!("{}.{}.{}.{}.tmp", hash, ENTRY_EXT, std::process::id(), nanos));
        let path = self.entry_path(hash);

        fs::write(&temp_path, &json).with_path(&temp_path)?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(GhostbustError::io(&path, e));
        }

        info!(
            hash = %hash,
            script = %trace.script.display(),
            records = trace.records.len(),
            partial = trace.partial,
            "stored trace"
        );
        Ok(path)
    }

    /// Load the trace stored under `hash`.
    ///
    /// A missing entry is `NotFound`; an unreadable one is `CacheCorruption`.
    pub fn retrieve(&self, hash: &str) -> GhostbustResult<Trace> {
        validate_hash(hash)?;
        let path = self.entry_path(hash);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(GhostbustError::not_found(hash));
            }
            Err(e) => return Err(GhostbustError::io(&path, e)),
        };

        let envelope: CacheEnvelope = serde_json::from_str(&text)
            .map_err(|e| GhostbustError::corruption(hash, &path, e.to_string()))?;

        if !envelope.metadata.is_compatible() {
            return Err(GhostbustError::corruption(
                hash,
                &path,
                format!(
                    "written by cache format v{} ({}), this build reads v{}",
                    envelope.metadata.cache_version,
                    envelope.metadata.ghostbust_version,
                    CACHE_VERSION
                ),
            ));
        }
        if envelope.trace.content_hash != hash {
            return Err(GhostbustError::corruption(
                hash,
                &path,
                format!("entry holds trace {}", envelope.trace.content_hash),
            ));
        }

        debug!(hash = %hash, records = envelope.trace.records.len(), "retrieved trace");
        Ok(envelope.trace)
    }

    /// Whether an entry exists for `hash`.
    pub fn contains(&self, hash: &str) -> bool {
        validate_hash(hash).is_ok() && self.entry_path(hash).is_file()
    }

    /// Hashes of all stored entries, unordered.
    fn hashes(&self) -> GhostbustResult<Vec<String>> {
        let dir = self.traces_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GhostbustError::io(&dir, e)),
        };

        let mut hashes = Vec::new();
        for entry in entries {
            let path = entry.with_path(&dir)?.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if validate_hash(stem).is_ok() {
                        hashes.push(stem.to_string());
                    }
                }
            }
        }
        Ok(hashes)
    }

    /// Every stored trace, newest first.
    pub fn load_all(&self) -> GhostbustResult<Vec<Trace>> {
        let mut traces = self
            .hashes()?
            .iter()
            .map(|h| self.retrieve(h))
            .collect::<GhostbustResult<Vec<_>>>()?;
        traces.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(traces)
    }

    /// Summaries of every stored trace, newest first.
    pub fn list(&self) -> GhostbustResult<Vec<CacheEntry>> {
        Ok(self.load_all()?.iter().map(CacheEntry::from_trace).collect())
    }

    /// Expand a unique hash prefix to the full stored hash.
    pub fn resolve_hash(&self, prefix: &str) -> GhostbustResult<String> {
        validate_hash(prefix)?;
        let mut matches: Vec<String> = self
            .hashes()?
            .into_iter()
            .filter(|h| h.starts_with(prefix))
            .collect();
        match matches.len() {
            0 => Err(GhostbustError::not_found(prefix)),
            1 => Ok(matches.remove(0)),
            n => Err(GhostbustError::invalid_argument(format!(
                "hash prefix '{}' is ambiguous ({} entries)",
                prefix, n
            ))),
        }
    }

    /// Remove the entry for `hash`.
    pub fn evict(&self, hash: &str) -> GhostbustResult<()> {
        validate_hash(hash)?;
        let path = self.entry_path(hash);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(hash = %hash, "evicted trace");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(GhostbustError::not_found(hash)),
            Err(e) => Err(GhostbustError::io(&path, e)),
        }
    }

    /// Remove every entry. Clearing an empty or missing cache is a no-op.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self) -> GhostbustResult<usize> {
        let dir = self.traces_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(GhostbustError::io(&dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry.with_path(&dir)?.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(ENTRY_EXT) => {
                    fs::remove_file(&path).with_path(&path)?;
                    removed += 1;
                }
                Some("tmp") => {
                    let _ = fs::remove_file(&path);
                }
                _ => {}
            }
        }

        info!(removed, cache = %self.root.display(), "cleared trace cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::InvocationRecord;
    use chrono::TimeZone;

    fn create_temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("ghostbust_cache_test")
            .join(format!("{}_{}", name, std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_trace(script: &str, seconds: i64) -> Trace {
        Trace {
            content_hash: content_hash(script.as_bytes(), &[] as &[&str]),
            script: PathBuf::from(format!("/work/{}.py", script)),
            args: Vec::new(),
            working_dir: PathBuf::from("/work"),
            created_at: Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap(),
            partial: false,
            exit_code: Some(0),
            fault: None,
            records: vec![InvocationRecord {
                file: format!("/work/{}.py", script),
                line: 1,
                function: "called".to_string(),
                calls: 1,
                primitive_calls: 1,
                self_time: 0.001,
                cumulative_time: 0.002,
            }],
        }
    }

    #[test]
    fn test_content_hash_deterministic() {
        let h1 = content_hash(b"def f(): pass\n", &["--flag"]);
        let h2 = content_hash(b"def f(): pass\n", &["--flag"]);
        assert_eq!(h1, h2);
        // SHA-256 produces 64 hex characters
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_content_hash_one_byte_difference() {
        let h1 = content_hash(b"def f(): pass\n", &[] as &[&str]);
        let h2 = content_hash(b"def g(): pass\n", &[] as &[&str]);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_content_hash_arguments_matter() {
        let bare = content_hash(b"print(1)", &[] as &[&str]);
        let with_arg = content_hash(b"print(1)", &["x"]);
        assert_ne!(bare, with_arg);

        // Moving bytes between script and arguments changes the key
        let a = content_hash(b"ab", &["c"]);
        let b = content_hash(b"a", &["bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_file_hash_matches_content_hash() {
        let dir = create_temp_dir("file_hash");
        let script = dir.join("s.py");
        fs::write(&script, "print('hi')\n").unwrap();
        assert_eq!(
            file_hash(&script, &["a"]).unwrap(),
            content_hash(b"print('hi')\n", &["a"])
        );
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_store_then_retrieve() {
        let dir = create_temp_dir("store_retrieve");
        let cache = TraceCache::open(&dir);
        let trace = sample_trace("app", 0);

        cache.store(&trace).unwrap();
        let loaded = cache.retrieve(&trace.content_hash).unwrap();
        assert_eq!(loaded.records, trace.records);
        assert_eq!(loaded, trace);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_store_overwrites_same_hash() {
        let dir = create_temp_dir("overwrite");
        let cache = TraceCache::open(&dir);
        let first = sample_trace("app", 0);
        let mut second = first.clone();
        second.records[0].calls = 7;

        cache.store(&first).unwrap();
        cache.store(&second).unwrap();

        let loaded = cache.retrieve(&first.content_hash).unwrap();
        assert_eq!(loaded.records[0].calls, 7);
        assert_eq!(cache.list().unwrap().len(), 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_retrieve_empty_cache_not_found() {
        let dir = create_temp_dir("empty_retrieve");
        let cache = TraceCache::open(&dir);
        let hash = content_hash(b"anything", &[] as &[&str]);

        let err = cache.retrieve(&hash).unwrap_err();
        assert!(matches!(err, GhostbustError::NotFound { .. }));
        assert_eq!(err.hash(), Some(hash.as_str()));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_retrieve_corrupt_entry() {
        let dir = create_temp_dir("corrupt");
        let cache = TraceCache::open(&dir);
        let hash = content_hash(b"broken", &[] as &[&str]);
        fs::create_dir_all(dir.join(TRACES_DIR)).unwrap();
        fs::write(cache.entry_path(&hash), "{ not valid json ").unwrap();

        let err = cache.retrieve(&hash).unwrap_err();
        assert!(matches!(err, GhostbustError::CacheCorruption { .. }));

        // Listing surfaces the corruption too
        assert!(matches!(
            cache.list().unwrap_err(),
            GhostbustError::CacheCorruption { .. }
        ));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_retrieve_incompatible_version() {
        let dir = create_temp_dir("incompatible");
        let cache = TraceCache::open(&dir);
        let trace = sample_trace("old", 0);
        let path = cache.store(&trace).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["metadata"]["cache_version"] = serde_json::json!(CACHE_VERSION + 1);
        fs::write(&path, value.to_string()).unwrap();

        let err = cache.retrieve(&trace.content_hash).unwrap_err();
        assert!(matches!(err, GhostbustError::CacheCorruption { .. }));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_retrieve_rejects_path_like_hash() {
        let dir = create_temp_dir("bad_hash");
        let cache = TraceCache::open(&dir);
        let err = cache.retrieve("../../etc/passwd").unwrap_err();
        assert!(matches!(err, GhostbustError::InvalidArgument { .. }));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_list_newest_first() {
        let dir = create_temp_dir("list_order");
        let cache = TraceCache::open(&dir);
        cache.store(&sample_trace("older", 0)).unwrap();
        cache.store(&sample_trace("newer", 60)).unwrap();
        cache.store(&sample_trace("middle", 30)).unwrap();

        let scripts: Vec<String> = cache
            .list()
            .unwrap()
            .iter()
            .map(|e| e.script.file_stem().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(scripts, vec!["newer", "middle", "older"]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_clear_empty_cache_is_noop() {
        let dir = create_temp_dir("clear_empty");
        let cache = TraceCache::open(dir.join("never-created"));

        assert_eq!(cache.clear().unwrap(), 0);
        assert!(cache.list().unwrap().is_empty());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_clear_removes_entries() {
        let dir = create_temp_dir("clear_full");
        let cache = TraceCache::open(&dir);
        cache.store(&sample_trace("a", 0)).unwrap();
        cache.store(&sample_trace("b", 1)).unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.list().unwrap().is_empty());
        assert_eq!(cache.clear().unwrap(), 0);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_evict_single_entry() {
        let dir = create_temp_dir("evict");
        let cache = TraceCache::open(&dir);
        let keep = sample_trace("keep", 0);
        let drop = sample_trace("drop", 1);
        cache.store(&keep).unwrap();
        cache.store(&drop).unwrap();

        cache.evict(&drop.content_hash).unwrap();
        assert!(cache.contains(&keep.content_hash));
        assert!(!cache.contains(&drop.content_hash));
        assert!(matches!(
            cache.evict(&drop.content_hash).unwrap_err(),
            GhostbustError::NotFound { .. }
        ));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve_hash_prefix() {
        let dir = create_temp_dir("prefix");
        let cache = TraceCache::open(&dir);
        let trace = sample_trace("app", 0);
        cache.store(&trace).unwrap();

        let resolved = cache.resolve_hash(&trace.content_hash[..8]).unwrap();
        assert_eq!(resolved, trace.content_hash);

        fs::remove_dir_all(&dir).ok();
    }

    // === Write Safety Tests ===

    #[test]
    fn test_no_temp_or_lock_file_left() {
        let dir = create_temp_dir("no_leftovers");
        let cache = TraceCache::open(&dir);
        cache.store(&sample_trace("app", 0)).unwrap();

        for entry in fs::read_dir(dir.join(TRACES_DIR)).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".tmp"), "Temp file left behind: {}", name);
            assert!(!name.ends_with(".lock"), "Lock left behind: {}", name);
        }

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = create_temp_dir("stale_lock");
        let cache = TraceCache::open(&dir);
        let trace = sample_trace("app", 0);

        let traces = dir.join(TRACES_DIR);
        fs::create_dir_all(&traces).unwrap();
        let lock_path = traces.join(format!("{}.{}", trace.content_hash, LOCK_EXT));
        let file = fs::File::create(&lock_path).unwrap();
        file.set_modified(SystemTime::now() - STALE_LOCK_AGE * 2).unwrap();
        drop(file);

        cache.store(&trace).unwrap();
        assert!(cache.contains(&trace.content_hash));

        let leftovers: Vec<String> = fs::read_dir(&traces)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.contains(LOCK_EXT))
            .collect();
        assert!(leftovers.is_empty(), "lock files left behind: {:?}", leftovers);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_fresh_lock_survives_stale_check() {
        let dir = create_temp_dir("fresh_lock");
        let lock_path = dir.join(format!("abc.{}", LOCK_EXT));
        fs::write(&lock_path, "").unwrap();

        assert!(!break_stale_lock(&lock_path));
        assert!(lock_path.exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_stale_lock_broken_once() {
        let dir = create_temp_dir("stale_once");
        let lock_path = dir.join(format!("abc.{}", LOCK_EXT));
        let file = fs::File::create(&lock_path).unwrap();
        file.set_modified(SystemTime::now() - STALE_LOCK_AGE * 2).unwrap();
        drop(file);

        assert!(break_stale_lock(&lock_path));
        // a second writer that judged the same lock stale finds nothing to move
        assert!(!break_stale_lock(&lock_path));
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_held_lock_blocks_writer() {
        let dir = create_temp_dir("held_lock");
        let cache = TraceCache::open(&dir);
        let trace = sample_trace("app", 0);
        let traces = dir.join(TRACES_DIR);
        fs::create_dir_all(&traces).unwrap();

        let lock_path = traces.join(format!("{}.{}", trace.content_hash, LOCK_EXT));
        let held = WriteLock::acquire(lock_path, &trace.content_hash).unwrap();

        let err = cache.store(&trace).unwrap_err();
        assert!(matches!(err, GhostbustError::CacheLocked { .. }));

        drop(held);
        cache.store(&trace).unwrap();

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_concurrent_writers_same_hash() {
        let dir = create_temp_dir("concurrent");
        let cache = TraceCache::open(&dir);
        let trace = sample_trace("app", 0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let trace = trace.clone();
                thread::spawn(move || cache.store(&trace))
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }

        assert_eq!(cache.retrieve(&trace.content_hash).unwrap(), trace);

        fs::remove_dir_all(&dir).ok();
    }
}
