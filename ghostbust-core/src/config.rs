//! Configuration loading from ghostbust.toml.
//!
//! ```toml
//! [cache]
//! dir = ".ghostbust"
//!
//! [profile]
//! python = "python3.12"
//!
//! [exclude]
//! names = ["test_*", "plugins.**"]
//! decorators = ["app.route", "pytest.fixture"]
//! entry_points = ["main", "cli"]
//! dunder = true
//! stubs = true
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;

use crate::error::{GhostbustError, GhostbustResult};
use crate::resolve::ExclusionPolicy;
use crate::trace::ProfileOptions;

/// Name of the configuration file looked up in the project root.
pub const CONFIG_FILE: &str = "ghostbust.toml";

/// Cache directory used when nothing else is configured.
pub const DEFAULT_CACHE_DIR: &str = ".ghostbust";

/// Main configuration structure for ghostbust.toml.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct GhostbustConfig {
    pub cache: Option<CacheConfig>,
    pub profile: Option<ProfileConfig>,
    pub exclude: Option<ExcludeConfig>,
}

/// Trace cache location.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Cache directory, relative to the project root
    pub dir: Option<PathBuf>,
}

/// Interpreter settings.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    /// Interpreter executable
    pub python: Option<String>,
}

/// Exclusion policy overrides.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ExcludeConfig {
    /// Name patterns to ignore (bare or qualified)
    pub names: Option<Vec<String>>,
    /// Decorators whose targets are invoked indirectly
    pub decorators: Option<Vec<String>>,
    /// Entry-point names; replaces the default `["main"]`
    pub entry_points: Option<Vec<String>>,
    pub dunder: Option<bool>,
    pub stubs: Option<bool>,
}

/// Loads configuration from ghostbust.toml if it exists.
pub fn load_config(root: &Path) -> Result<Option<GhostbustConfig>> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg = toml::from_str(&content)
        .with_context(|| format!("Invalid {}", path.display()))?;
    Ok(Some(cfg))
}

/// `GHOSTBUST_DIR` if set, otherwise `<root>/.ghostbust`.
pub fn default_cache_dir(root: &Path) -> PathBuf {
    match std::env::var_os("GHOSTBUST_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => root.join(DEFAULT_CACHE_DIR),
    }
}

impl GhostbustConfig {
    /// Cache directory: config file, then environment, then default.
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        match self.cache.as_ref().and_then(|c| c.dir.as_ref()) {
            Some(dir) => root.join(dir),
            None => default_cache_dir(root),
        }
    }

    /// Profiling options with the configured interpreter, if any.
    pub fn profile_options(&self) -> ProfileOptions {
        let options = ProfileOptions::default();
        match self.profile.as_ref().and_then(|p| p.python.as_ref()) {
            Some(python) => options.with_python(python.clone()),
            None => options,
        }
    }

    /// The standard policy adjusted by the `[exclude]` table.
    pub fn exclusion_policy(&self) -> GhostbustResult<ExclusionPolicy> {
        let policy = ExclusionPolicy::standard();
        let Some(ex) = &self.exclude else {
            return Ok(policy);
        };
        Self::apply_excludes(policy, ex)
            .map_err(|e| GhostbustError::config(CONFIG_FILE, e.to_string()))
    }

    fn apply_excludes(mut policy: ExclusionPolicy, ex: &ExcludeConfig) -> GhostbustResult<ExclusionPolicy> {
        if let Some(dunder) = ex.dunder {
            policy = policy.with_dunder(dunder);
        }
        if let Some(stubs) = ex.stubs {
            policy = policy.with_stubs(stubs);
        }
        if let Some(entry_points) = &ex.entry_points {
            policy = policy.with_entry_points(entry_points)?;
        }
        if let Some(names) = &ex.names {
            policy = policy.with_names(names)?;
        }
        if let Some(decorators) = &ex.decorators {
            policy = policy.with_decorators(decorators)?;
        }
        Ok(policy)
    }
}
