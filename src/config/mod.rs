//! Startup configuration: discovery, parsing, and resolution into the
//! immutable settings the rest of the binary consumes.
//!
//! Resolution order:
//!   1. project-local `.toolbelt/config.toml` (under the current directory)
//!   2. user-level `{config_dir}/config.toml` (see `paths`)
//!   3. built-in defaults
//!
//! A missing file falls through to the next source; a file that exists but
//! does not parse is a startup error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::paths;
use crate::pipeline::Policy;

/// Default wall-clock budget for one pipeline run.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// The raw shape of `config.toml`.  All keys optional.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Pipeline wall-clock budget in seconds.
    pub timeout_secs: Option<u64>,
    /// Replaces the built-in whitelist entirely when present.
    /// An empty array means "deny everything".
    pub allow: Option<Vec<String>>,
    /// Overrides the memory directory for collaborator files.
    pub memory_dir: Option<PathBuf>,
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    ProjectLocal(PathBuf),
    User(PathBuf),
    BuiltIn,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProjectLocal(p) => write!(f, "project-local {}", p.display()),
            Self::User(p) => write!(f, "user {}", p.display()),
            Self::BuiltIn => write!(f, "built-in defaults"),
        }
    }
}

/// Fully-resolved process configuration, constructed once at startup.
#[derive(Debug)]
pub struct Settings {
    pub timeout: Duration,
    pub policy: Policy,
    pub memory_dir: PathBuf,
    pub source: ConfigSource,
}

/// Try to load a config file from `path`.  Returns `Ok(None)` if the file
/// does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or contains
/// invalid TOML.
pub fn try_load_file(path: &Path) -> anyhow::Result<Option<ConfigFile>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to read config file: {}", path.display())));
        }
    };
    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    Ok(Some(config))
}

/// Discover the first config file in priority order.
fn discover() -> anyhow::Result<(ConfigFile, ConfigSource)> {
    if let Ok(cwd) = std::env::current_dir() {
        let local = cwd.join(".toolbelt/config.toml");
        if let Some(cfg) = try_load_file(&local)? {
            return Ok((cfg, ConfigSource::ProjectLocal(local)));
        }
    }
    if let Some(user_dir) = paths::user_dir() {
        let user = user_dir.join("config.toml");
        if let Some(cfg) = try_load_file(&user)? {
            return Ok((cfg, ConfigSource::User(user)));
        }
    }
    Ok((ConfigFile::default(), ConfigSource::BuiltIn))
}

/// Resolve the memory directory: `TOOLBELT_MEMORY_DIR` env var, then the
/// config file's `memory_dir`, then `{data_dir}/memory`.
fn resolve_memory_dir(file: &ConfigFile) -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("TOOLBELT_MEMORY_DIR")
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = &file.memory_dir {
        return Ok(dir.clone());
    }
    paths::user_data_dir()
        .map(|d| d.join("memory"))
        .context("could not determine a data directory for memory files")
}

/// Load and resolve configuration once at startup.
///
/// # Errors
///
/// Returns an error when an existing config file fails to parse or when no
/// memory directory can be determined.
pub fn load(verbose: bool) -> anyhow::Result<Settings> {
    let (file, source) = discover()?;
    if verbose {
        eprintln!("[toolbelt] config: {source}");
    }

    let policy = match &file.allow {
        Some(prefixes) => Policy::new(prefixes.clone()),
        None => Policy::default_allow(),
    };
    let timeout = Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
    let memory_dir = resolve_memory_dir(&file)?;

    Ok(Settings {
        timeout,
        policy,
        memory_dir,
        source,
    })
}
