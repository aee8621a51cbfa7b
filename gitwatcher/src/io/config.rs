//! Settings files.
//!
//! - `gitwatcher.toml` in the user config directory holds defaults for the
//!   command-line switches and the fallback shell.
//! - `.gitwatcher/config.toml` in the watched repository holds the launch
//!   table. It travels with the repository, so it is re-read on every restart.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::resolver::{CMD_PLACEHOLDER, DEFAULT_KEY, fallback_spec};
use crate::core::types::{ConfigTable, FailureKind, LaunchSpec, Policy};
use crate::error::SupervisorError;

/// File name of the global settings file.
pub const GLOBAL_CONFIG_FILE: &str = "gitwatcher.toml";

/// Directory holding the per-repository launch table.
pub const REPO_CONFIG_DIR: &str = ".gitwatcher";

/// File name of the per-repository launch table.
pub const REPO_CONFIG_FILE: &str = "config.toml";

/// Global settings (TOML). Missing fields keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct WatcherConfig {
    /// Log every action, not just restarts and failures.
    pub log_everything: bool,

    /// Exit on failures instead of warning.
    pub strict_mode: bool,

    /// Discard the child's stdout/stderr.
    pub hide_stdout: bool,

    /// Seconds between pulls.
    pub interval: u64,

    /// Shell used when a launch entry omits one.
    pub shell: String,

    /// Shell arguments used when a launch entry omits them.
    pub args: Vec<String>,

    /// Failures that strict mode escalates.
    pub strict_failures: Vec<FailureKind>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        let fallback = fallback_spec();
        Self {
            log_everything: false,
            strict_mode: false,
            hide_stdout: false,
            interval: 60,
            shell: fallback.shell,
            args: fallback.args,
            strict_failures: FailureKind::STRICT_DEFAULT.to_vec(),
        }
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(anyhow!("interval must be > 0"));
        }
        if self.shell.trim().is_empty() {
            return Err(anyhow!("shell must be non-empty"));
        }
        Ok(())
    }

    /// Build the supervisor policy from these settings.
    pub fn policy(&self) -> Result<Policy> {
        let policy = Policy::new(
            Duration::from_secs(self.interval),
            self.strict_mode,
            self.hide_stdout,
        )?;
        Ok(policy.with_strict_failures(self.strict_failures.iter().copied()))
    }

    /// Shell and arguments applied to launch entries that omit them.
    pub fn fallback(&self) -> LaunchSpec {
        LaunchSpec {
            shell: self.shell.clone(),
            args: self.args.clone(),
            cmd: String::new(),
        }
    }
}

/// Path of the global settings file, if the platform has a config directory.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load global settings.
///
/// A missing file yields defaults. An unreadable or unparsable file is an
/// error; callers warn and continue with defaults. Values are not validated
/// here; see [`WatcherConfig::validate`].
pub fn load_global_config(path: &Path) -> Result<WatcherConfig> {
    if !path.exists() {
        return Ok(WatcherConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WatcherConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    debug!(path = %path.display(), "loaded global config");
    Ok(cfg)
}

/// Provider of the launch table, consulted at every restart.
pub trait ConfigSource {
    fn load(&self) -> Result<ConfigTable, SupervisorError>;
}

/// A fixed table is its own source; it never changes.
impl ConfigSource for ConfigTable {
    fn load(&self) -> Result<ConfigTable, SupervisorError> {
        Ok(self.clone())
    }
}

/// Launch table read from `.gitwatcher/config.toml` under a repository root.
#[derive(Debug, Clone)]
pub struct RepoConfigFile {
    path: PathBuf,
}

impl RepoConfigFile {
    pub fn new(root: &Path) -> Self {
        Self {
            path: repo_config_path(root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for RepoConfigFile {
    fn load(&self) -> Result<ConfigTable, SupervisorError> {
        let name = self.path.display();
        if !self.path.exists() {
            return Err(SupervisorError::ConfigMissing(format!("{name} not found")));
        }
        debug!(path = %name, "reading launch table");
        let contents = fs::read_to_string(&self.path).map_err(|err| {
            SupervisorError::ConfigMissing(format!("error reading {name}: '{err}'"))
        })?;
        let table: ConfigTable = toml::from_str(&contents).map_err(|err| {
            SupervisorError::ConfigMissing(format!("error parsing {name}: '{err}'"))
        })?;
        debug!(entries = ?table.keys().collect::<Vec<_>>(), "launch table loaded");
        Ok(table)
    }
}

/// `<root>/.gitwatcher/config.toml`.
pub fn repo_config_path(root: &Path) -> PathBuf {
    root.join(REPO_CONFIG_DIR).join(REPO_CONFIG_FILE)
}

/// What `init_repo_config` created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOutcome {
    pub created_dir: Option<PathBuf>,
    pub created_file: Option<PathBuf>,
}

/// Create `.gitwatcher/config.toml` with a `default` and a `platform` entry.
///
/// Existing files are left untouched.
pub fn init_repo_config(root: &Path, platform: &str) -> Result<InitOutcome> {
    let mut outcome = InitOutcome::default();
    let dir = root.join(REPO_CONFIG_DIR);
    if !dir.exists() {
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        outcome.created_dir = Some(dir);
    }
    let path = repo_config_path(root);
    if !path.exists() {
        fs::write(&path, starter_table(platform))
            .with_context(|| format!("write {}", path.display()))?;
        outcome.created_file = Some(path);
    }
    Ok(outcome)
}

fn starter_table(platform: &str) -> String {
    format!(
        "# generated by gitwatcher\n\
         \n\
         # default config\n\
         [{DEFAULT_KEY}]\n\
         cmd = \"echo hello world\"\n\
         shell = \"sh\"\n\
         args = [\"-c\", \"{CMD_PLACEHOLDER}\"]\n\
         \n\
         # config for '{platform}'\n\
         [{platform}]\n\
         cmd = \"echo hello world\"\n"
    )
}
