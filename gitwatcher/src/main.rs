//! gitwatcher: restart a command whenever its git repository gets new commits.
//!
//! Reads defaults from `gitwatcher.toml` in the user config directory, lets
//! flags override them, then hands control to the supervisor loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use tracing::{error, info, warn};

use gitwatcher::core::resolver::{TESTED_PLATFORMS, platform_key};
use gitwatcher::core::types::Policy;
use gitwatcher::exit_codes;
use gitwatcher::io::config::{
    RepoConfigFile, WatcherConfig, global_config_path, init_repo_config, load_global_config,
};
use gitwatcher::io::git::{Git, GitChangeDetector};
use gitwatcher::io::process::OsProcessGroupController;
use gitwatcher::io::signals::exit_on_termination;
use gitwatcher::logging;
use gitwatcher::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(
    name = "gitwatcher",
    version,
    about = "Pull a git repository on an interval and restart its command on new commits",
    disable_version_flag = true
)]
struct Cli {
    /// Pull interval in seconds.
    #[arg(short, long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Hide the child's stdout/stderr.
    #[arg(short = 'd', long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    hide_stdout: Option<bool>,

    /// Exit on pull, config, and launch failures instead of warning.
    #[arg(short, long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    strict_mode: Option<bool>,

    /// Log each action.
    #[arg(short, long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    log_everything: Option<bool>,

    /// Repository to watch.
    #[arg(short = 'C', long, value_name = "DIR", default_value = ".")]
    repo: PathBuf,

    /// Print the global config path and exit.
    #[arg(long)]
    config_path: bool,

    /// Create .gitwatcher/config.toml and exit.
    #[arg(long)]
    init: bool,

    /// Print version.
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

impl Cli {
    /// Overlay explicit flags on the settings file.
    fn apply(&self, cfg: &mut WatcherConfig) {
        if let Some(interval) = self.interval {
            cfg.interval = interval;
        }
        if let Some(hide) = self.hide_stdout {
            cfg.hide_stdout = hide;
        }
        if let Some(strict) = self.strict_mode {
            cfg.strict_mode = strict;
        }
        if let Some(log) = self.log_everything {
            cfg.log_everything = log;
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let global_path = global_config_path();

    let loaded = match global_path.as_deref() {
        Some(path) => load_global_config(path),
        None => Ok(WatcherConfig::default()),
    };
    let (mut cfg, config_error) = match loaded {
        Ok(cfg) => (cfg, None),
        Err(err) => (WatcherConfig::default(), Some(err)),
    };
    cli.apply(&mut cfg);
    logging::init(cfg.log_everything);
    if let Some(err) = config_error {
        warn!("config error: '{err:#}', using defaults");
    }

    if let Err(err) = run(&cli, &cfg, global_path) {
        error!("{err:#}");
        std::process::exit(exit_codes::FAILURE);
    }
}

fn run(cli: &Cli, cfg: &WatcherConfig, global_path: Option<PathBuf>) -> Result<()> {
    let platform = platform_key();

    if cli.config_path {
        let path = global_path.ok_or_else(|| anyhow!("no user config directory"))?;
        println!("{}", path.display());
        return Ok(());
    }

    if cli.init {
        let outcome = init_repo_config(&cli.repo, platform)?;
        if let Some(dir) = outcome.created_dir {
            info!("created {}", dir.display());
        }
        if let Some(file) = outcome.created_file {
            info!("created {}", file.display());
        }
        return Ok(());
    }

    if !TESTED_PLATFORMS.contains(&platform) {
        warn!("gitwatcher has not been tested on {platform}, use at your own risk");
    }

    cfg.validate().context("invalid settings")?;
    let policy = cfg.policy().context("invalid settings")?;
    let git = Git::new(&cli.repo);
    let git_version = git
        .version()
        .map_err(|err| anyhow!("'{err:#}', do you have git installed?"))?;
    let fallback = cfg.fallback();
    log_banner(&policy, &git_version, platform, &fallback.display_line());

    let controller = Arc::new(OsProcessGroupController::new());
    let mut supervisor = Supervisor::new(
        GitChangeDetector::new(git),
        RepoConfigFile::new(&cli.repo),
        controller,
        policy,
        platform,
        fallback,
    );

    let on_signal = supervisor.shutdown_handle();
    exit_on_termination(move || {
        on_signal.shutdown();
    })?;

    let Err(err) = supervisor.run();
    error!("strict: {err}");
    supervisor.shutdown();
    std::process::exit(exit_codes::FAILURE);
}

fn log_banner(policy: &Policy, git_version: &str, platform: &str, fallback: &str) {
    info!("gitwatcher v{}, {git_version}", env!("CARGO_PKG_VERSION"));
    info!("\t- pull interval: {} (seconds)", policy.interval().as_secs());
    info!("\t- platform: {platform} ({fallback})");
    if policy.strict_mode() {
        info!("\t- strict mode: enabled");
    }
    if policy.hide_child_output() {
        info!("\t- child's stdout: hidden");
    }
}
