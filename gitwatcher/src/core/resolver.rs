//! Mapping from the launch table to a concrete launch command.

use crate::core::types::{ConfigTable, LaunchSpec};
use crate::error::SupervisorError;

/// Token in `args` replaced by the configured command.
pub const CMD_PLACEHOLDER: &str = "$cmd";

/// Table key consulted when the platform has no entry of its own.
pub const DEFAULT_KEY: &str = "default";

/// Platforms the supervisor has been exercised on.
pub const TESTED_PLATFORMS: [&str; 3] = ["linux", "darwin", "windows"];

/// Key for the running OS. macOS is reported as `darwin`.
pub fn platform_key() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Shell and arguments used when a table entry omits them.
pub fn fallback_spec() -> LaunchSpec {
    if cfg!(windows) {
        LaunchSpec {
            shell: "cmd.exe".to_string(),
            args: vec![format!("/C{CMD_PLACEHOLDER}")],
            cmd: String::new(),
        }
    } else {
        LaunchSpec {
            shell: "bash".to_string(),
            args: vec!["-c".to_string(), CMD_PLACEHOLDER.to_string()],
            cmd: String::new(),
        }
    }
}

/// Resolve the launch command for `platform`.
///
/// Looks up `platform`, then `default`. Missing `shell`/`args` are taken from
/// `fallback`; the placeholder is then replaced inside every argument.
pub fn resolve(
    table: &ConfigTable,
    platform: &str,
    fallback: &LaunchSpec,
) -> Result<LaunchSpec, SupervisorError> {
    let template = table
        .get(platform)
        .or_else(|| table.get(DEFAULT_KEY))
        .ok_or_else(|| {
            SupervisorError::ConfigMissing(format!(
                "no suitable config found ({DEFAULT_KEY} | {platform})"
            ))
        })?;

    if template.cmd.is_empty() {
        return Err(SupervisorError::CommandMissing {
            platform: platform.to_string(),
        });
    }

    let shell = if template.shell.is_empty() {
        fallback.shell.clone()
    } else {
        template.shell.clone()
    };
    let args = if template.args.is_empty() {
        &fallback.args
    } else {
        &template.args
    };
    let args = args
        .iter()
        .map(|arg| arg.replace(CMD_PLACEHOLDER, &template.cmd))
        .collect();

    Ok(LaunchSpec {
        shell,
        args,
        cmd: template.cmd.clone(),
    })
}
