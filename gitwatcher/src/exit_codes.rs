//! Stable exit codes for the gitwatcher binary.

/// Help, version, `--init`, or `--config-path` completed.
pub const OK: i32 = 0;
/// Startup failed, or strict mode escalated a failure.
pub const FAILURE: i32 = 1;
/// Invalid command-line usage (reported by clap).
pub const USAGE: i32 = 2;
/// Stopped by SIGINT/SIGTERM after killing the child group.
pub const INTERRUPTED: i32 = 130;
