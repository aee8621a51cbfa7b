//! Process supervisor that follows a git working tree.
//!
//! Every interval the supervisor runs `git pull`. When new commits arrive (and
//! once at startup) it kills the previous child together with its whole
//! process group and launches a replacement from the repository's launch
//! table. The crate keeps a strict split:
//!
//! - **[`core`]**: Pure logic (pull classification, launch resolution, policy).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side effects (git, process groups, settings files, signals),
//!   behind traits so tests can substitute fakes.
//!
//! [`supervisor`] ties the two together into the poll → decide → restart
//! cycle.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
