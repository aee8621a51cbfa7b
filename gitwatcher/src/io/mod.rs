//! Side-effecting adapters: git, OS processes, settings files, signals.

pub mod config;
pub mod git;
pub mod process;
pub mod signals;
