//! CLI tests for the gitwatcher binary.
//!
//! Spawns the binary with an isolated config directory and checks exit codes
//! for usage errors, `--init`, and strict-mode startup failures.

use std::path::Path;
use std::process::{Command, Output};

use gitwatcher::exit_codes;
use gitwatcher::io::config::{ConfigSource, RepoConfigFile};
use gitwatcher::test_support::TempRepo;

fn gitwatcher(home: &Path, cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gitwatcher"))
        .args(args)
        .current_dir(cwd)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn gitwatcher")
}

#[test]
fn zero_interval_is_a_usage_error() {
    let home = tempfile::tempdir().expect("home");
    let out = gitwatcher(home.path(), home.path(), &["--interval", "0"]);
    assert_eq!(out.status.code(), Some(exit_codes::USAGE));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let home = tempfile::tempdir().expect("home");
    let out = gitwatcher(home.path(), home.path(), &["--webhook-mode"]);
    assert_eq!(out.status.code(), Some(exit_codes::USAGE));
}

#[test]
fn version_flag_prints_version() {
    let home = tempfile::tempdir().expect("home");
    let out = gitwatcher(home.path(), home.path(), &["-v"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "{stdout}");
}

#[test]
fn init_creates_a_loadable_launch_table() {
    let home = tempfile::tempdir().expect("home");
    let repo = tempfile::tempdir().expect("repo");
    let repo_arg = repo.path().to_str().expect("utf-8 path");

    let out = gitwatcher(home.path(), home.path(), &["--init", "-C", repo_arg]);

    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let table = RepoConfigFile::new(repo.path()).load().expect("load table");
    assert!(table.get("default").is_some());
}

#[cfg(target_os = "linux")]
mod xdg {
    use std::fs;

    use gitwatcher::io::config::GLOBAL_CONFIG_FILE;

    use super::*;

    #[test]
    fn config_path_points_into_config_dir() {
        let home = tempfile::tempdir().expect("home");
        let out = gitwatcher(home.path(), home.path(), &["--config-path"]);
        assert_eq!(out.status.code(), Some(exit_codes::OK));
        let stdout = String::from_utf8_lossy(&out.stdout);
        let expected = home.path().join(".config").join(GLOBAL_CONFIG_FILE);
        assert_eq!(stdout.trim(), expected.display().to_string());
    }

    #[test]
    fn zero_interval_in_settings_file_prevents_startup() {
        let home = tempfile::tempdir().expect("home");
        let config_dir = home.path().join(".config");
        fs::create_dir_all(&config_dir).expect("mkdir");
        fs::write(config_dir.join(GLOBAL_CONFIG_FILE), "interval = 0\n").expect("write");

        let out = gitwatcher(home.path(), home.path(), &[]);

        assert_eq!(out.status.code(), Some(exit_codes::FAILURE));
        let stderr = String::from_utf8_lossy(&out.stderr);
        assert!(stderr.contains("interval"), "{stderr}");
    }
}

#[test]
fn strict_mode_exits_when_launch_table_is_missing() {
    let home = tempfile::tempdir().expect("home");
    let repo = TempRepo::new().expect("repo");

    let out = gitwatcher(home.path(), repo.path(), &["--strict-mode", "true", "-i", "1"]);

    assert_eq!(out.status.code(), Some(exit_codes::FAILURE));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("strict:"), "{stderr}");
    assert!(stderr.contains("not found"), "{stderr}");
}

#[cfg(unix)]
mod termination {
    use std::io::{BufRead, BufReader};
    use std::process::Stdio;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use gitwatcher::test_support::group_exists;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    use wait_timeout::ChildExt;

    use super::*;

    const LAUNCH_TABLE: &str = "[default]\n\
                                cmd = \"exec sleep 30\"\n\
                                shell = \"sh\"\n\
                                args = [\"-c\", \"$cmd\"]\n";

    fn strip_ansi(line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            if c == '\u{1b}' {
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Group id from the debug line logged when the child is spawned.
    fn started_group(line: &str) -> Option<u32> {
        if !line.contains("child started") {
            return None;
        }
        let rest = &line[line.find("group_id=")? + "group_id=".len()..];
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    #[test]
    fn sigterm_kills_the_child_group_and_exits_130() {
        let home = tempfile::tempdir().expect("home");
        let repo = TempRepo::new().expect("repo");
        repo.push_upstream(".gitwatcher/config.toml", LAUNCH_TABLE)
            .expect("push launch table");

        let mut watcher = Command::new(env!("CARGO_BIN_EXE_gitwatcher"))
            .args(["--log-everything", "--interval", "60"])
            .current_dir(repo.path())
            .env("HOME", home.path())
            .env("XDG_CONFIG_HOME", home.path().join(".config"))
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn gitwatcher");

        let stderr = watcher.stderr.take().expect("stderr");
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if let Some(group) = started_group(&strip_ansi(&line)) {
                    let _ = tx.send(group);
                }
            }
        });

        let group = match rx.recv_timeout(Duration::from_secs(20)) {
            Ok(group) => group,
            Err(err) => {
                let _ = watcher.kill();
                panic!("child never started: {err}");
            }
        };
        assert!(group_exists(group));

        let pid = i32::try_from(watcher.id()).expect("pid fits i32");
        kill(Pid::from_raw(pid), Signal::SIGTERM).expect("send SIGTERM");
        let status = watcher
            .wait_timeout(Duration::from_secs(10))
            .expect("wait")
            .expect("gitwatcher exited");

        assert_eq!(status.code(), Some(exit_codes::INTERRUPTED));
        assert!(!group_exists(group));
    }

    #[test]
    fn started_group_reads_the_spawn_line() {
        let line = "DEBUG launch: child started pid=4242 group_id=4242 shell=sh";
        assert_eq!(started_group(line), Some(4242));
        assert_eq!(started_group("INFO executing command=sleep"), None);
        assert_eq!(strip_ansi("\u{1b}[3mgroup_id\u{1b}[0m=7"), "group_id=7");
    }
}
