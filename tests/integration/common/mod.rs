#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use assert_cmd::Command;
use nix::{
    sys::signal::{self, Signal},
    unistd::Pid as NixPid,
};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tempfile::TempDir;

/// Fast timings so lifecycle tests finish in a few seconds.
pub const FAST_TIMING: &str = r#"timing:
  restart_delay: 200ms
  start_settle: 500ms
  stop_grace: 500ms
  kill_grace: 300ms
  restart_pause: 100ms
"#;

/// A bot directory with a shell script and a config file pointing at it.
pub struct BotFixture {
    _temp: TempDir,
    pub root: PathBuf,
    pub bot_dir: PathBuf,
    pub config_path: PathBuf,
}

impl BotFixture {
    /// Writes `bot/bot.sh` with `script` and a `botctl.yaml` that runs it with `sh`.
    pub fn new(script: &str, timing: &str) -> Self {
        let temp = tempfile::tempdir().expect("failed to create tempdir");
        let root = temp
            .path()
            .canonicalize()
            .expect("failed to canonicalize tempdir");
        let bot_dir = root.join("bot");
        fs::create_dir_all(&bot_dir).expect("failed to create bot dir");
        fs::write(bot_dir.join("bot.sh"), script).expect("failed to write script");

        let config_path = root.join("botctl.yaml");
        fs::write(
            &config_path,
            format!("bot_dir: bot\nscript: bot.sh\ninterpreter: sh\n{timing}"),
        )
        .expect("failed to write config");

        Self {
            _temp: temp,
            root,
            bot_dir,
            config_path,
        }
    }

    /// Config pointing at a bot directory that does not exist.
    pub fn without_bot_dir() -> Self {
        let fixture = Self::new("exit 0\n", FAST_TIMING);
        fs::remove_dir_all(&fixture.bot_dir).expect("failed to remove bot dir");
        fixture
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.bot_dir.join(name)
    }

    pub fn script_path(&self) -> PathBuf {
        self.path("bot.sh")
    }

    /// `botctl --config <config>` ready for a subcommand.
    pub fn botctl(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("botctl"));
        cmd.current_dir(&self.root).arg("--config").arg(&self.config_path);
        cmd
    }
}

pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

pub fn wait_for_pid_file(path: &Path) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(pid) = read_pid(path) {
            return pid;
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for a PID in {:?}", path);
        }

        thread::sleep(Duration::from_millis(50));
    }
}

/// Waits until `path` holds a PID different from `previous`.
pub fn wait_for_pid_change(path: &Path, previous: u32) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(pid) = read_pid(path)
            && pid != previous
        {
            return pid;
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for {:?} to change from {previous}", path);
        }

        thread::sleep(Duration::from_millis(50));
    }
}

pub fn wait_for_lines(path: &Path, expected: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(content) = fs::read_to_string(path) {
            let lines: Vec<_> = content.lines().map(|line| line.to_string()).collect();
            if lines.len() >= expected {
                return lines;
            }
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for {expected} lines in {:?}", path);
        }

        thread::sleep(Duration::from_millis(100));
    }
}

/// Live and not a zombie.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        if let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat"))
            && let Some(end) = stat.rfind(')')
            && matches!(stat[end + 1..].trim_start().chars().next(), Some('Z' | 'X'))
        {
            return false;
        }
    }

    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system.process(Pid::from_u32(pid)).is_some()
}

pub fn wait_for_process_exit(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }

    panic!("Timed out waiting for PID {} to exit", pid);
}

pub fn send_signal(pid: u32, sig: Signal) {
    signal::kill(NixPid::from_raw(pid as i32), sig).expect("failed to send signal");
}

/// Best-effort SIGKILL so a failed assertion does not leak processes.
pub fn kill_quietly(pid: u32) {
    let _ = signal::kill(NixPid::from_raw(pid as i32), Signal::SIGKILL);
}
