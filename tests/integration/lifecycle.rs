#[path = "common/mod.rs"]
mod common;

use common::{
    BotFixture, FAST_TIMING, is_process_alive, kill_quietly, read_pid, send_signal,
    wait_for_pid_change, wait_for_pid_file, wait_for_process_exit,
};
use nix::sys::signal::Signal;
use predicates::{boolean::PredicateBooleanExt, str::contains};

const LONG_RUNNING: &str = "echo \"bot up\"\nwhile true; do sleep 1; done\n";

/// Stops everything even when an assertion fails halfway.
struct Cleanup<'a>(&'a BotFixture);

impl Drop for Cleanup<'_> {
    fn drop(&mut self) {
        let _ = self.0.botctl().arg("stop").output();
        for name in ["bot.pid", "bot_process.pid"] {
            if let Some(pid) = read_pid(&self.0.path(name)) {
                kill_quietly(pid);
            }
        }
    }
}

#[test]
fn start_status_stop_round() {
    let bot = BotFixture::new(LONG_RUNNING, FAST_TIMING);
    let _cleanup = Cleanup(&bot);

    bot.botctl()
        .arg("start")
        .assert()
        .success()
        .stdout(contains("Supervisor started"));

    let supervisor = read_pid(&bot.path("bot.pid")).expect("start wrote no PID record");
    let target = wait_for_pid_file(&bot.path("bot_process.pid"));
    assert!(is_process_alive(supervisor));
    assert!(is_process_alive(target));

    bot.botctl()
        .arg("status")
        .assert()
        .success()
        .stdout(
            contains(format!("Supervisor running (PID {supervisor})"))
                .and(contains("Bot processes: 1 running"))
                .and(contains(format!("PID {target:>7}"))),
        );

    bot.botctl()
        .arg("start")
        .assert()
        .success()
        .stdout(contains(format!("already running (PID {supervisor})")));
    assert_eq!(read_pid(&bot.path("bot.pid")), Some(supervisor));

    bot.botctl()
        .arg("stop")
        .assert()
        .success()
        .stdout(contains(format!("Supervisor stopped (PID {supervisor})")));

    assert!(!bot.path("bot.pid").exists());
    wait_for_process_exit(supervisor);
    wait_for_process_exit(target);

    bot.botctl()
        .arg("status")
        .assert()
        .success()
        .stdout(contains("no PID file").and(contains("Bot processes: 0 running")));
}

#[test]
fn killed_target_is_relaunched() {
    let bot = BotFixture::new(LONG_RUNNING, FAST_TIMING);
    let _cleanup = Cleanup(&bot);

    bot.botctl().arg("start").assert().success();
    let first = wait_for_pid_file(&bot.path("bot_process.pid"));

    send_signal(first, Signal::SIGKILL);
    let second = wait_for_pid_change(&bot.path("bot_process.pid"), first);

    assert!(is_process_alive(second));
    let log = std::fs::read_to_string(bot.path("bot.log")).unwrap();
    assert!(log.matches("bot up").count() >= 1);
}

#[test]
fn restart_replaces_supervisor() {
    let bot = BotFixture::new(LONG_RUNNING, FAST_TIMING);
    let _cleanup = Cleanup(&bot);

    bot.botctl().arg("start").assert().success();
    let before = read_pid(&bot.path("bot.pid")).expect("start wrote no PID record");
    let first_target = wait_for_pid_file(&bot.path("bot_process.pid"));

    bot.botctl()
        .arg("restart")
        .assert()
        .success()
        .stdout(contains("Supervisor stopped").and(contains("Supervisor started")));

    let after = read_pid(&bot.path("bot.pid")).expect("restart wrote no PID record");
    assert_ne!(before, after);
    wait_for_process_exit(before);
    wait_for_process_exit(first_target);
    assert!(is_process_alive(after));
}
