#[path = "common/mod.rs"]
mod common;

use std::{
    fs,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use common::{
    BotFixture, FAST_TIMING, is_process_alive, kill_quietly, send_signal, wait_for_lines,
    wait_for_pid_file, wait_for_process_exit,
};
use nix::sys::signal::Signal;

const LONG_RUNNING: &str = "echo started\nwhile true; do sleep 1; done\n";

fn spawn_supervisor(bot: &BotFixture) -> Child {
    Command::new(assert_cmd::cargo::cargo_bin!("botctl"))
        .arg("--config")
        .arg(&bot.config_path)
        .arg("supervise")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn supervisor")
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().expect("failed to poll supervisor") {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("supervisor did not exit within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn restarts_after_crash_and_stops_on_sigterm_exit_code() {
    let script = r#"n=$(cat runs 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > runs
echo "run $n"
if [ "$n" -ge 3 ]; then exit 143; fi
exit 1
"#;
    let bot = BotFixture::new(script, FAST_TIMING);

    let mut supervisor = spawn_supervisor(&bot);
    let status = wait_with_timeout(&mut supervisor, Duration::from_secs(10));

    assert!(status.success(), "supervisor exited with {status:?}");
    assert_eq!(fs::read_to_string(bot.path("runs")).unwrap().trim(), "3");

    let lines = wait_for_lines(&bot.path("bot.log"), 3);
    assert_eq!(lines, vec!["run 1", "run 2", "run 3"]);
    assert!(bot.path("bot_process.pid").exists());
}

#[test]
fn sigint_exit_code_is_not_restarted() {
    let bot = BotFixture::new("echo once\nexit 130\n", FAST_TIMING);

    let mut supervisor = spawn_supervisor(&bot);
    let status = wait_with_timeout(&mut supervisor, Duration::from_secs(5));

    assert!(status.success());
    assert_eq!(
        fs::read_to_string(bot.path("bot.log")).unwrap(),
        "once\n"
    );
}

#[test]
fn sigterm_stops_target_and_exits_cleanly() {
    let bot = BotFixture::new(LONG_RUNNING, FAST_TIMING);

    let mut supervisor = spawn_supervisor(&bot);
    let target = wait_for_pid_file(&bot.path("bot_process.pid"));
    wait_for_lines(&bot.path("bot.log"), 1);
    assert!(is_process_alive(target));

    send_signal(supervisor.id(), Signal::SIGTERM);
    let status = wait_with_timeout(&mut supervisor, Duration::from_secs(5));

    assert!(status.success(), "supervisor exited with {status:?}");
    wait_for_process_exit(target);
}

#[test]
fn sighup_is_ignored() {
    let bot = BotFixture::new(LONG_RUNNING, FAST_TIMING);

    let mut supervisor = spawn_supervisor(&bot);
    let target = wait_for_pid_file(&bot.path("bot_process.pid"));
    wait_for_lines(&bot.path("bot.log"), 1);

    send_signal(supervisor.id(), Signal::SIGHUP);
    thread::sleep(Duration::from_millis(500));

    let still_running = supervisor
        .try_wait()
        .expect("failed to poll supervisor")
        .is_none();
    let target_alive = is_process_alive(target);

    send_signal(supervisor.id(), Signal::SIGTERM);
    let _ = wait_with_timeout(&mut supervisor, Duration::from_secs(5));
    kill_quietly(target);

    assert!(still_running, "supervisor died on SIGHUP");
    assert!(target_alive, "target died on SIGHUP");
}
