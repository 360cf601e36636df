#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{BotFixture, FAST_TIMING};
use predicates::{boolean::PredicateBooleanExt, str::contains};

#[test]
fn no_command_prints_usage_and_fails() {
    let bot = BotFixture::new("exit 0\n", FAST_TIMING);

    bot.botctl()
        .assert()
        .failure()
        .stdout(
            contains("Commands:")
                .and(contains("start"))
                .and(contains("stop"))
                .and(contains("restart"))
                .and(contains("status"))
                .and(contains("log"))
                .and(contains("clean"))
                .and(contains("Bot directory:"))
                .and(contains("bot.pid"))
                .and(contains("bot.log"))
                .and(contains("supervise").not()),
        );
}

#[test]
fn unknown_command_fails_with_usage() {
    let bot = BotFixture::new("exit 0\n", FAST_TIMING);

    bot.botctl()
        .arg("reboot")
        .assert()
        .failure()
        .stderr(contains("Unknown command 'reboot'"))
        .stdout(contains("Commands:"));
}

#[test]
fn usage_still_prints_when_config_is_missing() {
    let temp = tempfile::tempdir().expect("failed to create tempdir");
    let missing = temp.path().join("nowhere.yaml");

    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("botctl"))
        .arg("--config")
        .arg(&missing)
        .assert()
        .failure()
        .stdout(contains("Commands:").and(contains("unavailable")));
}

#[test]
fn stop_with_nothing_running_reports_and_succeeds() {
    let bot = BotFixture::new("exit 0\n", FAST_TIMING);

    bot.botctl()
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("No processes found"));
}

#[test]
fn stop_removes_stale_record() {
    let bot = BotFixture::new("exit 0\n", FAST_TIMING);
    // PIDs above the default pid_max are never live.
    fs::write(bot.path("bot.pid"), "4194304\n").unwrap();

    bot.botctl()
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("stale").and(contains("No processes found")));
    assert!(!bot.path("bot.pid").exists());
}

#[test]
fn start_with_missing_directory_creates_nothing() {
    let bot = BotFixture::without_bot_dir();

    bot.botctl()
        .arg("start")
        .assert()
        .success()
        .stdout(contains("Bot directory unavailable"));
    assert!(!bot.bot_dir.exists());
}

#[test]
fn log_reports_missing_file() {
    let bot = BotFixture::new("exit 0\n", FAST_TIMING);

    bot.botctl()
        .arg("log")
        .assert()
        .success()
        .stdout(contains("Log file not found"));
}

#[test]
fn log_shows_numbered_tail() {
    let bot = BotFixture::new("exit 0\n", FAST_TIMING);
    let body: String = (1..=40).map(|n| format!("entry {n}\n")).collect();
    fs::write(bot.path("bot.log"), body).unwrap();

    bot.botctl()
        .args(["log", "-n", "5"])
        .assert()
        .success()
        .stdout(
            contains("36  entry 36")
                .and(contains("40  entry 40"))
                .and(contains("entry 35").not())
                .and(contains("Total lines: 40")),
        );
}

#[test]
fn clean_truncates_log_and_lists_others() {
    let bot = BotFixture::new("exit 0\n", FAST_TIMING);
    fs::write(bot.path("bot.log"), "0123456789").unwrap();
    fs::write(bot.path("error.log"), "boom\n").unwrap();

    bot.botctl()
        .arg("clean")
        .assert()
        .success()
        .stdout(contains("was 10B").and(contains("error.log")));

    assert_eq!(fs::metadata(bot.path("bot.log")).unwrap().len(), 0);
    assert_eq!(fs::read_to_string(bot.path("error.log")).unwrap(), "boom\n");
}

#[test]
fn status_is_read_only() {
    let bot = BotFixture::new("exit 0\n", FAST_TIMING);
    fs::write(bot.path("bot.pid"), "4194304\n").unwrap();
    fs::write(bot.path("bot.log"), "a\nb\n").unwrap();

    bot.botctl()
        .arg("status")
        .assert()
        .success()
        .stdout(
            contains("Process 4194304 not found")
                .and(contains("Bot processes: 0 running"))
                .and(contains("2 lines")),
        );

    assert_eq!(
        fs::read_to_string(bot.path("bot.pid")).unwrap(),
        "4194304\n"
    );
    assert_eq!(fs::read_to_string(bot.path("bot.log")).unwrap(), "a\nb\n");
}

#[test]
fn status_json_is_machine_readable() {
    let bot = BotFixture::new("exit 0\n", FAST_TIMING);

    let output = bot
        .botctl()
        .args(["status", "--json"])
        .output()
        .expect("failed to run status");
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("status output is not JSON");
    assert_eq!(json["supervisor"]["state"], "not_recorded");
    assert_eq!(json["log"]["exists"], false);
}
