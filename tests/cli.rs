use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("yt-translate").unwrap();
    cmd.arg("--config")
        .arg(config_dir.path().join("config.yaml"))
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("yt-translate")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("models"));
}

#[test]
fn test_malformed_url_is_rejected_before_any_request() {
    let dir = TempDir::new().unwrap();

    cmd(&dir)
        .args(["--quiet", "run", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid video URL"));
}

#[test]
fn test_url_without_video_parameter_is_rejected() {
    let dir = TempDir::new().unwrap();

    cmd(&dir)
        .args(["--quiet", "run", "https://www.youtube.com/channel/xyz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing `v` query parameter"));
}

#[test]
fn test_config_show_writes_and_prints_defaults() {
    let dir = TempDir::new().unwrap();

    cmd(&dir)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://localhost:3000"))
        .stdout(predicate::str::contains("openai/gpt-4o"));

    assert!(dir.path().join("config.yaml").exists());
}

#[test]
fn test_invalid_config_file_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.yaml"), "server: [1, 2]\n").unwrap();

    cmd(&dir)
        .args(["config", "--show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}
