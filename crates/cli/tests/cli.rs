use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_config(dir: &TempDir, extra: &str) -> std::path::PathBuf {
    let db_path = dir.path().join("state.sqlite");
    let content = format!(
        "[general]\nstate_db_path = {:?}\n\n[telegram]\nbot_token_env = \"NEWS_DIGEST_TEST_TOKEN\"\n{}",
        db_path.display().to_string(),
        extra
    );
    let path = dir.path().join("config.toml");
    fs::write(&path, content).expect("write config");
    path
}

fn news_digest(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("news-digest");
    cmd.current_dir(dir).env_remove("NEWS_DIGEST_TEST_TOKEN");
    cmd
}

#[test]
fn config_init_writes_example_file() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");

    news_digest(dir.path())
        .args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .success();

    let content = fs::read_to_string(&config_path).expect("read config");
    assert!(content.contains("interval_secs = 300"));
    assert!(content.contains("max_subscriptions = 10"));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "# mine\n").expect("write config");

    news_digest(dir.path())
        .args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    assert_eq!(fs::read_to_string(&config_path).unwrap(), "# mine\n");
}

#[test]
fn config_show_applies_env_overrides() {
    let dir = TempDir::new().expect("temp dir");

    news_digest(dir.path())
        .env("NEWS_DIGEST__POLLING__INTERVAL_SECS", "42")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("interval_secs = 42"));
}

#[test]
fn normalize_outputs_valid_json() {
    let dir = TempDir::new().expect("temp dir");

    let output = news_digest(dir.path())
        .args([
            "normalize",
            "--text",
            "Новые цены на рынке выросли https://t.me/source #новости",
            "--json",
        ])
        .output()
        .expect("run normalize");

    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value["normalized"], "новый цена рынок вырасти");
    assert_eq!(value["empty"], false);
}

#[test]
fn normalize_drops_advertisement_only_text() {
    let dir = TempDir::new().expect("temp dir");

    let output = news_digest(dir.path())
        .args(["normalize", "--text", "Реклама: лучшие курсы", "--json"])
        .output()
        .expect("run normalize");

    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value["normalized"], "");
    assert_eq!(value["empty"], true);
}

#[test]
fn normalize_reads_file() {
    let dir = TempDir::new().expect("temp dir");
    let input = dir.path().join("post.txt");
    fs::write(&input, "Курс доллара\n\nреклама: партнёр").expect("write input");

    news_digest(dir.path())
        .args(["normalize", "--file"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("курс доллар"));
}

#[test]
fn doctor_reports_missing_token_as_warning() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "");

    let output = news_digest(dir.path())
        .args(["doctor", "--json", "--config"])
        .arg(&config_path)
        .output()
        .expect("run doctor");

    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value["config"]["status"], "ok");
    assert_eq!(value["bot_token"]["status"], "warn");
    assert_eq!(value["normalizer"]["status"], "ok");
    assert_eq!(value["overall"], "warn");
}

#[test]
fn doctor_fails_on_missing_lexicon() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(
        &dir,
        "\n[normalizer]\nlexicon_path = \"/nonexistent/lexicon.tsv\"\n",
    );

    news_digest(dir.path())
        .args(["doctor", "--config"])
        .arg(&config_path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Failed to read lexicon"));
}

#[test]
fn run_once_into_outbox_needs_no_token() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "");
    let outbox = dir.path().join("outbox.jsonl");

    news_digest(dir.path())
        .args(["run", "--once", "--outbox"])
        .arg(&outbox)
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success();

    assert!(outbox.exists());
    assert!(dir.path().join("state.sqlite").exists());
}

#[test]
fn run_ephemeral_leaves_no_state_database() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "");
    let outbox = dir.path().join("outbox.jsonl");

    news_digest(dir.path())
        .args(["run", "--once", "--ephemeral", "--outbox"])
        .arg(&outbox)
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success();

    assert!(outbox.exists());
    assert!(!dir.path().join("state.sqlite").exists());
}

#[test]
fn run_without_token_fails() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = write_config(&dir, "");

    news_digest(dir.path())
        .args(["run", "--once", "--config"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("NEWS_DIGEST_TEST_TOKEN"));
}
