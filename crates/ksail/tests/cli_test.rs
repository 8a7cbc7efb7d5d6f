#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ミラーレジストリ"))
        .stdout(predicate::str::contains("mirror"))
        .stdout(predicate::str::contains("version"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ksail"));
}

/// mirror サブコマンドの一覧
#[test]
fn test_mirror_help() {
    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.args(["mirror", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("connect"))
        .stdout(predicate::str::contains("down"))
        .stdout(predicate::str::contains("clean"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_mirror_up_help() {
    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.args(["mirror", "up", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--mirror-registry"))
        .stdout(predicate::str::contains("--native-config"))
        .stdout(predicate::str::contains("--timeout"));
}

#[test]
fn test_mirror_down_help() {
    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.args(["mirror", "down", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--delete-volumes"));
}

/// 不正なコマンドでエラーになることを確認
#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

#[test]
fn test_unknown_distribution_is_rejected() {
    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.args(["mirror", "list", "--distribution", "minikube"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("minikube"));
}

/// 不正なミラー指定は Docker に接続する前にエラーになる
#[test]
fn test_invalid_mirror_registry_fails_before_docker() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.current_dir(temp_dir.path())
        .env_remove("KSAIL_CONFIG")
        .env_remove("KSAIL_MIRROR_REGISTRY")
        .args(["mirror", "up", "--mirror-registry", "docker.io=not-a-url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("docker.io=not-a-url"));
}

/// 壊れた設定ファイルはパス付きで報告される
#[test]
fn test_broken_config_reports_path() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("ksail.yaml");
    std::fs::write(&path, "distribution: [").unwrap();

    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.current_dir(temp_dir.path())
        .env_remove("KSAIL_CONFIG")
        .args(["mirror", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ksail.yaml"));
}

/// --mirror-registry を指定した場合は既存の hosts.toml を読まない
#[test]
fn test_mirror_registry_flag_ignores_existing_hosts_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    let host_dir = temp_dir.path().join("mirrors").join("quay.io");
    std::fs::create_dir_all(&host_dir).unwrap();
    std::fs::write(host_dir.join("hosts.toml"), "server = [broken").unwrap();

    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.current_dir(temp_dir.path())
        .env_remove("KSAIL_CONFIG")
        .env("DOCKER_HOST", "unix:///nonexistent/ksail-test.sock")
        .args(["mirror", "up", "--mirror-registry", "docker.io"])
        .assert()
        .stderr(predicate::str::contains("既存のホスト設定の読み込みに失敗しました").not());
}

/// フラグがなければ壊れた hosts.toml はエラーになる
#[test]
fn test_broken_hosts_file_is_reported_without_flag() {
    let temp_dir = tempfile::tempdir().unwrap();
    let host_dir = temp_dir.path().join("mirrors").join("quay.io");
    std::fs::create_dir_all(&host_dir).unwrap();
    std::fs::write(host_dir.join("hosts.toml"), "server = [broken").unwrap();

    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.current_dir(temp_dir.path())
        .env_remove("KSAIL_CONFIG")
        .env_remove("KSAIL_MIRROR_REGISTRY")
        .args(["mirror", "up"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("既存のホスト設定の読み込みに失敗しました"));
}

/// ミラーを無効にすると前回の hosts.toml が残らない
#[test]
fn test_disabling_mirrors_removes_previous_hosts_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    let host_dir = temp_dir.path().join("mirrors").join("docker.io");
    std::fs::create_dir_all(&host_dir).unwrap();
    std::fs::write(
        host_dir.join("hosts.toml"),
        "server = \"https://registry-1.docker.io\"\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.current_dir(temp_dir.path())
        .env_remove("KSAIL_CONFIG")
        .env("DOCKER_HOST", "unix:///nonexistent/ksail-test.sock")
        .args(["mirror", "up", "--mirror-registry", ""])
        .output()
        .unwrap();

    assert!(!host_dir.exists());
}

#[test]
fn test_mirror_up_accepts_create_command() {
    let mut cmd = Command::cargo_bin("ksail").unwrap();
    cmd.args(["mirror", "up", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("クラスタを作成するコマンド"));
}
