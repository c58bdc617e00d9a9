use assert_cmd::Command;
use predicates::prelude::*;

fn condor(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("condor").unwrap();
    cmd.current_dir(dir)
        .env_remove("CONDOR_GENERATION_MODE")
        .env("CONDOR_STORAGE_DIR", dir.join("storage"))
        .env("CONDOR_PYTHON", "condor-no-such-python");
    cmd
}

#[test]
fn generate_in_echo_mode_prints_the_program() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "print('hello')\n").unwrap();

    condor(dir.path())
        .args(["--mode", "echo", "generate", "hello.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("print('hello')"));
}

#[test]
fn config_file_selects_the_generation_mode() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("condor.toml"), "[generation]\nmode = \"echo\"\n").unwrap();
    std::fs::write(dir.path().join("steps.txt"), "x = 1\n").unwrap();

    condor(dir.path())
        .args(["generate", "steps.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("x = 1"));
}

#[test]
fn run_with_missing_interpreter_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "print('hello')\n").unwrap();

    condor(dir.path())
        .args(["--mode", "echo", "run", "hello.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("condor-no-such-python"));
}

#[test]
fn missing_named_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    condor(dir.path())
        .args(["--config", "nope.toml", "generate", "x.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.toml"));
}

#[test]
fn no_command_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    condor(dir.path()).assert().failure();
}
