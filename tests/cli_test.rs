use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn cdog() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cdog"))
}

#[test]
fn test_help_exits_successfully() {
    let output = cdog().arg("--help").output().expect("Failed to run cdog");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("--moveto"));
    assert!(stdout.contains("--logto"));
}

#[test]
fn test_no_roots_prints_usage() {
    let temp_dir = TempDir::new().unwrap();

    let output = cdog()
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run cdog");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Usage"));
}

#[test]
fn test_show_config_merges_file_and_flags() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("cdog.toml"),
        "unwanted_extensions = [\".exe\"]\n\n[watch]\nmax_watches = 99\n",
    )
    .unwrap();

    let output = cdog()
        .current_dir(temp_dir.path())
        .args(["--show-config", "--moveto=/srv/jail", "/srv/www"])
        .output()
        .expect("Failed to run cdog");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("max_watches = 99"));
    assert!(stdout.contains("\".exe\""));
    assert!(stdout.contains("quarantine_dir = \"/srv/jail\""));
    assert!(stdout.contains("\"/srv/www\""));
}

#[test]
fn test_missing_config_file_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = cdog()
        .current_dir(temp_dir.path())
        .args(["--config", "nope.toml", "."])
        .output()
        .expect("Failed to run cdog");

    assert!(!output.status.success());
}

#[test]
fn test_no_watchable_root_fails() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("cdog.log");

    let output = cdog()
        .current_dir(temp_dir.path())
        .arg(format!("--logto={}", log.display()))
        .arg(temp_dir.path().join("missing"))
        .output()
        .expect("Failed to run cdog");

    assert!(!output.status.success());
    let logged = fs::read_to_string(&log).unwrap();
    assert!(logged.contains("No root directory could be watched"));
}
