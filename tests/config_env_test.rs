use cdog::Settings;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// Environment variables are process-wide, so everything that touches them
// lives in this single test.
#[test]
fn test_env_overrides_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("cdog.toml");
    fs::write(
        &config_path,
        r#"
quarantine_dir = "/from/file"

[watch]
max_watches = 64
buffer_events = 16
"#,
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("CDOG_WATCH__MAX_WATCHES", "4096");
        env::set_var("CDOG_WATCH__SWEEP_NEW_DIRECTORIES", "false");
        env::set_var("CDOG_QUARANTINE_DIR", "/from/env");
        env::set_var("CDOG_LOGGING__DEFAULT", "debug");
    }

    let settings = Settings::load(Some(&config_path));

    unsafe {
        env::remove_var("CDOG_WATCH__MAX_WATCHES");
        env::remove_var("CDOG_WATCH__SWEEP_NEW_DIRECTORIES");
        env::remove_var("CDOG_QUARANTINE_DIR");
        env::remove_var("CDOG_LOGGING__DEFAULT");
    }

    let settings = settings.unwrap();
    assert_eq!(settings.watch.max_watches, 4096, "env beats file");
    assert!(!settings.watch.sweep_new_directories);
    assert_eq!(settings.quarantine_dir, Some(PathBuf::from("/from/env")));
    assert_eq!(settings.logging.default, "debug");
    // Untouched by env, so the file value stays
    assert_eq!(settings.watch.buffer_events, 16);
    // Untouched by both
    assert_eq!(settings.unwanted_extensions, vec![".gif", ".php"]);
}
