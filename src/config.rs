//! Layered configuration for the watchdog.
//!
//! Sources, lowest precedence first:
//! - Default values
//! - TOML configuration file (`--config <path>`, else `cdog.toml` if present)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CDOG_` and use double
//! underscores to separate nested levels:
//! - `CDOG_QUARANTINE_DIR=/srv/jail` sets `quarantine_dir`
//! - `CDOG_WATCH__MAX_WATCHES=4096` sets `watch.max_watches`
//! - `CDOG_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::quarantine::{QuarantinePolicy, UnwantedExtensions};
use crate::watcher::DEFAULT_MAX_WATCHES;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "cdog.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "CDOG_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Directory trees to watch
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Move unwanted files here instead of deleting them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarantine_dir: Option<PathBuf>,

    /// Extensions that mark a file as unwanted (leading dot optional)
    #[serde(default = "default_unwanted_extensions")]
    pub unwanted_extensions: Vec<String>,

    /// Watch registry and event loop settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Maximum number of directories tracked at once
    #[serde(default = "default_max_watches")]
    pub max_watches: usize,

    /// Read buffer size, in maximal event records
    #[serde(default = "default_buffer_events")]
    pub buffer_events: usize,

    /// How long one read waits before re-checking for shutdown
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Run the policy over files already present in newly created
    /// directories
    #[serde(default = "default_true")]
    pub sweep_new_directories: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: IndexMap<String, String>,

    /// Append log lines to this file instead of stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_unwanted_extensions() -> Vec<String> {
    vec![".gif".to_string(), ".php".to_string()]
}
fn default_max_watches() -> usize {
    DEFAULT_MAX_WATCHES
}
fn default_buffer_events() -> usize {
    256
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            quarantine_dir: None,
            unwanted_extensions: default_unwanted_extensions(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_watches: default_max_watches(),
            buffer_events: default_buffer_events(),
            poll_interval_ms: default_poll_interval_ms(),
            sweep_new_directories: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: IndexMap::new(),
            file: None,
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// `config_path` overrides the default `cdog.toml` lookup.
    pub fn load(config_path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Load configuration from a specific file, without environment
    /// overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(Box::new)
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// The configured denylist.
    pub fn unwanted_extensions(&self) -> UnwantedExtensions {
        UnwantedExtensions::new(&self.unwanted_extensions)
    }

    /// Policy built from the denylist and quarantine directory.
    pub fn quarantine_policy(&self) -> QuarantinePolicy {
        QuarantinePolicy::new(self.unwanted_extensions(), self.quarantine_dir.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.roots.is_empty());
        assert_eq!(settings.quarantine_dir, None);
        assert_eq!(settings.unwanted_extensions, vec![".gif", ".php"]);
        assert_eq!(settings.watch.max_watches, 1024);
        assert!(settings.watch.sweep_new_directories);
        assert_eq!(settings.logging.default, "info");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("cdog.toml");

        let toml_content = r#"
roots = ["/srv/www", "/srv/uploads"]
quarantine_dir = "/srv/jail"
unwanted_extensions = [".exe", "js"]

[watch]
max_watches = 64
poll_interval_ms = 50

[logging]
default = "debug"
file = "/var/log/cdog.log"

[logging.modules]
"cdog::watcher" = "trace"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(
            settings.roots,
            vec![PathBuf::from("/srv/www"), PathBuf::from("/srv/uploads")]
        );
        assert_eq!(settings.quarantine_dir, Some(PathBuf::from("/srv/jail")));
        // Custom extensions replace the defaults
        assert_eq!(settings.unwanted_extensions, vec![".exe", "js"]);
        assert_eq!(settings.watch.max_watches, 64);
        assert_eq!(settings.poll_interval(), Duration::from_millis(50));
        assert_eq!(settings.logging.default, "debug");
        assert_eq!(settings.logging.file, Some(PathBuf::from("/var/log/cdog.log")));
        assert_eq!(settings.logging.modules["cdog::watcher"], "trace");
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("cdog.toml");

        fs::write(&config_path, "[watch]\nbuffer_events = 8\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        assert_eq!(settings.watch.buffer_events, 8);
        // Defaults fill everything else
        assert_eq!(settings.watch.max_watches, 1024);
        assert_eq!(settings.unwanted_extensions, vec![".gif", ".php"]);
        assert!(settings.roots.is_empty());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.watch.poll_interval_ms, 250);
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("cdog.toml");
        fs::write(&config_path, "[watch]\nmax_watches = \"lots\"\n").unwrap();

        assert!(Settings::load_from(&config_path).is_err());
    }

    #[test]
    fn test_to_toml_reloads() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("cdog.toml");

        let mut settings = Settings::default();
        settings.roots.push(PathBuf::from("/data"));
        settings.quarantine_dir = Some(PathBuf::from("/jail"));
        fs::write(&config_path, settings.to_toml().unwrap()).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.roots, vec![PathBuf::from("/data")]);
        assert_eq!(loaded.quarantine_dir, Some(PathBuf::from("/jail")));
    }

    #[test]
    fn test_quarantine_policy_from_settings() {
        let mut settings = Settings::default();
        assert_eq!(settings.quarantine_policy().target(), None);

        settings.quarantine_dir = Some(PathBuf::from("/jail"));
        let policy = settings.quarantine_policy();
        assert_eq!(policy.target(), Some(Path::new("/jail")));
        assert!(policy.is_unwanted(Path::new("/www/a.gif")));
    }
}
