//! CLI argument parsing using clap.

use clap::{
    Parser,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::Settings;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const AFTER_HELP: &str = "\
Examples:
  $ cdog /srv/www                          # Delete unwanted files under /srv/www
  $ cdog --moveto=/srv/jail /srv/www /tmp  # Move them into /srv/jail instead
  $ cdog --logto=/var/log/cdog.log /srv/www
  $ cdog --show-config                     # Print effective settings

Settings are read from ./cdog.toml (or --config) and CDOG_* environment
variables, e.g. CDOG_WATCH__MAX_WATCHES=4096.";

/// Watch directory trees and remove files with unwanted extensions
#[derive(Parser, Debug)]
#[command(
    name = "cdog",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch directory trees and remove files with unwanted extensions",
    long_about = "Recursively watch directory trees. New subdirectories are watched as \
                  they appear; new files whose extension is on the denylist are deleted \
                  or moved into a quarantine directory.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Directories to watch, in addition to `roots` from the config
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Move unwanted files into this directory instead of deleting them
    #[arg(long, value_name = "PATH")]
    pub moveto: Option<PathBuf>,

    /// Append log output to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    pub logto: Option<PathBuf>,

    /// Path to custom cdog.toml file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub show_config: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    pub fn apply_to(&self, settings: &mut Settings) {
        for path in &self.paths {
            if !settings.roots.contains(path) {
                settings.roots.push(path.clone());
            }
        }
        if let Some(dir) = &self.moveto {
            settings.quarantine_dir = Some(dir.clone());
        }
        if let Some(file) = &self.logto {
            settings.logging.file = Some(file.clone());
        }
    }
}
