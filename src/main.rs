use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use cdog::cli::Cli;
use cdog::config::Settings;
use cdog::logging::{self, LogTarget};
use cdog::shutdown;
use cdog::utils::absolute_root;
use cdog::watcher::{EventDispatcher, InotifySource, WatchError, WatchRegistry};
use cdog::{debug_event, log_event};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Some(path) = &cli.config {
        if !path.is_file() {
            anyhow::bail!("config file not found: {}", path.display());
        }
    }

    let mut settings = Settings::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Configuration error")?;
    cli.apply_to(&mut settings);

    if cli.show_config {
        print!("{}", settings.to_toml().context("failed to render settings")?);
        return Ok(ExitCode::SUCCESS);
    }

    if settings.roots.is_empty() {
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    }

    match logging::init_with_config(&settings.logging) {
        LogTarget::File(path) => debug_event!("cdog", "logging to", "{}", path.display()),
        LogTarget::Stdout => debug_event!("cdog", "logging to", "stdout"),
    }
    log_event!(
        "cdog",
        "starting",
        "v{} pid {}",
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    );

    if let Some(dir) = settings.quarantine_dir.take() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create quarantine directory {}", dir.display()))?;
        // Canonical, like the watched roots, so moved files are recognised.
        let dir = fs::canonicalize(&dir)
            .with_context(|| format!("cannot resolve quarantine directory {}", dir.display()))?;
        log_event!("cdog", "quarantine", "moving unwanted files to {}", dir.display());
        settings.quarantine_dir = Some(dir);
    }

    let policy = settings.quarantine_policy();
    log_event!("cdog", "unwanted extensions", "{}", policy.extensions());

    let source = match InotifySource::new(settings.watch.buffer_events) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("[cdog] {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let shutdown_flag = shutdown::shutdown_flag();
    shutdown::install_signal_handlers(shutdown_flag.clone())
        .context("failed to install signal handlers")?;

    let mut dispatcher = EventDispatcher::new(
        source,
        WatchRegistry::new(settings.watch.max_watches),
        policy,
    )
    .with_shutdown_flag(shutdown_flag)
    .with_poll_interval(settings.poll_interval())
    .sweep_new_directories(settings.watch.sweep_new_directories);

    for root in &settings.roots {
        let root = match absolute_root(root) {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!("[cdog] skipping root {}: {e}", root.display());
                continue;
            }
        };

        let report = dispatcher.pin_root(&root);
        if report.root.is_some() {
            log_event!(
                "cdog",
                "root",
                "{} ({} directories, {} skipped)",
                root.display(),
                report.watched + report.already_watched,
                report.skipped
            );
        } else {
            tracing::warn!("[cdog] skipping root {}: could not be watched", root.display());
        }
    }

    if dispatcher.roots().is_empty() {
        tracing::error!("[cdog] {}", WatchError::NothingWatched);
        return Ok(ExitCode::FAILURE);
    }

    let result = dispatcher.run();
    dispatcher.teardown();

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::error!("[cdog] {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
