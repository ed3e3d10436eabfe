//! Command-line interface for autosort.
//!
//! This module handles:
//! - Argument parsing (clap)
//! - One-shot sorting with a progress spinner and summary
//! - Periodic sorting until Ctrl-C
//! - Editing the category map stored in the settings file

use crate::config::{ConfigError, SorterConfig};
use crate::output::OutputFormatter;
use crate::scheduler::{IntervalPeriod, Notification, RunReport, Scheduler, SharedLogSink};
use crate::sorter::SortRequest;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Sort files into category folders by extension.
#[derive(Debug, Parser)]
#[command(name = "autosort", version, about)]
pub struct Cli {
    /// Settings file to use instead of the default lookup.
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More diagnostic output on stderr (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sort the source directory once.
    Sort {
        #[command(flatten)]
        run: RunArgs,
        /// Print the run report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Sort the source directory repeatedly until interrupted.
    Watch {
        #[command(flatten)]
        run: RunArgs,
        /// Minutes between runs (defaults to the configured interval).
        #[arg(long, value_name = "MINUTES", value_parser = parse_period)]
        every: Option<IntervalPeriod>,
    },
    /// Show or edit categories.
    #[command(subcommand)]
    Categories(CategoryCommand),
}

/// Overrides for the configured source, target and layout.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Directory to sort files out of.
    #[arg(short, long, value_name = "DIR")]
    pub source: Option<PathBuf>,
    /// Directory that receives the category folders.
    #[arg(short, long, value_name = "DIR")]
    pub target: Option<PathBuf>,
    /// Put files in per-extension folders inside each category.
    #[arg(long)]
    pub separate_by_extension: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CategoryCommand {
    /// List categories and their extensions.
    List,
    /// Add an empty category.
    Add { name: String },
    /// Remove a category.
    Remove { name: String },
    /// Rename a category.
    Rename { old: String, new: String },
    /// Add extensions to a category.
    AddExt {
        name: String,
        #[arg(required = true)]
        extensions: Vec<String>,
    },
    /// Remove extensions from a category.
    RemoveExt {
        name: String,
        #[arg(required = true)]
        extensions: Vec<String>,
    },
    /// Restore the built-in categories.
    Reset,
}

fn parse_period(value: &str) -> Result<IntervalPeriod, ConfigError> {
    value.parse()
}

impl RunArgs {
    /// Applies these overrides to the loaded settings.
    pub fn apply(&self, config: &SorterConfig) -> SortRequest {
        let mut request = config.to_request();
        if let Some(source) = &self.source {
            request.source = source.clone();
        }
        if let Some(target) = &self.target {
            request.target = target.clone();
        }
        if self.separate_by_extension {
            request.separate_by_extension = true;
        }
        request
    }
}

/// Runs the parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Sort { run, json } => sort_once(config_path, &run, json),
        Command::Watch { run, every } => watch(config_path, &run, every),
        Command::Categories(command) => edit_categories(config_path, command),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("autosort-worker")
        .build()
        .context("Failed to start the async runtime")
}

/// Sorts once and prints a summary (or JSON).
pub fn sort_once(config_path: Option<&Path>, args: &RunArgs, json: bool) -> Result<()> {
    let config = SorterConfig::load(config_path).context("Error loading configuration")?;
    let request = args.apply(&config);
    warn_about_overlaps(&config);

    let spinner = (!json).then(|| {
        OutputFormatter::create_spinner(&format!("Sorting {}", request.source.display()))
    });
    let sink: SharedLogSink = match &spinner {
        Some(spinner) => {
            let spinner = spinner.clone();
            Arc::new(move |line: &str| {
                if line.starts_with("Moved: ") {
                    spinner.inc(1);
                }
                spinner.println(line);
            })
        }
        None => Arc::new(|line: &str| eprintln!("{}", line)),
    };

    let outcome = runtime()?.block_on(async move {
        let scheduler = Scheduler::new(sink);
        let ticket = scheduler.run_once(request)?;
        Ok::<_, anyhow::Error>(ticket.wait().await)
    })?;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let report = outcome.context("Sorting failed")?;
    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("Failed to render report as JSON")?;
        println!("{}", rendered);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    OutputFormatter::success(&format!(
        "Sorting completed. Total files found: {}. Files moved: {}.",
        report.result.total_files, report.result.moved_files
    ));
    OutputFormatter::summary_table(
        &report.stats,
        report.result.total_files,
        report.result.moved_files,
    );
}

/// Sorts on a timer until Ctrl-C. Settings are re-read at every firing.
pub fn watch(
    config_path: Option<&Path>,
    args: &RunArgs,
    every: Option<IntervalPeriod>,
) -> Result<()> {
    let config = SorterConfig::load(config_path).context("Error loading configuration")?;
    warn_about_overlaps(&config);
    let period = match every {
        Some(period) => period,
        None => IntervalPeriod::from_minutes(config.interval_minutes)
            .context("Invalid interval in configuration")?,
    };

    let provider = {
        let config_path = config_path.map(Path::to_path_buf);
        let args = args.clone();
        let last_good = std::sync::Mutex::new(config);
        move || {
            let mut last = last_good.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match SorterConfig::load(config_path.as_deref()) {
                Ok(fresh) => *last = fresh,
                Err(e) => warn!(error = %e, "keeping previous settings"),
            }
            args.apply(&last)
        }
    };

    runtime()?.block_on(async move {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: SharedLogSink = Arc::new(|line: &str| OutputFormatter::plain(line));
        let mut scheduler = Scheduler::new(sink).with_notifications(tx);

        scheduler.start_interval(provider, period);
        OutputFormatter::info(&format!(
            "Auto-sort started. Running every {}. Press Ctrl-C to stop.",
            period
        ));

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!(error = %e, "could not listen for Ctrl-C");
                    }
                    break;
                }
                Some(notification) = rx.recv() => report_firing(notification),
            }
        }

        scheduler.shutdown().await;
        OutputFormatter::info("Auto-sort stopped.");
        Ok(())
    })
}

fn report_firing(notification: Notification) {
    match notification {
        Notification::Completed(report) if report.result.moved_files > 0 => {
            OutputFormatter::summary_table(
                &report.stats,
                report.result.total_files,
                report.result.moved_files,
            );
        }
        Notification::Completed(_) => {}
        Notification::Failed(message) => OutputFormatter::error(&message),
        Notification::Skipped(message) => OutputFormatter::warning(&message),
    }
}

/// Applies one category edit and saves the settings.
pub fn edit_categories(config_path: Option<&Path>, command: CategoryCommand) -> Result<()> {
    let mut config = SorterConfig::load(config_path).context("Error loading configuration")?;
    let categories = &mut config.categories;

    let message = match command {
        CategoryCommand::List => {
            OutputFormatter::category_table(categories);
            warn_about_overlaps(&config);
            return Ok(());
        }
        CategoryCommand::Add { name } => {
            if categories.add_category(&name).map_err(ConfigError::from)? {
                format!("Added category \"{}\"", name.trim())
            } else {
                format!("Category \"{}\" already exists", name.trim())
            }
        }
        CategoryCommand::Remove { name } => {
            categories.remove_category(&name).map_err(ConfigError::from)?;
            format!("Removed category \"{}\"", name)
        }
        CategoryCommand::Rename { old, new } => {
            categories
                .rename_category(&old, &new)
                .map_err(ConfigError::from)?;
            format!("Renamed \"{}\" to \"{}\"", old, new.trim())
        }
        CategoryCommand::AddExt { name, extensions } => {
            let mut added = 0;
            for ext in &extensions {
                if categories.add_extension(&name, ext).map_err(ConfigError::from)? {
                    added += 1;
                }
            }
            format!("Added {} extension(s) to \"{}\"", added, name)
        }
        CategoryCommand::RemoveExt { name, extensions } => {
            let mut removed = 0;
            for ext in &extensions {
                if categories
                    .remove_extension(&name, ext)
                    .map_err(ConfigError::from)?
                {
                    removed += 1;
                }
            }
            format!("Removed {} extension(s) from \"{}\"", removed, name)
        }
        CategoryCommand::Reset => {
            *categories = Default::default();
            "Restored the default categories".to_string()
        }
    };

    let path = SorterConfig::writable_path(config_path);
    config
        .save(&path)
        .with_context(|| format!("Could not save settings to {}", path.display()))?;
    OutputFormatter::success(&format!("{} ({})", message, path.display()));
    warn_about_overlaps(&config);
    Ok(())
}

fn warn_about_overlaps(config: &SorterConfig) {
    for (ext, owners) in config.categories.overlapping_extensions() {
        OutputFormatter::warning(&format!(
            "Extension \"{}\" is listed under {}; which one wins is not defined",
            ext,
            owners.join(", ")
        ));
    }
}
