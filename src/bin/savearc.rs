//! # Savearc CLI - Incremental save-game archiving
//!
//! Command-line front end for the savearc library.
//!
//! ## Usage
//! ```bash
//! # Archive every configured game
//! savearc archive
//!
//! # Archive a single game with a spinner
//! savearc --game factorio --progress archive
//!
//! # Restore everything, skipping files that already match
//! savearc unarchive
//!
//! # Use another config file and fewer threads
//! savearc --config ./config.json --threads 2 restore
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use savearc::utils::format_bytes;
use savearc::{
    ArchiveConfig, ArchiveReport, ProgressCallback, ProgressInfo, RestoreReport, Result, RunSummary,
    SaveArchiver,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Savearc CLI - Incremental archiving of save-game directories
#[derive(Parser)]
#[command(name = "savearc")]
#[command(author = "Gavin Hurlbut <gjhurlbu@gmail.com>")]
#[command(version)]
#[command(about = "Archive and restore save-game directories, only touching what changed")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.archive/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Worker threads (overrides the configuration)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    /// Only process this game
    #[arg(short, long, global = true)]
    game: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show a progress spinner
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive changed files of every configured unit
    Archive,

    /// Restore every configured unit from its container
    #[command(alias = "restore")]
    Unarchive,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Main command runner; returns false if any unit failed
fn run(cli: Cli) -> Result<bool> {
    let config_path = match cli.config {
        Some(path) => path,
        None => ArchiveConfig::default_path()?,
    };
    let config = ArchiveConfig::load(&config_path)?;

    let mut archiver = SaveArchiver::new(config).with_game_filter(cli.game);
    if let Some(threads) = cli.threads {
        archiver = archiver.with_threads(threads);
    }

    let spinner = if cli.progress { Some(spinner()) } else { None };
    if let Some(ref pb) = spinner {
        archiver = archiver.with_progress(progress_callback(pb.clone()));
    }

    let ok = match cli.command {
        Commands::Archive => {
            println!("{}", "Archiving...".blue().bold());
            let summary = archiver.archive_all();
            finish_spinner(&spinner);
            print_archive_summary(&summary?)
        }
        Commands::Unarchive => {
            println!("{}", "Unarchiving...".blue().bold());
            let summary = archiver.restore_all();
            finish_spinner(&spinner);
            print_restore_summary(&summary?)
        }
    };
    Ok(ok)
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Scanning files...");
    pb
}

fn progress_callback(pb: ProgressBar) -> ProgressCallback {
    Arc::new(move |info: ProgressInfo| {
        let counter = match info.percentage() {
            Some(pct) => format!("{:.0}%", pct),
            None => info.processed.to_string(),
        };
        match info.current_item {
            Some(item) => pb.set_message(format!("{} [{}] {}", info.operation, counter, item)),
            None => pb.set_message(format!("{} [{}]", info.operation, counter)),
        }
    })
}

fn finish_spinner(spinner: &Option<ProgressBar>) {
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
}

fn print_archive_summary(summary: &RunSummary<ArchiveReport>) -> bool {
    for report in &summary.completed {
        if report.skipped {
            println!("{} {} unchanged", "=".dimmed(), report.unit.yellow());
            continue;
        }
        println!("{} Archived {}", "✓".green().bold(), report.unit.yellow().bold());
        println!(
            "  Files: {} of {}",
            report.files_archived.to_string().cyan(),
            report.files_scanned.to_string().cyan()
        );
        println!(
            "  Size: {} -> {}",
            format_bytes(report.bytes_archived).cyan(),
            format_bytes(report.compressed_size).cyan()
        );
        println!("  Time: {}", format_duration(round_millis(report.duration)).to_string().cyan());
    }
    print_failures(summary)
}

fn print_restore_summary(summary: &RunSummary<RestoreReport>) -> bool {
    for report in &summary.completed {
        println!("{} Restored {}", "✓".green().bold(), report.unit.yellow().bold());
        println!(
            "  Files extracted: {} of {}",
            report.members_extracted.to_string().cyan(),
            report.members_total.to_string().cyan()
        );
        println!("  Unchanged: {}", report.members_skipped.to_string().yellow());
        println!("  Archive: {}", format_bytes(report.archive_size).cyan());
        println!("  Time: {}", format_duration(round_millis(report.duration)).to_string().cyan());
    }
    print_failures(summary)
}

fn print_failures<T>(summary: &RunSummary<T>) -> bool {
    for failure in &summary.failures {
        println!(
            "{} {}/{}: {}",
            "✗".red().bold(),
            failure.game,
            failure.unit,
            failure.message.red()
        );
    }
    println!(
        "\n{} units, {} failed, {}",
        summary.total().to_string().bold(),
        summary.failures.len().to_string().bold(),
        format_duration(round_millis(summary.duration))
    );
    summary.is_success()
}

fn round_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
