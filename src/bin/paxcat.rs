//! # Paxcat CLI
//!
//! Archive a directory into `<prefix>.pax.gz` and write its catalog to
//! `<prefix>.txt`.
//!
//! ## Usage
//! ```bash
//! # Archive /srv/data into /backups/data.pax.gz + /backups/data.txt
//! paxcat /srv/data /backups/data
//!
//! # List every item as it is archived, stop on the first unreadable one
//! paxcat -v --abort-on-error /srv/data /backups/data
//!
//! # Machine-readable summary
//! paxcat --json --workers 4 --level 6 /srv/data /backups/data
//! ```

use clap::Parser;
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use paxcat::utils::format_bytes;
use paxcat::{
    CompressionLevel, ErrorPolicy, PaxcatBuilder, PaxcatError, ProgressInfo, Result, RunSummary,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Paxcat - archive a directory tree with a matching catalog
#[derive(Parser)]
#[command(name = "paxcat")]
#[command(version)]
#[command(about = "Archive a directory into a compressed PAX tarball plus a text catalog")]
#[command(long_about = None)]
struct Cli {
    /// Directory to archive
    directory: PathBuf,

    /// Output prefix; writes <prefix>.pax.gz and <prefix>.txt
    output_prefix: PathBuf,

    /// Print every item as it is archived and enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Show a progress spinner
    #[arg(long)]
    progress: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Stop on the first item that cannot be archived
    #[arg(long)]
    abort_on_error: bool,

    /// Number of worker threads (defaults to the number of CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Gzip compression level (0-9)
    #[arg(short, long, default_value_t = 9)]
    level: u32,
}

fn main() {
    let cli = Cli::parse();

    // Skips are reported as warnings, so logging is always on
    let default_filter = if cli.verbose { "paxcat=debug" } else { "paxcat=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut builder = PaxcatBuilder::new()
        .compression_level(CompressionLevel::new(cli.level)?)
        .error_policy(if cli.abort_on_error {
            ErrorPolicy::Abort
        } else {
            ErrorPolicy::Skip
        });
    if let Some(workers) = cli.workers {
        if workers == 0 {
            return Err(PaxcatError::InvalidConfiguration(
                "--workers must be at least 1".to_string(),
            ));
        }
        builder = builder.parallel_workers(workers);
    }

    let spinner = if cli.progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Archiving...");
        Some(pb)
    } else {
        None
    };

    if cli.verbose || spinner.is_some() {
        let verbose = cli.verbose;
        let pb = spinner.clone();
        builder = builder.progress_callback(Arc::new(move |info: ProgressInfo| {
            let item = info.current_item.unwrap_or_default();
            if let Some(pb) = &pb {
                pb.set_message(format!(
                    "{} entries, {} - {}",
                    info.processed,
                    format_bytes(info.bytes_processed),
                    item
                ));
                if verbose {
                    pb.println(&item);
                }
            } else if verbose {
                println!("{}", item);
            }
        }));
    }

    let paxcat = builder.build(&cli.directory, &cli.output_prefix)?;
    let result = paxcat.run();

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let summary = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} Archived {} entries",
        "✓".green().bold(),
        summary.entries().to_string().yellow().bold()
    );
    println!(
        "  Directories: {}  Files: {}  Symlinks: {}",
        summary.directories.to_string().cyan(),
        summary.files.to_string().cyan(),
        summary.symlinks.to_string().cyan()
    );
    println!(
        "  Content: {}  Archive: {} ({} compressed)",
        format_bytes(summary.content_bytes).cyan(),
        format_bytes(summary.archive_bytes).cyan(),
        format_bytes(summary.compressed_bytes).cyan()
    );
    println!("  Archive: {}", summary.archive_path.display());
    println!("  Catalog: {}", summary.catalog_path.display());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(summary.duration_ms))
            .to_string()
            .cyan()
    );

    if !summary.skipped.is_empty() {
        println!(
            "\n{} {} item(s) skipped:",
            "Warning:".yellow().bold(),
            summary.skipped.len()
        );
        for skipped in &summary.skipped {
            println!("  - {}: {}", skipped.path.display(), skipped.reason.yellow());
        }
    }
}
