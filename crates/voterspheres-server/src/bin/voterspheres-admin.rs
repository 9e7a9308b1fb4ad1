//! VoterSpheres admin CLI
//!
//! One-shot imports and cache warming against the configured database.
//! Exit codes: 0 success, 2 partial (some records skipped), 1 fatal,
//! 130 interrupted.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::error;
use voterspheres_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use voterspheres_ingest::{DelimitedFileSource, PagedApiSource};

use voterspheres_server::app::App;
use voterspheres_server::config::{parse_delimiter, Config};
use voterspheres_server::ingest::{ImportOutcome, ImportSource, ImportStats};

#[derive(Parser, Debug)]
#[command(name = "voterspheres-admin")]
#[command(author, version, about = "VoterSpheres directory administration", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import every page of the configured candidate API (INGEST_API_BASE)
    ImportApi,

    /// Import a delimited file with a header row
    ImportFile {
        /// Path to the file
        path: PathBuf,

        /// Field delimiter: a single character, or "tab"
        #[arg(short, long)]
        delimiter: Option<String>,

        /// Source name recorded on each row
        #[arg(long)]
        source: Option<String>,
    },

    /// Enqueue warm jobs for every profile and sitemap chunk
    WarmAll {
        /// Work the queue in this process until it is empty
        #[arg(long)]
        drain: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("voterspheres-admin")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().with_env_overrides().unwrap_or(log_config);

    // The CLI still works without logging
    let _log_guard = init_logging(&log_config).ok();

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            1
        }
    };

    process::exit(code);
}

async fn run(cli: &Cli) -> anyhow::Result<i32> {
    let config = Config::load()?;
    let app = App::connect(config).await?;

    let cancel = app.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping after the current batch");
            cancel.cancel();
        }
    });

    match &cli.command {
        Commands::ImportApi => {
            let api_config = app
                .config
                .ingest
                .api
                .clone()
                .context("INGEST_API_BASE must be set for import-api")?;
            let source = PagedApiSource::new(api_config)?;

            let stats = app
                .coordinator()
                .run_import(ImportSource::Paged(&source))
                .await;
            print_import(&stats, cli.json)?;
            Ok(stats.outcome.exit_code())
        }

        Commands::ImportFile {
            path,
            delimiter,
            source,
        } => {
            let delimiter = match delimiter {
                Some(raw) => parse_delimiter(raw)?,
                None => app.config.ingest.file_delimiter,
            };
            let mut file = DelimitedFileSource::new(path).with_delimiter(delimiter);
            if let Some(name) = source {
                file = file.with_source_name(name);
            }

            let stats = app.coordinator().run_import(ImportSource::File(&file)).await;
            print_import(&stats, cli.json)?;
            Ok(stats.outcome.exit_code())
        }

        Commands::WarmAll { drain } => {
            let stats = app.pregenerator().enqueue_warm_all().await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "Enqueued {} warm jobs ({} records, {} sitemap chunks) in {:.1}s",
                    stats.enqueued, stats.records, stats.chunks, stats.duration_secs
                );
            }

            if *drain {
                let counts = app.engine().run_until_idle().await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&counts)?);
                } else {
                    println!(
                        "Queue drained: {} succeeded, {} failed",
                        counts.succeeded, counts.failed
                    );
                }
                if counts.failed > 0 {
                    return Ok(ImportOutcome::Partial.exit_code());
                }
            }
            Ok(0)
        }
    }
}

fn print_import(stats: &ImportStats, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }

    match stats.outcome {
        ImportOutcome::Fatal => {
            eprintln!(
                "Import from {} failed: {}",
                stats.source,
                stats.error.as_deref().unwrap_or("unknown error")
            );
            println!("Imported {} records before failing", stats.imported());
        }
        ImportOutcome::Cancelled => {
            println!("Import cancelled after {} records", stats.imported());
        }
        ImportOutcome::Success | ImportOutcome::Partial => {
            println!(
                "Imported {} records from {} ({} new, {} updated) in {:.1}s",
                stats.imported(),
                stats.source,
                stats.inserted,
                stats.updated,
                stats.duration_secs
            );
        }
    }

    if stats.skipped > 0 {
        println!("Skipped {} records:", stats.skipped);
        for skip in &stats.skip_reasons {
            println!("  {}: {}", skip.reference, skip.reason);
        }
        let unlisted = stats.skipped.saturating_sub(stats.skip_reasons.len() as u64);
        if unlisted > 0 {
            println!("  ... and {} more", unlisted);
        }
    }

    Ok(())
}
