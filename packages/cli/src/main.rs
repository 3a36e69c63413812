#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line host for the retail crawl toolchain.
//!
//! Discovers product URLs (`crawl`), scrapes them into per-category CSV
//! files (`scrape`), or both in one go (`run`). Uses `indicatif-log-bridge`
//! (via [`retail_crawl_cli_utils::init_logger`]) so log lines and progress
//! spinners never fight for the terminal.

mod pipeline;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use retail_crawl_retailer::{
    ConfigError, RetailerDefinition, all_retailers, find_retailer, load_from_path,
};

use crate::pipeline::Overrides;

#[derive(Parser)]
#[command(name = "retail_crawl", about = "Retail product crawler and scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in retailers
    Retailers,
    /// Discover product URLs starting from the retailer's seed
    Crawl(JobArgs),
    /// Scrape the product URLs recorded by the last crawl
    Scrape(JobArgs),
    /// Crawl, then scrape if new URLs were found
    Run(JobArgs),
}

#[derive(Args)]
struct JobArgs {
    /// Retailer id (see `retailers`)
    #[arg(required_unless_present = "config")]
    retailer: Option<String>,
    /// Load the retailer definition from a TOML file instead
    #[arg(long, conflicts_with = "retailer")]
    config: Option<PathBuf>,
    /// Directory for output files, replacing the configured ones
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Upload results to the configured S3 targets
    #[arg(long)]
    upload: bool,
    /// Maximum number of in-flight requests
    #[arg(long)]
    concurrency: Option<usize>,
    /// Number of URLs processed per batch
    #[arg(long)]
    batch_size: Option<usize>,
}

impl JobArgs {
    fn definition(&self) -> Result<RetailerDefinition, ConfigError> {
        match (&self.config, &self.retailer) {
            (Some(path), _) => load_from_path(path),
            (None, Some(id)) => find_retailer(id),
            (None, None) => Err(ConfigError::Invalid {
                message: "no retailer given".to_owned(),
            }),
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            output_dir: self.output_dir.clone(),
            upload: self.upload,
            concurrency: self.concurrency,
            batch_size: self.batch_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = retail_crawl_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Retailers => {
            println!("{:<20} {:<25} SEED", "ID", "NAME");
            println!("{}", "-".repeat(70));
            for retailer in all_retailers()? {
                println!("{:<20} {:<25} {}", retailer.id, retailer.name, retailer.seed_url);
            }
        }
        Commands::Crawl(args) => {
            let report = pipeline::crawl(&args.definition()?, &args.overrides(), &multi).await?;
            log::info!(
                "Crawl complete: {} urls, {} new",
                report.total,
                report.new_urls
            );
        }
        Commands::Scrape(args) => {
            if let Some(report) =
                pipeline::scrape(&args.definition()?, &args.overrides(), &multi).await?
            {
                log::info!(
                    "Scrape complete: {} valid of {} scraped, {} file(s)",
                    report.valid,
                    report.scraped,
                    report.files.len()
                );
            }
        }
        Commands::Run(args) => {
            pipeline::run(&args.definition()?, &args.overrides(), &multi).await?;
        }
    }

    Ok(())
}
