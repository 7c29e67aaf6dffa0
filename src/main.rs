mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod model;
mod validate;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use crate::api::OfdataClient;
use crate::config::{split_codes, Config};
use crate::fetcher::{FetchReport, Fetcher};
use crate::model::ResultSet;

#[derive(Parser)]
#[command(
    name = "ofdata_etl",
    about = "Load organizations by OKVED code from the ofdata.ru registry search into SQLite"
)]
struct Cli {
    /// SQLite database file (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SearchArgs {
    /// Comma separated OKVED codes, e.g. 62,62.01,62.02.1 (overrides OKVED_CODES)
    #[arg(short, long)]
    okved: Option<String>,
    /// Region number (overrides REGION)
    #[arg(short, long)]
    region: Option<String>,
    /// Records per page, at least 1 (overrides PAGE_LIMIT)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    page_limit: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all pages for every code and load them in one transaction
    Run {
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Fetch all pages and write the result set to a JSON file
    Fetch {
        #[command(flatten)]
        search: SearchArgs,
        /// Output JSON file
        #[arg(long)]
        out: PathBuf,
    },
    /// Load a result set written by `fetch`
    Load {
        /// Input JSON file
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Show row counts per OKVED code
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    match cli.command {
        Commands::Run { search } => {
            search.apply(&mut config);
            let report = fetch(&config).await?;
            let loaded = db::load(&config.database_path, &report.results)?;
            println!(
                "Loaded {} companies for {} OKVED codes into {}",
                loaded.inserted,
                report.results.len(),
                config.database_path.display()
            );
            for (code, n) in &loaded.per_code {
                println!("  {:<10} {:>6}", code, n);
            }
        }
        Commands::Fetch { search, out } => {
            search.apply(&mut config);
            let report = fetch(&config).await?;
            report
                .results
                .write_json(&out)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!(
                "Wrote {} companies for {} OKVED codes to {}",
                report.results.total_records(),
                report.results.len(),
                out.display()
            );
        }
        Commands::Load { input } => {
            let results = ResultSet::read_json(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let loaded = db::load(&config.database_path, &results)?;
            println!(
                "Loaded {} companies from {} into {}",
                loaded.inserted,
                input.display(),
                config.database_path.display()
            );
        }
        Commands::Stats => {
            let conn = db::connect(&config.database_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            for (code, n) in &s.per_code {
                println!("{:<10} {:>6}", code, n);
            }
            println!("Total:     {}", s.total);
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {:.1}s", elapsed.as_secs_f64());
    }
    Ok(())
}

impl SearchArgs {
    fn apply(self, config: &mut Config) {
        if let Some(codes) = self.okved {
            config.okved_codes = split_codes(&codes);
        }
        if self.region.is_some() {
            config.region = self.region;
        }
        if let Some(limit) = self.page_limit {
            config.page_limit = limit;
        }
    }
}

/// Validate, then page through the search for every code.
async fn fetch(config: &Config) -> anyhow::Result<FetchReport> {
    let client = OfdataClient::new(&config.search_url, config.api_key()?, config.http_timeout)?;
    let fetcher = Fetcher::new(client, config.page_limit);
    let report = fetcher
        .fetch_raw(config.okved_codes.as_slice(), config.region.as_deref())
        .await?;
    if report.anomalies() > 0 {
        warn!(
            "{} of {} codes stopped early on an API anomaly",
            report.anomalies(),
            report.summaries.len()
        );
        for s in report.summaries.iter().filter(|s| s.stop.is_anomaly()) {
            warn!("  OKVED {}: {:?} after {} requests", s.okved, s.stop, s.requests);
        }
    }
    Ok(report)
}
