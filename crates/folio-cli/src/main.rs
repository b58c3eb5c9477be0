use anyhow::Result;
use clap::{Parser, Subcommand};
use folio_adapters::GitHubApi;
use folio_storage::CatalogStore;
use folio_sync::PipelineConfig;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "folio-cli")]
#[command(about = "Portfolio catalog pipeline: harvest repositories, enrich with README blurbs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stage 1: fetch repository metadata and overwrite the catalog.
    Harvest {
        /// Maximum number of repositories to fetch (overrides FOLIO_FETCH_LIMIT).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Stage 2: patch README blurbs onto the existing catalog.
    Enrich,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env();

    match cli.command {
        Commands::Harvest { limit } => {
            if let Some(limit) = limit {
                config.fetch_limit = limit;
            }
            let api = GitHubApi::new(config.github())?;
            let store = CatalogStore::new(&config.catalog_path);
            let report = folio_sync::run_harvest(&api, &store, config.fetch_limit).await?;
            println!(
                "harvest complete: run_id={} login={} records={} catalog={}",
                report.run_id, report.login, report.records, report.catalog_path
            );
        }
        Commands::Enrich => {
            let api = GitHubApi::new(config.github())?;
            let store = CatalogStore::new(&config.catalog_path);
            let report = folio_sync::run_enrich(&api, &store).await?;
            println!(
                "enrich complete: run_id={} enriched={}/{} catalog={}",
                report.run_id, report.enriched, report.total, report.catalog_path
            );
        }
    }

    Ok(())
}
