use clap::{Parser, Subcommand};
use log::{error, info};
use ocems_harvest::{HarvestConfig, HarvestError, Harvester, RelativeStart};
use std::path::PathBuf;
use std::process::ExitCode;

/// Harvest OCEMS sensor readings into year-partitioned archives.
#[derive(Parser, Debug)]
#[command(name = "ocems-harvest")]
#[command(about = "Harvest OCEMS industry readings into year-partitioned archives", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Archive root for partitions, manifests and industries.csv
    #[arg(long, global = true, env = "OCEMS_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Result cache directory (default: system cache dir)
    #[arg(long, global = true, env = "OCEMS_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Portal API base URL
    #[arg(long, global = true, env = "OCEMS_BASE_URL", default_value = ocems_harvest::DEFAULT_BASE_URL)]
    base_url: String,

    /// Accept invalid TLS certificates from the portal
    #[arg(long, global = true, env = "OCEMS_INSECURE", default_value_t = false)]
    insecure: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the active industries to {data-dir}/industries.csv
    DownloadIndustries,

    /// Harvest readings of the active (or the given) industries
    DownloadData {
        /// How far back to query, e.g. "2 days ago" or "10 years ago"
        #[arg(long, default_value = "10 years ago")]
        start: RelativeStart,

        /// Only harvest these industry ids
        #[arg(long = "industry")]
        industries: Vec<i64>,
    },

    /// Re-partition existing {industry}.csv.gz archives by year
    Split {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

async fn run(cli: Cli) -> Result<(), HarvestError> {
    let config = HarvestConfig::builder()
        .data_dir(cli.data_dir)
        .maybe_cache_dir(cli.cache_dir)
        .base_url(cli.base_url)
        .accept_invalid_certs(cli.insecure)
        .build();
    let harvester = Harvester::new(config).await?;

    match cli.command {
        Commands::DownloadIndustries => {
            let path = harvester.download_industries().await?;
            info!("Industries written to {:?}", path);
            Ok(())
        }
        Commands::DownloadData { start, industries } => {
            let report = harvester
                .harvest()
                .maybe_industries((!industries.is_empty()).then_some(industries))
                .start(start)
                .call()
                .await?;
            for (id, e) in &report.failed {
                error!("Industry {} not harvested: {}", id, e);
            }
            Ok(())
        }
        Commands::Split { paths } => {
            let results = harvester.split_archives(&paths).await;
            let failed = results.iter().filter(|r| r.is_err()).count();
            info!("Split {} of {} archives", results.len() - failed, results.len());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
