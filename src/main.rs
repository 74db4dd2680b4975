use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use eo_fetch::bbox::BoundingBox;
use eo_fetch::bucket::{self, Bucket};
use eo_fetch::config::{run_config_toml, RunConfig};
use eo_fetch::credentials::Credentials;
use eo_fetch::download_plan::DownloadReport;
use eo_fetch::eumetsat::DataStore;
use eo_fetch::fci::{self, chunks};
use eo_fetch::{firms, hls, lsasaf, s3, sentinel3_frp};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eo-fetch")]
#[command(about = "Earth observation data retrieval for wildfire monitoring")]
struct Args {
    /// Run configuration
    #[arg(long, global = true, default_value = "./inputs/run.toml")]
    config: PathBuf,

    /// Provider credentials
    #[arg(long, global = true, env = "EO_FETCH_CREDENTIALS", default_value = "./inputs/credentials.toml")]
    credentials: PathBuf,

    /// Concurrent downloads, overrides the run configuration
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Log level, RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a run configuration template
    Template {
        #[arg(default_value = "./inputs/run.toml")]
        output: PathBuf,
    },
    /// Print the FCI chunks covering a bounding box
    Chunks {
        /// West,South,East,North; the configured box when omitted
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<BoundingBox>,
    },
    /// MTG FCI L1c chunks from the EUMETSAT Data Store
    Fci,
    /// Active fires from NASA FIRMS
    Firms,
    /// Sentinel-3 SLSTR fire radiative power from the EUMETSAT Data Store
    #[command(name = "s3-frp")]
    S3Frp,
    /// HLS composite bands from NASA Earthdata
    Hls,
    /// MSG pixel fire radiative power from the LSA SAF mirror
    Lsasaf,
    /// Objects of an S3-compatible bucket
    Bucket,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    match &args.command {
        Command::Template { output } => {
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            RunConfig::from_template(&run_config_toml())?.write(output)?;
            info!(path = %output.display(), "Template written");
            return Ok(());
        }
        Command::Chunks { bbox: Some(bbox) } => {
            print_chunks(bbox);
            return Ok(());
        }
        _ => {}
    }

    let config = RunConfig::read(&args.config)?;
    let workers = args.workers.unwrap_or(config.workers);
    let window = config.window()?;

    match args.command {
        // written above
        Command::Template { .. } => {}
        Command::Chunks { .. } => print_chunks(&config.bbox),
        Command::Fci => {
            let credentials = Credentials::read(&args.credentials)?;
            let (key, secret) = credentials.eumdac_consumer()?;
            let store = DataStore::from_credentials(key, secret).await?;
            let output_dir = fci::output_dir(&config.output_folder, &config.run_name);
            let report = fci::download_from_archive(
                &store,
                &config.fci(),
                &window,
                &config.bbox,
                &output_dir,
                workers,
            )
            .await?;
            log_report("fci", &report);
        }
        Command::Firms => {
            let credentials = Credentials::read(&args.credentials)?;
            let output_dir = firms::output_dir(&config.output_folder, &config.run_name);
            let written = firms::fetch_active_fires(
                &config.firms(),
                credentials.firms_map_key()?,
                &window,
                &config.bbox,
                &output_dir,
            )
            .await?;
            info!(layers = written, dir = %output_dir.display(), "FIRMS retrieval finished");
        }
        Command::S3Frp => {
            let credentials = Credentials::read(&args.credentials)?;
            let (key, secret) = credentials.eumdac_consumer()?;
            let store = DataStore::from_credentials(key, secret).await?;
            let output_dir = sentinel3_frp::output_dir(&config.output_folder, &config.run_name);
            match sentinel3_frp::fetch_fire_radiative_power(
                &store,
                &config.sentinel3_frp(),
                &window,
                &config.bbox,
                &output_dir,
                workers,
            )
            .await?
            {
                Some(path) => info!(path = %path.display(), "S3 FRP retrieval finished"),
                None => warn!("S3 FRP retrieval produced no layer"),
            }
        }
        Command::Hls => {
            let credentials = Credentials::read(&args.credentials)?;
            let output_dir = hls::output_dir(&config.output_folder, &config.run_name);
            let report = hls::fetch_composite_bands(
                &config.hls(),
                credentials.earthdata_token()?,
                &window,
                &config.bbox,
                &output_dir,
                workers,
            )
            .await?;
            log_report("hls", &report);
        }
        Command::Lsasaf => {
            let output_dir = lsasaf::output_dir(&config.output_folder, &config.run_name);
            let written = lsasaf::fetch_msg_frp_pixels(
                &reqwest::Client::new(),
                &config.lsasaf(),
                &window,
                &config.bbox,
                &output_dir,
                workers,
            )
            .await?;
            info!(layers = written, dir = %output_dir.display(), "LSA SAF retrieval finished");
        }
        Command::Bucket => {
            let credentials = Credentials::read(&args.credentials)?;
            let bucket = open_bucket(&credentials).await?;
            let report = bucket::download_from_bucket(&bucket, config.bucket()?, workers).await?;
            log_report("bucket", &report);
        }
    }

    Ok(())
}

fn print_chunks(bbox: &BoundingBox) {
    let ids = chunks::chunks_for_bbox(bbox);
    if ids.is_empty() {
        warn!(%bbox, "Bounding box is not visible from the satellite");
    }
    let ids: Vec<String> = ids.iter().map(|id| format!("{id:02}")).collect();
    println!("{}", ids.join(" "));
}

/// Static keys win over a named profile.
async fn open_bucket(credentials: &Credentials) -> Result<Bucket> {
    let name = credentials.s3_bucket_name()?;
    let endpoint = credentials.s3_endpoint();
    let client = match (credentials.s3_keys(), credentials.s3_profile()) {
        (Ok((access, secret)), _) => s3::client_with_keys(endpoint, access, secret),
        (Err(_), Some(profile)) => s3::client_from_profile(profile, endpoint).await,
        (Err(e), None) => return Err(anyhow!(e)),
    };
    Ok(Bucket::new(client, name))
}

fn log_report(pipeline: &str, report: &DownloadReport) {
    if report.failed > 0 {
        warn!(pipeline, completed = report.completed, failed = report.failed, "Finished with failures");
    } else {
        info!(pipeline, completed = report.completed, "Finished");
    }
}
