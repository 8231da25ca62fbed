use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use review_etl::app::ObjectStorePort;
use review_etl::config::{Config, Credentials, StoreBackend};
use review_etl::constants;
use review_etl::infra::{FsObjectStore, HttpObjectStore, InMemoryObjectStore};
use review_etl::logging;
use review_etl::observability::metrics;
use review_etl::pipeline::Pipeline;
use review_etl::sources::{self, SourceManifest};

#[derive(Parser)]
#[command(name = "review_etl")]
#[command(about = "Join business, review and user datasets and publish summary views")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline once over the input directory
    Run {
        /// Path to the TOML config file
        #[arg(long, default_value = constants::DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Overrides `input.dir`
        #[arg(long)]
        input_dir: Option<PathBuf>,
        /// Zip archive path or URL to read instead of the input directory
        #[arg(long)]
        archive: Option<String>,
        /// Overrides `publish.root` and forces the filesystem store
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Publish into memory only and print the receipts
        #[arg(long)]
        dry_run: bool,
    },
    /// List the sources a run would consume
    Discover {
        #[arg(long, default_value = "data")]
        input_dir: PathBuf,
        /// Zip archive path or URL to list instead of the input directory
        #[arg(long)]
        archive: Option<String>,
    },
}

fn build_store(config: &Config, dry_run: bool) -> anyhow::Result<Arc<dyn ObjectStorePort>> {
    if dry_run {
        return Ok(Arc::new(InMemoryObjectStore::new()));
    }
    let publish = &config.publish;
    match publish.backend {
        StoreBackend::Fs => Ok(Arc::new(FsObjectStore::new(&publish.root))),
        StoreBackend::Http => {
            let (Some(endpoint), Some(bucket)) = (&publish.endpoint, &publish.bucket) else {
                bail!("http backend needs publish.endpoint and publish.bucket");
            };
            let credentials = Credentials::from_env()?;
            Ok(Arc::new(HttpObjectStore::new(endpoint, bucket, &publish.prefix, credentials)))
        }
    }
}

async fn load_manifest(input_dir: &Path, archive: Option<&str>) -> anyhow::Result<SourceManifest> {
    match archive {
        Some(location) => sources::load_archive(location)
            .await
            .with_context(|| format!("failed to read archive {}", location)),
        None => sources::discover(input_dir)
            .with_context(|| format!("failed to scan input directory {}", input_dir.display())),
    }
}

async fn run(config: Config, dry_run: bool) -> anyhow::Result<()> {
    let manifest = load_manifest(&config.input.dir, config.input.archive.as_deref()).await?;

    let store = build_store(&config, dry_run)?;
    let metrics_file = config.observability.metrics_file.clone();
    let pipeline = Pipeline::new(config, store);
    let result = pipeline.run(&manifest).await;

    if let (Some(path), Some(rendered)) = (metrics_file, metrics::render()) {
        if let Err(e) = std::fs::write(&path, rendered) {
            warn!("failed to write metrics snapshot to {}: {}", path.display(), e);
        }
    }

    let report = result?;
    println!("📊 Run {}", report.run_id);
    println!("   Reviews: {}", report.review_rows);
    println!("   Businesses: {}", report.business_rows);
    println!("   Snapshot rows: {}", report.snapshot_rows);
    if report.snapshot_suppressed {
        println!("   ⚠️  Relational snapshot unavailable, user and attribute columns left out");
    }
    println!("   Merged rows: {}", report.merged_rows);
    for receipt in &report.receipts {
        println!("   {} ({} bytes, sha256 {})", receipt.name, receipt.bytes, receipt.sha256);
    }
    if dry_run {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            input_dir,
            archive,
            output_dir,
            dry_run,
        } => {
            let mut config = Config::load_or_default(&config)?;
            if let Some(dir) = input_dir {
                config.input.dir = dir;
            }
            if archive.is_some() {
                config.input.archive = archive;
            }
            if let Some(dir) = output_dir {
                config.publish.backend = StoreBackend::Fs;
                config.publish.root = dir;
            }
            config.validate()?;

            let _guard = logging::init_logging(&config.observability.logs_dir);
            if let Err(e) = metrics::init() {
                warn!("metrics disabled: {}", e);
            }
            info!(input_dir = %config.input.dir.display(), archive = ?config.input.archive, dry_run, "review_etl starting");

            if let Err(e) = run(config, dry_run).await {
                error!("run failed: {:#}", e);
                return Err(e);
            }
        }
        Commands::Discover { input_dir, archive } => {
            let manifest = load_manifest(&input_dir, archive.as_deref()).await?;
            println!("Business documents:");
            for source in &manifest.businesses {
                println!("   {} ({} bytes)", source.name, source.bytes.len());
            }
            println!("Review batches:");
            for source in &manifest.reviews {
                println!("   {} ({} bytes)", source.name, source.bytes.len());
            }
            match &manifest.snapshot {
                Some(snapshot) => println!("Relational snapshot: {}", snapshot.name()),
                None => println!("Relational snapshot: none"),
            }
        }
    }
    Ok(())
}
