//! cardscan - Trading card photo recognition CLI
//!
//! Scans card photos in bulk, matches them against a card database and an
//! optional inventory CSV, and writes the matched rows back out as CSV.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cardscan::catalog::{CardCatalog, YgoPriceClient};
use cardscan::config::{load_config, AppConfig, ErrorHandling};
use cardscan::hosting::FreeImageHost;
use cardscan::inventory::{parse_inventory_csv, write_inventory_csv, InventoryRow};
use cardscan::pipeline::{PipelineOptions, ResultRecord, ScanPipeline};
use cardscan::vision::{OcrAdapter, TesseractCli};
use cardscan::{BulkOrchestrator, ScanEvent};

/// cardscan - Bulk trading card photo recognition
#[derive(Parser, Debug)]
#[command(name = "cardscan")]
#[command(about = "Recognizes trading cards from photos and exports inventory rows")]
struct Args {
    /// Image files or directories to scan
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Card database snapshot (JSON file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Inventory CSV to match rows against
    #[arg(short, long)]
    inventory: Option<PathBuf>,

    /// Output CSV path
    #[arg(short, long, default_value = "results.csv")]
    output: PathBuf,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Concurrent workers (1-5)
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Maximum files per run, 0 for unbounded
    #[arg(long)]
    batch_size: Option<usize>,

    /// Process files even when a basename repeats
    #[arg(long)]
    no_skip_duplicates: bool,

    /// Fail files on the first error instead of retrying
    #[arg(long)]
    no_retry: bool,

    /// Reaction to a failed file: continue, pause or stop
    #[arg(long)]
    error_handling: Option<String>,

    /// Upscale OCR regions 2x before preprocessing
    #[arg(long)]
    upscale: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    let files = collect_images(&args.inputs)?;
    if files.is_empty() {
        bail!("no image files found under the given inputs");
    }
    info!("found {} image files", files.len());

    let catalog = match &args.database {
        Some(path) => CardCatalog::load_file(path)?,
        None if !config.remote.database_url.is_empty() => {
            let client = reqwest::Client::new();
            CardCatalog::fetch(&client, &config.remote.database_url).await?
        }
        None => bail!("no card database: pass --database or set remote.database_url"),
    };

    let inventory = match &args.inventory {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading inventory {}", path.display()))?;
            let rows = parse_inventory_csv(&content)?;
            info!("loaded {} inventory rows", rows.len());
            rows
        }
        None => Vec::new(),
    };

    let engine = TesseractCli::new(&config.ocr.tesseract_path, &config.ocr.language);
    let adapter = OcrAdapter::new(Arc::new(engine));
    let options = PipelineOptions {
        upscale_2x: config.ocr.upscale_2x || args.upscale,
        fetch_prices: config.remote.fetch_prices,
        upload_images: config.remote.upload_images && !config.remote.freeimage_api_key.is_empty(),
    };

    let mut pipeline = ScanPipeline::new(adapter, Arc::new(catalog))
        .with_regions(config.regions)
        .with_inventory(inventory)
        .with_options(options);
    if options.fetch_prices {
        pipeline = pipeline.with_price_lookup(Arc::new(YgoPriceClient::new(reqwest::Client::new())));
    }
    if options.upload_images {
        pipeline = pipeline.with_image_host(Arc::new(FreeImageHost::new(
            reqwest::Client::new(),
            config.remote.freeimage_api_key.clone(),
        )));
    }

    let orchestrator = BulkOrchestrator::new(Arc::new(pipeline), config.bulk.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let consumer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match &event {
                ScanEvent::Stage { .. } => debug!("{}", event.message()),
                ScanEvent::Retrying { .. } | ScanEvent::Failed { .. } => {
                    warn!("{}", event.message())
                }
                _ => info!("{}", event.message()),
            }
        }
    });

    let records = orchestrator.run(files, tx).await;
    let _ = consumer.await;

    let rows = export_rows(&records);
    std::fs::write(&args.output, write_inventory_csv(&rows))
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        "wrote {} rows to {} ({} scanned, {} matched)",
        rows.len(),
        args.output.display(),
        records.len(),
        records.iter().filter(|r| r.matched).count()
    );
    Ok(())
}

fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => match cardscan::config::default_config_path() {
            Some(path) if path.exists() => load_config(&path)?,
            _ => AppConfig::default(),
        },
    };
    if let Some(n) = args.max_concurrent {
        config.bulk.max_concurrent = n;
    }
    if let Some(n) = args.batch_size {
        config.bulk.batch_size = n;
    }
    if args.no_skip_duplicates {
        config.bulk.skip_duplicates = false;
    }
    if args.no_retry {
        config.bulk.auto_retry = false;
    }
    if let Some(ref mode) = args.error_handling {
        config.bulk.error_handling = match mode.as_str() {
            "continue" => ErrorHandling::Continue,
            "pause" => ErrorHandling::Pause,
            "stop" => ErrorHandling::Stop,
            other => bail!("unknown error handling mode: {other}"),
        };
    }
    Ok(config)
}

/// Gather image files from the inputs, descending one level into directories.
fn collect_images(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("reading directory {}", input.display()))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else if is_image(input) {
            files.push(input.clone());
        } else {
            warn!("skipping non-image input {}", input.display());
        }
    }
    Ok(files)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            e == "jpg" || e == "jpeg" || e == "png"
        })
        .unwrap_or(false)
}

/// One exported row per matched scan: its inventory rows when present,
/// otherwise a row synthesized from the scan itself.
fn export_rows(records: &[ResultRecord]) -> Vec<InventoryRow> {
    let mut rows = Vec::new();
    for record in records.iter().filter(|r| r.matched) {
        if record.matched_rows.is_empty() {
            let mut row = InventoryRow::named(
                record
                    .matched_name
                    .clone()
                    .unwrap_or_else(|| record.card_name.clone()),
            );
            row.description = record.effect_text.clone();
            if let Some(ref url) = record.image_url {
                row.image_url = url.clone();
            }
            if let Some(ref prices) = record.prices {
                row.prices = prices.clone();
            }
            rows.push(row);
        } else {
            for mut row in record.matched_rows.iter().cloned() {
                if row.image_url.is_empty() {
                    if let Some(ref url) = record.image_url {
                        row.image_url = url.clone();
                    }
                }
                if let Some(ref prices) = record.prices {
                    row.prices = prices.clone();
                }
                rows.push(row);
            }
        }
    }
    rows
}
