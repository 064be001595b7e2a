mod dedup;
mod error;
mod parser;
mod pipeline;
mod record;
mod settings;
mod source;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use parser::{DebugSampler, ExtractionChain};
use record::Field;
use settings::{EngineConfig, StoreBackend};
use source::SourceDocument;

#[derive(Parser)]
#[command(name = "vehicle_listings", about = "Field extraction for saved vehicle listing pages")]
struct Cli {
    /// Config file (default: ./vehicle_listings.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Record store path (overrides config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Record store backend (overrides config)
    #[arg(long, global = true, value_enum)]
    backend: Option<StoreBackend>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every saved page in a directory and append new records
    Run {
        /// Directory of saved `*.html` pages
        #[arg(short, long)]
        input: PathBuf,
        /// Max documents to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract one page and print the outcome as JSON (nothing is stored)
    Extract {
        file: PathBuf,
        /// Resource URL (default: canonical link, og:url, or file stem)
        #[arg(long)]
        url: Option<String>,
    },
    /// Show store size and per-field fill counts
    Stats,
    /// Stored records overview table
    Overview {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => EngineConfig::load_file(path)?,
        None => EngineConfig::load()?,
    };
    if let Some(path) = cli.store {
        cfg.store_path = path;
    }
    if let Some(backend) = cli.backend {
        cfg.store_backend = backend;
    }

    let result = match cli.command {
        Commands::Run { input, limit } => {
            let mut docs = source::list_documents(&input)?;
            if let Some(n) = limit {
                docs.truncate(n);
            }
            if docs.is_empty() {
                println!("No documents in {}.", input.display());
                return Ok(());
            }
            let mut store = store::open(cfg.store_backend, &cfg.store_path)
                .with_context(|| format!("opening store {}", cfg.store_path.display()))?;
            println!("Extracting {} documents into {}...", docs.len(), store.location());
            let stats = pipeline::run_documents(&cfg, &mut *store, &docs)?;
            stats.print();
            Ok(())
        }
        Commands::Extract { file, url } => {
            let mut doc = SourceDocument::at(file).load()?;
            if let Some(url) = url {
                doc.resource_url = url;
            }
            let chain = ExtractionChain::new(&cfg);
            let mut sampler = DebugSampler::new(&cfg.debug_dir, cfg.max_debug_samples);
            let outcome = pipeline::extract_document(&chain, &doc, &mut sampler);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::Stats => {
            let mut store = store::open(cfg.store_backend, &cfg.store_path)?;
            let records = store.load_all()?;
            println!("Store:   {}", store.location());
            println!("Records: {}", records.len());
            for (field, filled) in store::field_fill(&records) {
                println!("  {:<18} {:>6}", field.to_string(), filled);
            }
            Ok(())
        }
        Commands::Overview { limit } => {
            let mut store = store::open(cfg.store_backend, &cfg.store_path)?;
            let records = store.load_all()?;
            if records.is_empty() {
                println!("No records in {}.", store.location());
                return Ok(());
            }

            println!(
                "{:>3} | {:<32} | {:>8} | {:>8} | {:<12} | {:<24}",
                "#", "Title", "Price", "Km", "Phone", "Agency"
            );
            println!("{}", "-".repeat(102));

            let shown = &records[..records.len().min(limit)];
            for (i, r) in shown.iter().enumerate() {
                println!(
                    "{:>3} | {:<32} | {:>8} | {:>8} | {:<12} | {:<24}",
                    i + 1,
                    truncate(&cell(r, Field::Title), 32),
                    cell(r, Field::PriceEur),
                    cell(r, Field::MileageKm),
                    cell(r, Field::Phone),
                    truncate(&cell(r, Field::AgencyName), 24),
                );
            }

            println!("\n--- URLs ---");
            for (i, r) in shown.iter().enumerate() {
                println!("{:>3}  {}", i + 1, r.resource_url);
            }

            println!("\n{} of {} records", shown.len(), records.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn cell(r: &record::ExtractedRecord, field: Field) -> String {
    r.display(field).unwrap_or_else(|| "-".into())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
