//! Inspection tool for dataset bundles.
//!
//! - `summary`: build a bundle and print its metadata and loader settings
//! - `batch`: pull a few train batches and print their tensor shapes
//! - `check`: decode every sample of a split and report the failures

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use burn::backend::NdArray;
use burn::data::dataset::Dataset;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lab_core::{
    load_toml_config, setup_cli_logging, BundleOptions, DataSplit, DatasetKind, LabConfig,
    LoaderConfig,
};
use lab_datasets::factories::{dataset_root, pipelines_for, split_dir};
use lab_datasets::{build_bundle, DataBundle, DataSource, ImageFolder, ImageItem, Mnist};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

type InspectBackend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "inspect")]
#[command(about = "Inspect dataset bundles", long_about = None)]
struct Cli {
    /// Optional TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a bundle and print its metadata
    Summary {
        /// Dataset name (food101, tiny-imagenet, mnist, imagenet, tiny-resized-food101)
        #[arg(short, long)]
        dataset: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Iterate train batches and print tensor shapes
    Batch {
        /// Dataset name
        #[arg(short, long)]
        dataset: String,

        /// Number of batches to pull
        #[arg(short, long, default_value = "2")]
        batches: usize,
    },

    /// Decode every sample of a split in parallel
    Check {
        /// Dataset name
        #[arg(short, long)]
        dataset: String,

        /// Split to check: train or test
        #[arg(short, long, default_value = "train")]
        split: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_cli_logging(cli.verbose)?;

    let config = match &cli.config {
        Some(path) => {
            let config: LabConfig = load_toml_config(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.validate()?;
            config
        }
        None => LabConfig::default(),
    };

    match cli.command {
        Commands::Summary { dataset, json } => summary(&config, &dataset, json)?,
        Commands::Batch { dataset, batches } => batch(&config, &dataset, batches)?,
        Commands::Check { dataset, split } => check(&config, &dataset, &split)?,
    }

    Ok(())
}

fn parse_kind(name: &str) -> Result<DatasetKind> {
    name.parse::<DatasetKind>()
        .with_context(|| format!("Unknown dataset '{name}'"))
}

fn load_bundle(config: &LabConfig, kind: DatasetKind) -> Result<DataBundle<InspectBackend>> {
    let options = config.options_for(kind);
    let device = Default::default();
    build_bundle::<InspectBackend>(kind, &options, &device)
        .with_context(|| format!("Failed to build the {kind} bundle"))
}

#[derive(Serialize)]
struct SourceSummary {
    items: usize,
    batches: usize,
    loader: LoaderConfig,
}

impl SourceSummary {
    fn from_source(source: &DataSource<InspectBackend>) -> Self {
        Self {
            items: source.num_items(),
            batches: source.num_batches(),
            loader: *source.config(),
        }
    }
}

#[derive(Serialize)]
struct BundleSummary {
    dataset_name: String,
    cardinality: usize,
    output_resolution: u32,
    is_classifier: bool,
    train: SourceSummary,
    test: SourceSummary,
}

fn summary(config: &LabConfig, dataset: &str, json: bool) -> Result<()> {
    let kind = parse_kind(dataset)?;
    let bundle = load_bundle(config, kind)?;

    let summary = BundleSummary {
        dataset_name: bundle.dataset_name().to_string(),
        cardinality: bundle.cardinality(),
        output_resolution: bundle.output_resolution(),
        is_classifier: bundle.is_classifier(),
        train: SourceSummary::from_source(bundle.train_dataset()),
        test: SourceSummary::from_source(bundle.test_dataset()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("\n=== {} ===", summary.dataset_name);
    println!("Classes:     {}", summary.cardinality);
    println!("Resolution:  {}x{}", summary.output_resolution, summary.output_resolution);
    println!("Classifier:  {}", summary.is_classifier);
    for (split, source) in [("train", &summary.train), ("test", &summary.test)] {
        println!(
            "{:<6} {:>8} items {:>6} batches | batch_size={} workers={} shuffle={} pin_memory={}",
            split,
            source.items,
            source.batches,
            source.loader.batch_size,
            source.loader.num_workers,
            source.loader.shuffle,
            source.loader.pin_memory
        );
    }

    Ok(())
}

fn batch(config: &LabConfig, dataset: &str, batches: usize) -> Result<()> {
    let kind = parse_kind(dataset)?;
    let bundle = load_bundle(config, kind)?;

    let start = Instant::now();
    let mut seen = 0;
    for (i, batch) in bundle.train_dataset().iter().take(batches).enumerate() {
        println!(
            "batch {:>3}: images {:?} targets {:?}",
            i,
            batch.images.dims(),
            batch.targets.dims()
        );
        seen += 1;
    }

    if seen == 0 {
        warn!("{} train loader produced no batches", kind);
    }
    info!("Loaded {} batches in {:.2?}", seen, start.elapsed());

    Ok(())
}

/// A single split opened outside a loader
enum SplitDataset {
    Folder(ImageFolder),
    Mnist(Mnist),
}

impl SplitDataset {
    fn open(kind: DatasetKind, options: &BundleOptions, split: DataSplit) -> Result<Self> {
        let size = options.output_size_or(kind.default_output_size());
        let (train, test) = pipelines_for(kind, size)?;
        let transform = if split.is_train() { train } else { test };

        let dataset = match kind {
            DatasetKind::Mnist => Self::Mnist(Mnist::new(
                dataset_root(kind, options),
                split,
                options.download,
                transform,
            )?),
            _ => {
                let dir = split_dir(kind, options, split);
                Self::Folder(
                    ImageFolder::new(&dir, transform)
                        .with_context(|| format!("Failed to open {}", dir.display()))?,
                )
            }
        };
        Ok(dataset)
    }

    fn len(&self) -> usize {
        match self {
            Self::Folder(folder) => folder.len(),
            Self::Mnist(mnist) => mnist.len(),
        }
    }

    fn try_get(&self, index: usize) -> lab_core::Result<ImageItem> {
        match self {
            Self::Folder(folder) => folder.try_get(index),
            Self::Mnist(mnist) => mnist.try_get(index),
        }
    }

    fn describe(&self, index: usize) -> String {
        match self {
            Self::Folder(folder) => folder
                .samples()
                .get(index)
                .map(|s| s.path.display().to_string())
                .unwrap_or_else(|| index.to_string()),
            Self::Mnist(mnist) => format!("mnist/{}/{}", mnist.split(), index),
        }
    }
}

fn check(config: &LabConfig, dataset: &str, split: &str) -> Result<()> {
    let kind = parse_kind(dataset)?;
    let split: DataSplit = split.parse()?;
    if split == DataSplit::Validation {
        bail!("Only the train and test splits can be checked");
    }

    let options = config.options_for(kind);
    let data = SplitDataset::open(kind, &options, split)?;
    let total = data.len();
    info!("Checking {} {} samples of {}", total, split, kind);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut failures: Vec<(usize, String)> = (0..total)
        .into_par_iter()
        .filter_map(|index| {
            let result = data.try_get(index);
            pb.inc(1);
            result.err().map(|e| (index, e.to_string()))
        })
        .collect();
    failures.sort_by_key(|(index, _)| *index);

    pb.finish_with_message("Done");

    if failures.is_empty() {
        println!("All {} {} samples decoded", total, split);
        return Ok(());
    }

    println!("{} of {} samples failed:", failures.len(), total);
    for (index, error) in &failures {
        println!("  {}: {}", data.describe(*index), error);
    }
    bail!(
        "{} samples under {} failed to decode",
        failures.len(),
        dataset_root(kind, &options).display()
    );
}
