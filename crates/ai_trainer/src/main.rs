//! MakanMate recommendation trainer CLI

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use makanmate_ai_trainer::{verify_bundle, Pipeline, PipelineConfig, SourceKind};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "makanmate-train")]
#[command(author = "MakanMate Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Two-tower food recommendation trainer and exporter", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model and publish the inference bundle
    Train(TrainArgs),
    /// Re-check a published bundle
    Verify {
        /// Bundle directory
        dir: PathBuf,
    },
    /// Write the effective configuration (defaults plus MAKANMATE_* overrides) as TOML
    InitConfig {
        /// Destination file
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record source: json_export or synthetic
    #[arg(long)]
    source: Option<String>,

    /// Directory holding the JSON export
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory for the bundle
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Seed for splitting, initialization, calibration and synthetic data
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Train(args) => {
            let config = build_config(&args)?;
            init_logging(cli.verbose, &config.logging.level)?;
            train(config)
        }
        Command::Verify { dir } => {
            init_logging(cli.verbose, "info")?;
            verify(dir)
        }
        Command::InitConfig { path, force } => {
            init_logging(cli.verbose, "info")?;
            init_config(path, force)
        }
    }
}

fn build_config(args: &TrainArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("Invalid MAKANMATE_* environment override")?;

    if let Some(kind) = &args.source {
        config.source.kind = kind.parse::<SourceKind>().context("Invalid --source")?;
    }
    if let Some(input) = &args.input {
        config.source.path = Some(input.clone());
    }
    if let Some(output) = &args.output {
        config.export.output_dir = output.clone();
    }
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(seed) = args.seed {
        config.set_seed(seed);
    }
    Ok(config)
}

fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let log_level = if verbose {
        Level::DEBUG
    } else {
        level.parse::<Level>().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

fn train(config: PipelineConfig) -> Result<()> {
    info!("MakanMate Recommendation Trainer v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════");
    info!("Training configuration:");
    info!("  Source: {:?} ({:?})", config.source.kind, config.source.path);
    info!("  Embedding tables: {} users, {} items", config.model.num_users, config.model.num_items);
    info!("  Embedding dim: {}", config.model.embedding_dim);
    info!("  Epochs: {}", config.training.epochs);
    info!("  Batch size: {}", config.training.batch_size);
    info!("  Validation fraction: {}", config.training.validation_fraction);
    info!("  Seed: {}", config.training.seed);

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;

    info!("═══════════════════════════════════════════");
    let outcome = pipeline.run().context("Training pipeline failed")?;

    let history = &outcome.report.history;
    info!("═══════════════════════════════════════════");
    info!("✓ Training completed successfully");
    info!("  Source: {}", outcome.report.source);
    info!(
        "  Samples: {} ({} dropped)",
        outcome.report.samples.samples,
        outcome.report.samples.dropped()
    );
    info!(
        "  Epochs run: {} (best {}, early stop: {})",
        history.epochs.len(),
        history.best_epoch,
        history.stopped_early
    );
    info!(
        "  Metrics: rmse={:.4} mae={:.4}",
        outcome.report.metrics.rmse, outcome.report.metrics.mae
    );
    info!("  Bundle: {}", outcome.export.output_dir.display());
    info!("  Hash: {}", outcome.export.artifact_hash);
    Ok(())
}

fn verify(dir: PathBuf) -> Result<()> {
    info!("Verifying bundle: {}", dir.display());
    let check = verify_bundle(&dir).with_context(|| format!("Bundle {} failed verification", dir.display()))?;

    info!("═══════════════════════════════════════════");
    info!("✓ Bundle verified");
    info!("  Files checked: {}", check.files_checked);
    info!("  Artifact hash: {}", check.artifact_hash);
    info!(
        "  Probe rating ({} / {}): {:.3}{}",
        check.probe_user,
        check.probe_item,
        check.probe.rating,
        if check.probe.in_range { "" } else { " (outside [1, 5])" }
    );
    Ok(())
}

fn init_config(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let mut config = PipelineConfig::default();
    config
        .apply_env_overrides()
        .context("Invalid MAKANMATE_* environment override")?;
    config.validate().context("Invalid configuration")?;
    config
        .save_to_file(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("✓ Wrote configuration to {}", path.display());
    Ok(())
}
