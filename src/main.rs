use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ecg_vae::{
    encode_dataset, evaluate, random_search, reconstruction_mse, report, save_model, EcgDataset,
    ModelConfig, RunContext, SearchConfig, SearchSpace, TrainConfig, Trainer, SIGNAL_LEN,
};

/// Backend type for training.
type TrainBackend = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "ecg-vae")]
#[command(author, version)]
#[command(about = "Train a recurrent VAE on ECG5000 heartbeats and search its hyperparameters")]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Latent space dimensionality
    #[arg(long, default_value_t = 5)]
    latent_dim: usize,

    /// Hidden size of each recurrent direction
    #[arg(long, default_value_t = 140)]
    intermediate_dim: usize,

    /// Per-timestep width of the decoder expansion
    #[arg(long, default_value_t = 256)]
    expand_channels: usize,
}

impl ModelArgs {
    fn config(&self) -> ModelConfig {
        ModelConfig {
            latent_dim: self.latent_dim,
            intermediate_dim: self.intermediate_dim,
            expand_channels: self.expand_channels,
            ..ModelConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Train on a dataset file and export artifacts
    Train {
        /// Whitespace-delimited dataset file (label + 140 signal columns)
        data: PathBuf,

        /// Directory the artifacts land in
        #[arg(long, default_value = "artifacts")]
        output: PathBuf,

        #[arg(long, default_value_t = 100)]
        epochs: usize,

        #[arg(long, default_value_t = 16)]
        batch_size: usize,

        /// "adam" or "sgd"
        #[arg(long, default_value = "adam")]
        optimizer: String,

        #[arg(long, default_value_t = 0.001)]
        learn_rate: f64,

        #[arg(long, default_value_t = 0.2)]
        dropout_rate: f64,

        #[arg(long, default_value_t = 0.004)]
        regularizer_rate: f64,

        /// Fraction of rows held out for validation
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,

        #[arg(long, default_value_t = 1)]
        seed: u64,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Randomized hyperparameter search with cross-validation
    Search {
        data: PathBuf,

        #[arg(long, default_value = "artifacts")]
        output: PathBuf,

        /// Number of sampled configurations
        #[arg(long, default_value_t = 10)]
        n_iter: usize,

        /// Cross-validation folds per configuration
        #[arg(long, default_value_t = 5)]
        folds: usize,

        /// Epoch budget of each fold fit
        #[arg(long, default_value_t = 10)]
        epochs: usize,

        /// Fraction of rows kept out of the search entirely
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,

        #[arg(long, default_value_t = 1)]
        seed: u64,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Summarize a dataset file
    Info { data: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Commands::Train {
            data,
            output,
            epochs,
            batch_size,
            optimizer,
            learn_rate,
            dropout_rate,
            regularizer_rate,
            test_fraction,
            seed,
            model,
        } => {
            let model_config = ModelConfig {
                dropout_rate,
                regularizer_rate,
                ..model.config()
            };
            let train_config = TrainConfig {
                optimizer,
                learn_rate,
                batch_size,
                epochs,
            };
            handle_train(data, output, model_config, train_config, test_fraction, seed)
        }
        Commands::Search {
            data,
            output,
            n_iter,
            folds,
            epochs,
            test_fraction,
            seed,
            model,
        } => {
            let search_config = SearchConfig {
                n_iter,
                folds,
                epochs,
                seed,
            };
            handle_search(data, output, model.config(), search_config, test_fraction)
        }
        Commands::Info { data } => handle_info(data),
    }
}

fn handle_train(
    data: PathBuf,
    output: PathBuf,
    model_config: ModelConfig,
    train_config: TrainConfig,
    test_fraction: f64,
    seed: u64,
) -> Result<()> {
    let ctx = RunContext::new(seed, output);
    ctx.prepare()?;

    let dataset = EcgDataset::from_file(&data)
        .with_context(|| format!("failed to load dataset {}", data.display()))?;
    let (train, test) = dataset.split(test_fraction, ctx.seed)?;
    info!(
        "loaded {} rows: {} train, {} held out",
        dataset.len(),
        train.len(),
        test.len()
    );

    let device = NdArrayDevice::default();
    let batch_size = train_config.batch_size;
    let trainer =
        Trainer::<TrainBackend>::new(model_config, train_config, ctx.seed, device.clone());
    let outcome = trainer.fit(&train, Some(&test))?;

    save_model(&outcome.model, ctx.artifact("vae_model"))?;
    report::write_history(ctx.artifact("history.json"), &outcome.history)?;
    report::plot_losses(ctx.artifact("loss.png"), &outcome.history)?;
    report::plot_validation(ctx.artifact("val_loss.png"), &outcome.history)?;

    let inference = outcome.model.valid();
    let encoded = encode_dataset(&inference, &test, batch_size, &device)?;
    report::export_latents(ctx.artifact("latent_codes.csv"), &encoded.latents)?;
    report::export_reconstructions(
        ctx.artifact("reconstructions.csv"),
        &encoded.reconstructions,
    )?;

    let originals: Vec<Vec<f32>> = (0..test.len()).map(|i| test.signal(i).to_vec()).collect();
    report::plot_overlays(
        ctx.artifact("reconstruction_overlays.png"),
        &originals,
        &encoded.reconstructions,
    )?;
    report::plot_latent_pca(
        ctx.artifact("latent_pca.png"),
        &encoded.latents,
        test.labels(),
    )?;

    let summary = evaluate(&inference, &test, batch_size, &device)?;
    info!(
        "held-out set: loss={:.4} recon={:.4} kl={:.4}",
        summary.loss, summary.reconstruction_loss, summary.kl_loss
    );
    info!("artifacts written to {}", ctx.output_dir.display());
    Ok(())
}

fn handle_search(
    data: PathBuf,
    output: PathBuf,
    model_config: ModelConfig,
    search_config: SearchConfig,
    test_fraction: f64,
) -> Result<()> {
    let ctx = RunContext::new(search_config.seed, output);
    ctx.prepare()?;

    let dataset = EcgDataset::from_file(&data)
        .with_context(|| format!("failed to load dataset {}", data.display()))?;
    let (train, test) = dataset.split(test_fraction, ctx.seed)?;
    info!(
        "searching over {} rows, {} held out for the final score",
        train.len(),
        test.len()
    );

    let device = NdArrayDevice::default();
    let space = SearchSpace::default();
    let outcome =
        random_search::<TrainBackend>(&train, &model_config, &space, &search_config, &device)?;

    report::write_search_table(
        ctx.artifact("search_results.tex"),
        &outcome.trials,
        search_config.folds,
    )?;
    report::write_search_json(ctx.artifact("search_results.json"), &outcome.trials)?;
    report::plot_search_scores(ctx.artifact("search_scores.png"), &outcome.trials)?;

    for (rank, trial) in outcome.trials.iter().enumerate() {
        match trial.mean_score {
            Some(score) => info!(
                "#{}: mse={score:.6} optimizer={} batch_size={} dropout={:.3} regularizer={:.1e} lr={:.4}",
                rank + 1,
                trial.candidate.optimizer,
                trial.candidate.batch_size,
                trial.candidate.dropout_rate,
                trial.candidate.regularizer_rate,
                trial.candidate.learn_rate
            ),
            None => info!(
                "#{}: failed ({})",
                rank + 1,
                trial.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    match outcome.best {
        Some(best) => {
            let score = reconstruction_mse(
                &best.model.valid(),
                &test,
                best.candidate.batch_size,
                &device,
            )?;
            info!(
                "best configuration {:?} scored mse={score:.6} on the held-out set",
                best.candidate
            );
            save_model(&best.model, ctx.artifact("vae_model"))?;
        }
        None => info!("every trial failed; no model saved"),
    }
    info!("artifacts written to {}", ctx.output_dir.display());
    Ok(())
}

fn handle_info(data: PathBuf) -> Result<()> {
    let dataset = EcgDataset::from_file(&data)
        .with_context(|| format!("failed to load dataset {}", data.display()))?;
    println!("{}", data.display());
    println!("  rows: {}", dataset.len());
    println!("  signal length: {SIGNAL_LEN}");
    println!("  classes:");
    for (label, count) in dataset.class_counts() {
        println!("    {label}: {count}");
    }
    Ok(())
}
