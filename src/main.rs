//! Command-line interface for the XTTS fine-tuning pipeline.
//!
//! The CLI wraps the pipeline runner: `run` executes every phase in order,
//! and each phase is also exposed as its own subcommand for reruns and
//! debugging. Training tunables can be overridden with flags.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use xtts_finetune::config::{load_config, Config, Overrides};
use xtts_finetune::perf::{self, Metric};
use xtts_finetune::pipeline::{Phase, Pipeline};
use xtts_finetune::prereq;

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "xtts-finetune")]
#[command(about = "Fine-tune XTTS for a new language", long_about = None)]
struct Cli {
    /// Print a per-phase timing summary at the end of the run.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Pipeline configuration YAML; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Flag overrides for the values the pipeline exposes on the command line.
#[derive(Args, Debug, Clone, Default)]
struct OverrideArgs {
    /// Number of fine-tuning epochs.
    #[arg(long)]
    epochs: Option<u32>,
    /// Per-device batch size.
    #[arg(long)]
    batch_size: Option<u32>,
    /// Gradient accumulation steps.
    #[arg(long)]
    grad_accum: Option<u32>,
    /// Learning rate.
    #[arg(long)]
    lr: Option<f64>,
    /// Weight decay.
    #[arg(long)]
    weight_decay: Option<f64>,
    /// Checkpoint save interval in optimizer steps.
    #[arg(long)]
    save_step: Option<u32>,
    /// ISO code of the language being added.
    #[arg(long)]
    language: Option<String>,
    /// Number of new vocabulary entries for the target language.
    #[arg(long)]
    vocab_size: Option<u32>,
    /// CUDA device index to train on.
    #[arg(long)]
    cuda_device: Option<u32>,
}

impl From<&OverrideArgs> for Overrides {
    fn from(args: &OverrideArgs) -> Self {
        Overrides {
            epochs: args.epochs,
            batch_size: args.batch_size,
            grad_accum: args.grad_accum,
            learning_rate: args.lr,
            weight_decay: args.weight_decay,
            save_step: args.save_step,
            language: args.language.clone(),
            vocab_size: args.vocab_size,
            cuda_device: args.cuda_device,
        }
    }
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: setup, data, checkpoint, vocabulary, training.
    Run {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Check for git, python, pip and an optional GPU, then exit.
    Check,
    /// Clone the toolkit and install its Python requirements.
    Setup,
    /// Run the dataset generation script and validate its output.
    GenerateData {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Download the base model files.
    Download {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Extend the tokenizer vocabulary for the target language.
    ExtendVocab {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Run the training script with the configured hyperparameters.
    Train {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// List pipeline phases in execution order.
    Phases,
}

/// Entry point for the CLI.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    match cli.command {
        Commands::Run { overrides } => {
            let pipeline = build_pipeline(&cli.config, &overrides)?;
            pipeline.run_all()?;
            println!("Fine-tuning pipeline complete.");
        }
        Commands::Check => {
            let prereqs = {
                let _span = perf::span(Metric::PrereqCheck);
                prereq::check()?
            };
            println!("{}", prereqs.summary());
        }
        Commands::Setup => {
            run_single(&cli.config, &OverrideArgs::default(), Phase::Setup)?;
        }
        Commands::GenerateData { overrides } => {
            run_single(&cli.config, &overrides, Phase::GenerateData)?;
        }
        Commands::Download { overrides } => {
            run_single(&cli.config, &overrides, Phase::DownloadCheckpoint)?;
        }
        Commands::ExtendVocab { overrides } => {
            run_single(&cli.config, &overrides, Phase::ExtendVocab)?;
        }
        Commands::Train { overrides } => {
            run_single(&cli.config, &overrides, Phase::Train)?;
        }
        Commands::Phases => {
            for phase in Phase::ALL {
                println!("{}", phase.name());
            }
        }
    }

    if verbose {
        eprintln!("{}", perf::report());
    }

    Ok(())
}

/// Load the effective config (file or defaults, then flag overrides).
fn effective_config(path: &Option<PathBuf>, overrides: &OverrideArgs) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    Overrides::from(overrides).apply(&mut config);
    Ok(config)
}

/// Build a pipeline with prerequisites checked and Ctrl-C wired up.
fn build_pipeline(path: &Option<PathBuf>, overrides: &OverrideArgs) -> Result<Pipeline> {
    let config = effective_config(path, overrides)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupt_flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        interrupt_flag.store(true, Ordering::SeqCst);
    })?;

    let prereqs = {
        let _span = perf::span(Metric::PrereqCheck);
        prereq::check()?
    };
    eprintln!("{}", prereqs.summary());

    Pipeline::new(config, prereqs, interrupted)
}

fn run_single(path: &Option<PathBuf>, overrides: &OverrideArgs, phase: Phase) -> Result<()> {
    let pipeline = build_pipeline(path, overrides)?;
    pipeline.run_phase(phase)
}
