//! The linear phase runner.
//!
//! Five phases run in a fixed order; the first failure aborts the run. Phases
//! are idempotent where the underlying work allows it (an existing checkout,
//! an already-downloaded checkpoint), so re-running after a failure resumes
//! without redoing finished work.

use crate::config::{absolutize, Config};
use crate::dataset;
use crate::download;
use crate::exec;
use crate::perf::{self, Metric};
use crate::prereq::Prereqs;
use crate::toolkit;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// The phases of a fine-tuning run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Clone the toolkit and install its requirements.
    Setup,
    /// Run the data generation script and validate its output.
    GenerateData,
    /// Fetch the base model files.
    DownloadCheckpoint,
    /// Extend the tokenizer vocabulary for the target language.
    ExtendVocab,
    /// Run the training script.
    Train,
}

impl Phase {
    /// Every phase, in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Setup,
        Phase::GenerateData,
        Phase::DownloadCheckpoint,
        Phase::ExtendVocab,
        Phase::Train,
    ];

    /// Stable kebab-case name used in logs and the run manifest.
    pub fn name(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::GenerateData => "generate-data",
            Phase::DownloadCheckpoint => "download-checkpoint",
            Phase::ExtendVocab => "extend-vocab",
            Phase::Train => "train",
        }
    }
}

/// Wall time of one completed phase, recorded in the run manifest.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseRecord {
    pub phase: &'static str,
    pub seconds: f64,
}

#[derive(Serialize)]
struct RunManifest<'a> {
    config: &'a Config,
    phases: &'a [PhaseRecord],
}

/// Drives the phases against one resolved configuration.
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    prereqs: Prereqs,
    interrupted: Arc<AtomicBool>,
}

impl Pipeline {
    /// Validate the configuration and build a runner.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is unusable.
    pub fn new(config: Config, prereqs: Prereqs, interrupted: Arc<AtomicBool>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            prereqs,
            interrupted,
        })
    }

    /// Run every phase in order, then write the run manifest.
    ///
    /// # Errors
    ///
    /// Returns the first phase error, or an interruption error.
    pub fn run_all(&self) -> Result<Vec<PhaseRecord>> {
        let mut records = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            let start = Instant::now();
            self.run_phase(phase)?;
            records.push(PhaseRecord {
                phase: phase.name(),
                seconds: start.elapsed().as_secs_f64(),
            });
        }
        self.write_manifest(&records)?;
        Ok(records)
    }

    /// Run a single phase, checking for interruption before and after.
    ///
    /// # Errors
    ///
    /// Returns the phase's error, or an interruption error.
    pub fn run_phase(&self, phase: Phase) -> Result<()> {
        self.check_interrupted()?;
        info!(phase = phase.name(), "starting");
        match phase {
            Phase::Setup => self.setup()?,
            Phase::GenerateData => self.generate_data()?,
            Phase::DownloadCheckpoint => self.download_checkpoint()?,
            Phase::ExtendVocab => self.extend_vocab()?,
            Phase::Train => self.train()?,
        }
        self.check_interrupted()?;
        info!(phase = phase.name(), "finished");
        Ok(())
    }

    fn check_interrupted(&self) -> Result<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            anyhow::bail!("Interrupted");
        }
        Ok(())
    }

    fn setup(&self) -> Result<()> {
        {
            let _span = perf::span(Metric::ToolkitClone);
            toolkit::ensure_toolkit(&self.config, &self.prereqs)?;
        }
        let _span = perf::span(Metric::PipInstall);
        toolkit::install_requirements(&self.config, &self.prereqs)?;
        toolkit::prepare_output_dirs(&self.config)
    }

    fn generate_data(&self) -> Result<()> {
        let _span = perf::span(Metric::GenerateData);
        let script = toolkit::generate_script(&self.config)?;
        let mut cmd = self.prereqs.python_command();
        cmd.arg(&script);
        exec::run("generating dataset", &mut cmd)?;

        let summary = dataset::validate(&self.config.paths.dataset_dir)?;
        perf::add_count(Metric::DatasetRows, (summary.train_rows + summary.eval_rows) as u64);
        perf::add_count(Metric::DatasetSpeakers, summary.speakers as u64);
        info!(
            train_rows = summary.train_rows,
            eval_rows = summary.eval_rows,
            speakers = summary.speakers,
            "dataset validated"
        );
        Ok(())
    }

    fn download_checkpoint(&self) -> Result<()> {
        let _span = perf::span(Metric::CheckpointDownload);
        let fetched =
            download::fetch_base_model(&self.config.base_model_dir(), &self.config.checkpoint.files)?;
        info!(fetched, dir = %self.config.base_model_dir().display(), "base model ready");
        Ok(())
    }

    fn extend_vocab(&self) -> Result<()> {
        let _span = perf::span(Metric::ExtendVocab);
        let script = toolkit::script_path(&self.config, &self.config.toolkit.extend_script)?;
        let checkpoints = absolutize(&self.config.checkpoint.dir)?;
        let metadata = absolutize(&self.config.paths.dataset_dir.join("metadata_train.csv"))?;
        if !metadata.exists() {
            anyhow::bail!(
                "{} not found; run the generate-data phase first",
                metadata.display()
            );
        }

        let mut cmd = self.prereqs.python_command();
        cmd.arg(script.file_name().unwrap_or(script.as_os_str()))
            .arg("--output_path")
            .arg(&checkpoints)
            .arg("--metadata_path")
            .arg(&metadata)
            .arg("--language")
            .arg(&self.config.language.language)
            .arg("--extended_vocab_size")
            .arg(self.config.language.vocab_size.to_string())
            .current_dir(&self.config.paths.toolkit_dir);
        exec::run("extending vocabulary", &mut cmd)
    }

    fn train(&self) -> Result<()> {
        let _span = perf::span(Metric::Train);
        let script = toolkit::script_path(&self.config, &self.config.toolkit.train_script)?;
        let checkpoints = absolutize(&self.config.checkpoint.dir)?;
        let dataset_dir = absolutize(&self.config.paths.dataset_dir)?;
        let train_csv = dataset_dir.join("metadata_train.csv");
        let eval_csv = dataset_dir.join("metadata_eval.csv");
        for csv in [&train_csv, &eval_csv] {
            if !csv.exists() {
                anyhow::bail!(
                    "{} not found; run the generate-data phase first",
                    csv.display()
                );
            }
        }

        let training = &self.config.training;
        let metadatas = format!(
            "{},{},{}",
            train_csv.display(),
            eval_csv.display(),
            self.config.language.language
        );
        let mut cmd = self.prereqs.python_command();
        cmd.arg(script.file_name().unwrap_or(script.as_os_str()))
            .arg("--output_path")
            .arg(&checkpoints)
            .arg("--metadatas")
            .arg(&metadatas)
            .args(["--num_epochs", &training.epochs.to_string()])
            .args(["--batch_size", &training.batch_size.to_string()])
            .args(["--grad_acumm", &training.grad_accum.to_string()])
            .args(["--max_text_length", &training.max_text_length.to_string()])
            .args(["--max_audio_length", &training.max_audio_length.to_string()])
            .args(["--weight_decay", &training.weight_decay.to_string()])
            .args(["--lr", &training.learning_rate.to_string()])
            .args(["--save_step", &training.save_step.to_string()])
            .current_dir(&self.config.paths.toolkit_dir);

        if self.prereqs.gpus.is_empty() {
            warn!("no GPU detected; not exporting CUDA_VISIBLE_DEVICES");
        } else {
            cmd.env(
                "CUDA_VISIBLE_DEVICES",
                self.config.device.cuda_device.to_string(),
            );
        }
        exec::run("training", &mut cmd)?;

        self.run_post_train_hook();
        Ok(())
    }

    /// The post-training hook is optional; a failure is logged and ignored.
    fn run_post_train_hook(&self) {
        let Some(hook) = &self.config.toolkit.post_train_hook else {
            return;
        };
        if !hook.exists() {
            warn!(hook = %hook.display(), "post-train hook not found, skipping");
            return;
        }
        let mut cmd = std::process::Command::new(hook);
        if let Err(err) = exec::run("post-train hook", &mut cmd) {
            warn!(%err, "post-train hook failed; continuing");
        }
    }

    /// Write `run.json` next to the checkpoints with the resolved config and
    /// per-phase wall times.
    fn write_manifest(&self, records: &[PhaseRecord]) -> Result<()> {
        fs::create_dir_all(&self.config.checkpoint.dir)?;
        let path = self.config.checkpoint.dir.join("run.json");
        let manifest = RunManifest {
            config: &self.config,
            phases: records,
        };
        let data = serde_json::to_string_pretty(&manifest)?;
        fs::write(&path, data).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "run manifest written");
        Ok(())
    }
}
