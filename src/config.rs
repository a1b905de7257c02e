//! Configuration for the fine-tuning pipeline.
//!
//! Configurations are typically loaded from YAML files using [`load_config`];
//! every field has a default matching a plain `xtts-finetune run` with no
//! config file, and individual values can be overridden from the command line
//! via [`Overrides`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
/// Hyperparameters forwarded to the external training script.
pub struct TrainingConfig {
    /// Number of fine-tuning epochs.
    pub epochs: u32,
    /// Per-device batch size.
    pub batch_size: u32,
    /// Gradient accumulation steps.
    pub grad_accum: u32,
    /// Learning rate.
    pub learning_rate: f64,
    /// Weight decay.
    pub weight_decay: f64,
    /// Checkpoint save interval in optimizer steps.
    pub save_step: u32,
    /// Maximum text length in characters; longer samples are dropped by the trainer.
    pub max_text_length: u32,
    /// Maximum audio length in samples; longer samples are dropped by the trainer.
    pub max_audio_length: u32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 8,
            grad_accum: 4,
            learning_rate: 5e-6,
            weight_decay: 1e-2,
            save_step: 2000,
            max_text_length: 200,
            max_audio_length: 255_995,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
/// Target-language settings for vocabulary extension.
pub struct LanguageConfig {
    /// ISO language code of the language being added (e.g. "mos").
    pub language: String,
    /// Number of new BPE entries added to the base vocabulary.
    pub vocab_size: u32,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            language: "mos".to_string(),
            vocab_size: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
/// GPU selection. `CUDA_VISIBLE_DEVICES` is only exported when a GPU was
/// detected during the prerequisite check.
pub struct DeviceConfig {
    /// CUDA device index to train on.
    pub cuda_device: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { cuda_device: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
/// Filesystem layout. Relative paths resolve against the working directory.
pub struct PathsConfig {
    /// Directory holding `metadata_train.csv`, `metadata_eval.csv` and `wavs/`.
    pub dataset_dir: PathBuf,
    /// Directory the external toolkit is cloned into.
    pub toolkit_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("dataset"),
            toolkit_dir: PathBuf::from("xTTS"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
/// The external fine-tuning toolkit: where it comes from and which of its
/// scripts each phase invokes. The argument contracts of these scripts are
/// defined by the toolkit, not by this tool.
pub struct ToolkitConfig {
    /// Git URL of the toolkit repository.
    pub repo_url: String,
    /// Dataset generation script, resolved against the working directory.
    pub generate_script: PathBuf,
    /// Vocabulary extension script, resolved inside the toolkit checkout.
    pub extend_script: String,
    /// Training script, resolved inside the toolkit checkout.
    pub train_script: String,
    /// Optional hook run after training; failure is logged and ignored.
    pub post_train_hook: Option<PathBuf>,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            repo_url: "https://github.com/anhnh2002/XTTSv2-Finetuning-for-New-Languages.git"
                .to_string(),
            generate_script: PathBuf::from("generate_data.py"),
            extend_script: "extend_vocab_config.py".to_string(),
            train_script: "train_gpt_xtts.py".to_string(),
            post_train_hook: None,
        }
    }
}

/// Base model files the download phase fetches when absent.
const BASE_MODEL_FILES: [&str; 5] = [
    "model.pth",
    "config.json",
    "vocab.json",
    "dvae.pth",
    "mel_stats.pth",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
/// Where the base XTTS checkpoint comes from and where it lands.
pub struct CheckpointConfig {
    /// Directory checkpoints are written under.
    pub dir: PathBuf,
    /// Source of each base model file. Supports `hf://owner/repo/file`,
    /// `https://` URLs and local paths (copied as-is).
    pub files: Vec<String>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("checkpoints"),
            files: BASE_MODEL_FILES
                .iter()
                .map(|f| format!("hf://coqui/XTTS-v2/{f}"))
                .collect(),
        }
    }
}

/// Top-level pipeline configuration.
///
/// Load from YAML using [`load_config`]. Any section or field may be omitted;
/// missing values take the defaults below.
///
/// # Example YAML
///
/// ```yaml
/// training: { epochs: 4, batch_size: 8, grad_accum: 4 }
/// language: { language: mos, vocab_size: 2000 }
/// checkpoint:
///   dir: checkpoints
/// paths:
///   dataset_dir: dataset
///   toolkit_dir: xTTS
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Training hyperparameters.
    pub training: TrainingConfig,
    /// Target language and vocabulary size.
    pub language: LanguageConfig,
    /// GPU selection.
    pub device: DeviceConfig,
    /// Dataset and toolkit locations.
    pub paths: PathsConfig,
    /// External toolkit origin and scripts.
    pub toolkit: ToolkitConfig,
    /// Base checkpoint source and destination.
    pub checkpoint: CheckpointConfig,
}

impl Config {
    /// Directory the base model files are placed in, under the checkpoint dir.
    pub fn base_model_dir(&self) -> PathBuf {
        self.checkpoint.dir.join("XTTS_v2.0_original_model_files")
    }

    /// Check that the configuration is usable before any phase runs.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.training.epochs == 0 {
            anyhow::bail!("training.epochs must be at least 1");
        }
        if self.training.batch_size == 0 {
            anyhow::bail!("training.batch_size must be at least 1");
        }
        if self.training.grad_accum == 0 {
            anyhow::bail!("training.grad_accum must be at least 1");
        }
        if !(self.training.learning_rate.is_finite() && self.training.learning_rate > 0.0) {
            anyhow::bail!(
                "training.learning_rate must be positive, got {}",
                self.training.learning_rate
            );
        }
        if self.language.vocab_size == 0 {
            anyhow::bail!("language.vocab_size must be at least 1");
        }
        let lang = &self.language.language;
        if lang.is_empty()
            || lang.len() > 10
            || !lang
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            anyhow::bail!("language.language must be a lowercase ISO-style code, got {lang:?}");
        }
        if self.checkpoint.files.is_empty() {
            anyhow::bail!("checkpoint.files must list at least one source");
        }
        Ok(())
    }
}

/// Load a pipeline configuration from a YAML file.
///
/// # Errors
///
/// Returns an error if the file doesn't exist or contains invalid YAML.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let data = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&data)?;
    Ok(config)
}

/// Command-line overrides for the handful of values the original pipeline
/// exposes as flags. `None` leaves the config value untouched.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub epochs: Option<u32>,
    pub batch_size: Option<u32>,
    pub grad_accum: Option<u32>,
    pub learning_rate: Option<f64>,
    pub weight_decay: Option<f64>,
    pub save_step: Option<u32>,
    pub language: Option<String>,
    pub vocab_size: Option<u32>,
    pub cuda_device: Option<u32>,
}

impl Overrides {
    /// Apply every set override to `config`, replacing the loaded value.
    pub fn apply(&self, config: &mut Config) {
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(grad_accum) = self.grad_accum {
            config.training.grad_accum = grad_accum;
        }
        if let Some(lr) = self.learning_rate {
            config.training.learning_rate = lr;
        }
        if let Some(weight_decay) = self.weight_decay {
            config.training.weight_decay = weight_decay;
        }
        if let Some(save_step) = self.save_step {
            config.training.save_step = save_step;
        }
        if let Some(language) = &self.language {
            config.language.language = language.clone();
        }
        if let Some(vocab_size) = self.vocab_size {
            config.language.vocab_size = vocab_size;
        }
        if let Some(cuda_device) = self.cuda_device {
            config.device.cuda_device = cuda_device;
        }
    }
}

/// Resolve a possibly relative path against the working directory, making it
/// safe to pass to a subprocess running in a different directory.
pub fn absolutize(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_plain_invocation() {
        let config = Config::default();
        assert_eq!(config.training.epochs, 10);
        assert_eq!(config.training.batch_size, 8);
        assert_eq!(config.language.language, "mos");
        assert_eq!(config.language.vocab_size, 2000);
        assert_eq!(config.paths.toolkit_dir, PathBuf::from("xTTS"));
        assert_eq!(config.checkpoint.files.len(), 5);
        config.validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_defaults_elsewhere() {
        let config: Config =
            serde_yaml::from_str("training: { epochs: 3 }\nlanguage: { language: sw }\n").unwrap();
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.batch_size, 8);
        assert_eq!(config.language.language, "sw");
        assert_eq!(config.language.vocab_size, 2000);
    }

    #[test]
    fn unknown_yaml_key_is_rejected() {
        let err = serde_yaml::from_str::<Config>("training: { epochz: 3 }").unwrap_err();
        assert!(err.to_string().contains("epochz"));
    }

    #[test]
    fn load_config_rejects_missing_file() {
        let err = load_config("does/not/exist.yaml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn overrides_replace_only_set_fields() {
        let mut config = Config::default();
        let overrides = Overrides {
            epochs: Some(7),
            language: Some("yo".to_string()),
            cuda_device: Some(1),
            ..Overrides::default()
        };
        overrides.apply(&mut config);
        assert_eq!(config.training.epochs, 7);
        assert_eq!(config.language.language, "yo");
        assert_eq!(config.device.cuda_device, 1);
        // untouched fields keep their defaults
        assert_eq!(config.training.batch_size, 8);
        assert_eq!(config.language.vocab_size, 2000);
    }

    #[test]
    fn validate_rejects_zero_epochs() {
        let mut config = Config::default();
        config.training.epochs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("epochs"));
    }

    #[test]
    fn validate_rejects_bad_learning_rate() {
        let mut config = Config::default();
        config.training.learning_rate = -1.0;
        assert!(config.validate().is_err());
        config.training.learning_rate = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_language_code() {
        let mut config = Config::default();
        config.language.language = "Mossi Language".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("language"));
    }
}
