//! # xtts-finetune - XTTS fine-tuning pipeline runner
//!
//! Automates fine-tuning the XTTS text-to-speech model for a new language.
//! The heavy lifting (data preprocessing, vocabulary extension, training)
//! lives in an external Python toolkit; this crate sequences it reliably.
//!
//! ## Pipeline phases
//!
//! 1. **Setup** ([`toolkit`]): clone the fine-tuning toolkit and install its
//!    Python requirements.
//! 2. **Generate data** ([`dataset`]): run the dataset generation script,
//!    then validate the metadata files it writes.
//! 3. **Download checkpoint** ([`download`]): fetch the base XTTS model
//!    files from HuggingFace Hub, an HTTP mirror, or local paths.
//! 4. **Extend vocabulary**: run the toolkit's vocabulary extension script
//!    for the target language.
//! 5. **Train**: run the toolkit's training script with the configured
//!    hyperparameters, on GPU when one is present.
//!
//! Phases run strictly in order and the first failure aborts the run; see
//! [`Pipeline`] for the runner and [`Config`] for every tunable.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//! use xtts_finetune::{prereq, Config, Pipeline};
//!
//! let mut config = Config::default();
//! config.language.language = "sw".to_string();
//!
//! let prereqs = prereq::check().unwrap();
//! let interrupted = Arc::new(AtomicBool::new(false));
//! let pipeline = Pipeline::new(config, prereqs, interrupted).unwrap();
//! pipeline.run_all().unwrap();
//! ```

// Public modules - these are part of the stable API
pub mod config;
pub mod dataset;
pub mod download;
pub mod pipeline;
pub mod prereq;
pub mod toolkit;

// Internal modules - exposed for integration tests but not part of stable API.
#[doc(hidden)]
pub mod exec;
#[doc(hidden)]
pub mod perf;

// Re-exports forming the public API
pub use config::{load_config, Config, Overrides};
pub use dataset::DatasetSummary;
pub use pipeline::{Phase, Pipeline};
pub use prereq::Prereqs;
