//! Shared test utilities: a fake tool environment for driving the binary.
//!
//! Shim executables for `git`, `python` and `pip` are placed on PATH ahead of
//! the real tools. Every shim appends its argv to a log file so tests can
//! assert on what the pipeline actually invoked.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const GIT_SHIM: &str = r#"#!/bin/sh
echo "git $*" >> "$SHIM_LOG"
case "$1" in
  --version)
    echo "git version 2.43.0"
    ;;
  clone)
    for dest; do :; done
    mkdir -p "$dest/.git"
    : > "$dest/requirements.txt"
    : > "$dest/extend_vocab_config.py"
    : > "$dest/train_gpt_xtts.py"
    ;;
esac
exit 0
"#;

const PYTHON_SHIM: &str = r#"#!/bin/sh
echo "python $*" >> "$SHIM_LOG"
case "$1" in
  --version)
    echo "Python 3.11.8"
    exit 0
    ;;
  -m)
    exit 0
    ;;
esac
script=$(basename "$1")
case "$script" in
  generate_data.py)
    if [ "${SHIM_SKIP_DATASET:-0}" = "1" ]; then exit 0; fi
    mkdir -p dataset/wavs
    : > dataset/wavs/000000.wav
    printf 'audio_file|text|speaker_name\nwavs/000000.wav|yibeogo kibare|@SPK\n' > dataset/metadata_train.csv
    cp dataset/metadata_train.csv dataset/metadata_eval.csv
    ;;
  train_gpt_xtts.py)
    echo "CUDA_VISIBLE_DEVICES=${CUDA_VISIBLE_DEVICES:-unset}" >> "$SHIM_LOG"
    sleep "${SHIM_TRAIN_SLEEP:-0}"
    exit "${SHIM_TRAIN_EXIT:-0}"
    ;;
esac
exit 0
"#;

const PIP_SHIM: &str = r#"#!/bin/sh
echo "pip $*" >> "$SHIM_LOG"
case "$1" in
  --version)
    echo "pip 24.0 from /usr/lib/python3/dist-packages/pip (python 3.11)"
    ;;
esac
exit 0
"#;

const NVIDIA_SMI_SHIM: &str = r#"#!/bin/sh
echo "nvidia-smi $*" >> "$SHIM_LOG"
echo "NVIDIA GeForce RTX 3090"
exit 0
"#;

// The host may have a real nvidia-smi; a failing shim keeps the no-GPU
// environments deterministic.
const NO_GPU_SHIM: &str = r#"#!/bin/sh
exit 1
"#;

/// A scratch working directory plus a shim PATH for the binary under test.
pub struct TestEnv {
    shims: TempDir,
    pub work: TempDir,
    log: PathBuf,
}

impl TestEnv {
    /// Environment with git/python/pip shims and no GPU.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Environment that also answers `nvidia-smi` with one GPU.
    pub fn with_gpu() -> Self {
        Self::build(true)
    }

    fn build(gpu: bool) -> Self {
        let shims = TempDir::new().expect("shim dir");
        let work = TempDir::new().expect("work dir");
        let log = work.path().join("shim.log");

        write_shim(shims.path(), "git", GIT_SHIM);
        write_shim(shims.path(), "python", PYTHON_SHIM);
        write_shim(shims.path(), "python3", PYTHON_SHIM);
        write_shim(shims.path(), "pip", PIP_SHIM);
        write_shim(shims.path(), "pip3", PIP_SHIM);
        let smi = if gpu { NVIDIA_SMI_SHIM } else { NO_GPU_SHIM };
        write_shim(shims.path(), "nvidia-smi", smi);

        // the generate phase resolves this script in the working directory
        fs::write(work.path().join("generate_data.py"), "# stub\n").expect("generate stub");

        Self { shims, work, log }
    }

    /// Command for the binary under test, wired to the shim PATH and the
    /// scratch working directory.
    pub fn bin(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_xtts-finetune"));
        let path = format!(
            "{}:{}",
            self.shims.path().display(),
            std::env::var("PATH").unwrap_or_default()
        );
        cmd.current_dir(self.work.path())
            .env("PATH", path)
            .env("SHIM_LOG", &self.log);
        cmd
    }

    /// Everything the shims logged so far.
    pub fn log(&self) -> String {
        fs::read_to_string(&self.log).unwrap_or_default()
    }

    /// Write local stand-ins for the five base model files and return a
    /// config YAML path pointing the download phase at them.
    pub fn write_offline_config(&self) -> PathBuf {
        let fixtures = self.work.path().join("fixtures");
        fs::create_dir_all(&fixtures).expect("fixtures dir");
        let mut files = Vec::new();
        for name in ["model.pth", "vocab.json", "dvae.pth", "mel_stats.pth"] {
            let path = fixtures.join(name);
            fs::write(&path, b"weights").expect("fixture");
            files.push(path);
        }
        let config_json = fixtures.join("config.json");
        fs::write(&config_json, b"{\"model\": {}}").expect("fixture");
        files.push(config_json);

        let mut yaml = String::from("checkpoint:\n  files:\n");
        for file in &files {
            yaml.push_str(&format!("    - {}\n", file.display()));
        }
        let config_path = self.work.path().join("config.yaml");
        fs::write(&config_path, yaml).expect("config yaml");
        config_path
    }

    /// Pre-create a toolkit checkout and a valid dataset, so single-phase
    /// subcommands can run without the earlier phases.
    pub fn seed_toolkit_and_dataset(&self) {
        let toolkit = self.work.path().join("xTTS");
        fs::create_dir_all(toolkit.join(".git")).expect("toolkit .git");
        for name in [
            "requirements.txt",
            "extend_vocab_config.py",
            "train_gpt_xtts.py",
        ] {
            fs::write(toolkit.join(name), "").expect("toolkit file");
        }

        let dataset = self.work.path().join("dataset");
        fs::create_dir_all(dataset.join("wavs")).expect("dataset dirs");
        fs::write(dataset.join("wavs/000000.wav"), "").expect("wav");
        let metadata = "audio_file|text|speaker_name\nwavs/000000.wav|yibeogo|@SPK\n";
        fs::write(dataset.join("metadata_train.csv"), metadata).expect("train csv");
        fs::write(dataset.join("metadata_eval.csv"), metadata).expect("eval csv");
    }
}

fn write_shim(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write shim");
    let mut perms = fs::metadata(&path).expect("shim metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod shim");
}
