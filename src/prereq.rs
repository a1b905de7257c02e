//! Prerequisite checks for the external tools the pipeline shells out to.
//!
//! `git`, `python` and `pip` are required; a CUDA GPU is optional and its
//! absence only downgrades training to CPU.

use crate::exec;
use anyhow::Result;
use std::process::Command;
use tracing::warn;

/// A resolved external tool: the program name that answered the probe and
/// the version string it reported.
#[derive(Debug, Clone)]
pub struct Tool {
    /// Program name to invoke (e.g. "python3").
    pub program: String,
    /// Version as reported by `--version`, e.g. "3.11.8".
    pub version: String,
}

/// Result of the prerequisite check.
#[derive(Debug, Clone)]
pub struct Prereqs {
    pub git: Tool,
    pub python: Tool,
    pub pip: Tool,
    /// True when pip only answers as `python -m pip`.
    pub pip_via_module: bool,
    /// Names of detected CUDA GPUs; empty means CPU-only.
    pub gpus: Vec<String>,
}

impl Prereqs {
    /// Command invoking the resolved Python interpreter.
    pub fn python_command(&self) -> Command {
        Command::new(&self.python.program)
    }

    /// Command invoking pip, either directly or through `python -m pip`.
    pub fn pip_command(&self) -> Command {
        if self.pip_via_module {
            let mut cmd = self.python_command();
            cmd.args(["-m", "pip"]);
            cmd
        } else {
            Command::new(&self.pip.program)
        }
    }

    /// One line per tool, suitable for printing at the start of a run.
    pub fn summary(&self) -> String {
        let gpu = if self.gpus.is_empty() {
            "none (training on CPU)".to_string()
        } else {
            self.gpus.join(", ")
        };
        format!(
            "git {}\npython {}\npip {}\ngpu: {gpu}",
            self.git.version, self.python.version, self.pip.version
        )
    }
}

/// Probe every required tool and the optional GPU.
///
/// # Errors
///
/// Returns an error naming the first missing required tool.
pub fn check() -> Result<Prereqs> {
    let git = probe("git", &["git"])?;
    let python = probe("python", &["python3", "python"])?;
    if !python.version.starts_with("3.") {
        anyhow::bail!(
            "Python 3 is required, found {} {}",
            python.program,
            python.version
        );
    }

    let (pip, pip_via_module) = match probe("pip", &["pip", "pip3"]) {
        Ok(tool) => (tool, false),
        Err(_) => {
            let mut cmd = Command::new(&python.program);
            cmd.args(["-m", "pip", "--version"]);
            let out = exec::run_capture(&mut cmd).map_err(|e| {
                anyhow::anyhow!("pip not found (tried pip, pip3 and {} -m pip): {e}", python.program)
            })?;
            (
                Tool {
                    program: format!("{} -m pip", python.program),
                    version: parse_version(&out),
                },
                true,
            )
        }
    };

    let gpus = detect_gpus();
    if gpus.is_empty() {
        warn!("no CUDA GPU detected; training will run on CPU");
    }

    Ok(Prereqs {
        git,
        python,
        pip,
        pip_via_module,
        gpus,
    })
}

/// Try each candidate program in turn, returning the first that answers
/// `--version`.
fn probe(name: &str, candidates: &[&str]) -> Result<Tool> {
    for candidate in candidates {
        let mut cmd = Command::new(candidate);
        cmd.arg("--version");
        match exec::run_capture(&mut cmd) {
            Ok(out) => {
                return Ok(Tool {
                    program: candidate.to_string(),
                    version: parse_version(&out),
                })
            }
            Err(err) if exec::is_not_found(&err) => continue,
            Err(err) => return Err(err.context(format!("probing {candidate}"))),
        }
    }
    anyhow::bail!(
        "{name} not found on PATH (tried: {}). Install it and retry.",
        candidates.join(", ")
    )
}

/// Extract the dotted version number from a `--version` line like
/// "git version 2.43.0" or "Python 3.11.8".
fn parse_version(output: &str) -> String {
    let first_line = output.lines().next().unwrap_or("");
    first_line
        .split_whitespace()
        .find(|word| {
            word.chars().next().is_some_and(|c| c.is_ascii_digit()) && word.contains('.')
        })
        .unwrap_or(first_line)
        .to_string()
}

/// List CUDA GPU names via nvidia-smi. Any failure means no GPU.
fn detect_gpus() -> Vec<String> {
    let mut cmd = Command::new("nvidia-smi");
    cmd.args(["--query-gpu=name", "--format=csv,noheader"]);
    match exec::run_capture(&mut cmd) {
        Ok(out) => out
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}
