//! Managing the external fine-tuning toolkit checkout.
//!
//! The toolkit owns every training-related algorithm; this module only gets
//! it onto disk (git clone), installs its Python requirements, and resolves
//! the scripts the pipeline invokes.

use crate::config::Config;
use crate::exec;
use crate::prereq::Prereqs;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

/// Clone the toolkit repository unless it is already checked out.
///
/// # Errors
///
/// Returns an error if the clone fails, or if the target directory exists
/// but is not a git checkout.
pub fn ensure_toolkit(config: &Config, prereqs: &Prereqs) -> Result<()> {
    let dir = &config.paths.toolkit_dir;
    if dir.exists() {
        if !dir.join(".git").exists() {
            anyhow::bail!(
                "{} exists but is not a git checkout; move it aside or point paths.toolkit_dir elsewhere",
                dir.display()
            );
        }
        info!(dir = %dir.display(), "toolkit already cloned, skipping");
        return Ok(());
    }

    let mut cmd = Command::new(&prereqs.git.program);
    cmd.arg("clone")
        .arg("--depth=1")
        .arg(&config.toolkit.repo_url)
        .arg(dir);
    exec::run("cloning toolkit", &mut cmd)
}

/// Install the toolkit's Python requirements with pip.
///
/// # Errors
///
/// Returns an error if `requirements.txt` is missing or pip fails.
pub fn install_requirements(config: &Config, prereqs: &Prereqs) -> Result<()> {
    let requirements = config.paths.toolkit_dir.join("requirements.txt");
    if !requirements.exists() {
        anyhow::bail!(
            "{} not found; the toolkit checkout looks incomplete",
            requirements.display()
        );
    }

    let mut cmd = prereqs.pip_command();
    cmd.args(["install", "-r", "requirements.txt"])
        .current_dir(&config.paths.toolkit_dir);
    exec::run("installing toolkit requirements", &mut cmd)
}

/// Resolve a script name inside the toolkit checkout.
///
/// # Errors
///
/// Returns an error if the script does not exist there.
pub fn script_path(config: &Config, script: &str) -> Result<PathBuf> {
    let path = config.paths.toolkit_dir.join(script);
    if !path.exists() {
        anyhow::bail!(
            "{} not found in the toolkit checkout; run the setup phase first",
            path.display()
        );
    }
    Ok(path)
}

/// Resolve the dataset generation script against the working directory.
///
/// # Errors
///
/// Returns an error if the configured script does not exist.
pub fn generate_script(config: &Config) -> Result<PathBuf> {
    let path = &config.toolkit.generate_script;
    if !path.exists() {
        anyhow::bail!(
            "data generation script not found: {}",
            path.display()
        );
    }
    Ok(path.clone())
}

/// Best-effort directory creation for outputs the toolkit writes into.
pub fn prepare_output_dirs(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.checkpoint.dir)
        .with_context(|| format!("creating {}", config.checkpoint.dir.display()))?;
    Ok(())
}
