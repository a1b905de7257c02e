//! Thin subprocess layer shared by every pipeline phase.
//!
//! Long-running phases inherit the parent's stdio so the user sees the
//! delegated tool's own output; probes capture stdout instead. A non-zero
//! exit is always an error carrying the phase label and exit code.

use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use tracing::info;

/// Render a command for logs and error messages.
fn render(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run a command to completion with inherited stdio.
///
/// # Errors
///
/// Returns an error if the program cannot be spawned or exits non-zero.
pub fn run(label: &str, cmd: &mut Command) -> Result<()> {
    info!(command = %render(cmd), "{label}");
    let status = cmd
        .status()
        .with_context(|| format!("{label}: failed to start `{}`", render(cmd)))?;
    if !status.success() {
        match status.code() {
            Some(code) => anyhow::bail!("{label} failed with exit code {code}"),
            None => anyhow::bail!("{label} was terminated by a signal"),
        }
    }
    Ok(())
}

/// Run a command and return its trimmed stdout. Used for version probes.
///
/// # Errors
///
/// Returns an error if the program cannot be spawned or exits non-zero; the
/// error message includes a snippet of stderr when available.
pub fn run_capture(cmd: &mut Command) -> Result<String> {
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to start `{}`", render(cmd)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "`{}` exited with {}: {}",
            render(cmd),
            output.status,
            stderr.lines().next().unwrap_or("").trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// True when the spawn failure means the program does not exist on PATH.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io| io.kind() == std::io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_program_and_args() {
        let mut cmd = Command::new("git");
        cmd.args(["clone", "url", "dir"]);
        assert_eq!(render(&cmd), "git clone url dir");
    }

    #[cfg(unix)]
    #[test]
    fn run_capture_returns_trimmed_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo '  hello  '"]);
        assert_eq!(run_capture(&mut cmd).unwrap(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn run_reports_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        let err = run("test step", &mut cmd).unwrap_err();
        assert!(err.to_string().contains("exit code 3"), "{err}");
    }

    #[test]
    fn missing_program_is_not_found() {
        let mut cmd = Command::new("definitely-not-a-real-tool-9f2a");
        let err = run_capture(&mut cmd).unwrap_err();
        assert!(is_not_found(&err));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_not_missing_program() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 1"]);
        let err = run_capture(&mut cmd).unwrap_err();
        assert!(!is_not_found(&err));
    }
}
