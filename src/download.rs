//! Fetching the base XTTS model files.
//!
//! Each file source is either a HuggingFace Hub path (`hf://owner/repo/file`,
//! optionally `@revision`), a direct HTTP(S) URL, or a local path. Files that
//! already exist in the destination directory are left alone, so re-running
//! the download phase is cheap.

use crate::perf::{self, Metric};
use anyhow::{Context, Result};
use hf_hub::api::sync::Api;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Fetch every listed source into `dest_dir`, skipping files already present.
///
/// Returns the number of files actually downloaded.
///
/// # Errors
///
/// Returns an error on the first source that cannot be fetched, or when the
/// downloaded `config.json` is not valid JSON.
pub fn fetch_base_model(dest_dir: &Path, sources: &[String]) -> Result<usize> {
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("creating {}", dest_dir.display()))?;

    let mut fetched = 0;
    for source in sources {
        let filename = source_filename(source)?;
        let dest = dest_dir.join(&filename);
        if dest.exists() {
            info!(file = %filename, "already present, skipping");
            continue;
        }
        fetch_one(source, &dest)?;
        perf::add_count(Metric::FilesDownloaded, 1);
        fetched += 1;
    }

    let config = dest_dir.join("config.json");
    if config.exists() {
        verify_model_config(&config)?;
    }
    Ok(fetched)
}

/// Fetch a single source to `dest`.
fn fetch_one(source: &str, dest: &Path) -> Result<()> {
    if let Some(stripped) = source.strip_prefix("hf://") {
        let (repo_id, filename, revision) = parse_hf_path(stripped)?;
        info!(repo = %repo_id, file = %filename, "downloading from HuggingFace Hub");
        let api = Api::new()?;
        let repo = match revision {
            Some(rev) => api.repo(hf_hub::Repo::with_revision(
                repo_id,
                hf_hub::RepoType::Model,
                rev,
            )),
            None => api.repo(hf_hub::Repo::model(repo_id)),
        };
        let cached = repo.get(&filename)?;
        copy_atomic(&cached, dest)?;
        return Ok(());
    }

    if source.starts_with("http://") || source.starts_with("https://") {
        return download_http(source, dest);
    }

    let local = PathBuf::from(source);
    if !local.exists() {
        anyhow::bail!("No such file or directory: {source}");
    }
    copy_atomic(&local, dest)
}

/// Download an HTTP(S) URL to `dest` via a temp file.
fn download_http(url: &str, dest: &Path) -> Result<()> {
    info!(%url, "downloading");
    let response = ureq::get(url)
        .call()
        .map_err(|e| anyhow::anyhow!("Failed to download {url}: {e}"))?;

    let mut data = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut data)
        .map_err(|e| anyhow::anyhow!("Failed to read response for {url}: {e}"))?;
    perf::add_count(Metric::BytesDownloaded, data.len() as u64);

    // Write to a temporary file first, then rename (atomic on most filesystems)
    let temp_path = dest.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(&data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp_path, dest)?;

    info!(dest = %dest.display(), "downloaded");
    Ok(())
}

/// Copy through a temp file so a partial copy never shadows the real name.
fn copy_atomic(src: &Path, dest: &Path) -> Result<()> {
    let temp_path = dest.with_extension("tmp");
    fs::copy(src, &temp_path)
        .with_context(|| format!("copying {} to {}", src.display(), temp_path.display()))?;
    fs::rename(&temp_path, dest)?;
    Ok(())
}

/// The on-disk name a source will be saved under.
fn source_filename(source: &str) -> Result<String> {
    let path = source
        .strip_prefix("hf://")
        .unwrap_or(source)
        .split('@')
        .next()
        .unwrap_or(source);
    let name = path.rsplit(['/', '\\']).next().unwrap_or("");
    if name.is_empty() {
        anyhow::bail!("Cannot determine filename for source: {source}");
    }
    Ok(name.to_string())
}

/// Parse `owner/repo/path@rev` into components for HuggingFace downloads.
fn parse_hf_path(path: &str) -> Result<(String, String, Option<String>)> {
    let mut parts = path.split('/').collect::<Vec<_>>();
    if parts.len() < 3 {
        anyhow::bail!("Invalid hf:// path: {path}");
    }
    let repo_id = format!("{}/{}", parts.remove(0), parts.remove(0));
    let filename = parts.join("/");

    if let Some((file, rev)) = filename.split_once('@') {
        return Ok((repo_id, file.to_string(), Some(rev.to_string())));
    }

    Ok((repo_id, filename, None))
}

/// A downloaded model config must at least parse as JSON with a `model` key;
/// HTML error pages saved as config.json are the usual corruption mode.
fn verify_model_config(path: &Path) -> Result<()> {
    let data = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&data)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    if !value.is_object() {
        anyhow::bail!("{} does not contain a JSON object", path.display());
    }
    Ok(())
}
