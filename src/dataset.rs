//! Validation of the generated dataset layout.
//!
//! The data generation script writes pipe-delimited metadata files with the
//! header `audio_file|text|speaker_name` next to a `wavs/` directory. The
//! trainer consumes these as-is; this module only checks that they exist and
//! are well-formed before hours of GPU time are committed to them.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Expected metadata header fields, in order.
pub const METADATA_HEADER: [&str; 3] = ["audio_file", "text", "speaker_name"];

/// How many rows have their audio path checked on disk.
const AUDIO_SAMPLE_ROWS: usize = 16;

/// Row counts and speaker count for one validated dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub train_rows: usize,
    pub eval_rows: usize,
    pub speakers: usize,
}

/// A single parsed metadata row.
#[derive(Debug, Clone)]
pub struct MetadataRow {
    pub audio_file: String,
    pub text: String,
    pub speaker: String,
}

/// Validate `metadata_train.csv` and `metadata_eval.csv` under `dataset_dir`.
///
/// # Errors
///
/// Returns an error if either file is missing, has the wrong header, has no
/// data rows, or references audio files that don't exist (checked for the
/// first few rows only).
pub fn validate(dataset_dir: &Path) -> Result<DatasetSummary> {
    let train = parse_metadata(&dataset_dir.join("metadata_train.csv"))?;
    let eval = parse_metadata(&dataset_dir.join("metadata_eval.csv"))?;

    for rows in [&train, &eval] {
        for row in rows.iter().take(AUDIO_SAMPLE_ROWS) {
            let audio = dataset_dir.join(&row.audio_file);
            if !audio.exists() {
                anyhow::bail!(
                    "metadata references missing audio file: {}",
                    audio.display()
                );
            }
        }
    }

    let speakers: HashSet<&str> = train
        .iter()
        .chain(eval.iter())
        .map(|row| row.speaker.as_str())
        .collect();

    Ok(DatasetSummary {
        train_rows: train.len(),
        eval_rows: eval.len(),
        speakers: speakers.len(),
    })
}

/// Parse one pipe-delimited metadata file.
///
/// The text column may itself contain `|` when the generator quoted it, so a
/// row is split at the first delimiter (audio path) and the last (speaker);
/// everything between is the transcript.
pub fn parse_metadata(path: &Path) -> Result<Vec<MetadataRow>> {
    if !path.exists() {
        anyhow::bail!(
            "{} not found; run the generate-data phase first",
            path.display()
        );
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut lines = data.lines();

    let header = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("{} is empty", path.display()))?;
    let fields: Vec<&str> = header.split('|').map(str::trim).collect();
    if fields != METADATA_HEADER {
        anyhow::bail!(
            "{} has header {:?}, expected {:?}",
            path.display(),
            fields,
            METADATA_HEADER
        );
    }

    let mut rows = Vec::new();
    for (lineno, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (audio_file, rest) = line.split_once('|').ok_or_else(|| {
            anyhow::anyhow!("{}:{}: not pipe-delimited", path.display(), lineno + 2)
        })?;
        let (text, speaker) = rest.rsplit_once('|').ok_or_else(|| {
            anyhow::anyhow!("{}:{}: missing speaker column", path.display(), lineno + 2)
        })?;
        if audio_file.trim().is_empty() || text.trim().is_empty() {
            anyhow::bail!(
                "{}:{}: empty audio path or transcript",
                path.display(),
                lineno + 2
            );
        }
        rows.push(MetadataRow {
            audio_file: audio_file.trim().to_string(),
            text: text.trim().to_string(),
            speaker: speaker.trim().to_string(),
        });
    }

    if rows.is_empty() {
        anyhow::bail!("{} has a header but no data rows", path.display());
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    fn make_dataset(dir: &Path, train: &str, eval: &str) {
        fs::create_dir_all(dir.join("wavs")).unwrap();
        write(&dir.join("wavs/000000.wav"), "");
        write(&dir.join("wavs/000001.wav"), "");
        write(&dir.join("metadata_train.csv"), train);
        write(&dir.join("metadata_eval.csv"), eval);
    }

    const HEADER: &str = "audio_file|text|speaker_name\n";

    #[test]
    fn accepts_generated_layout() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(
            dir.path(),
            &format!(
                "{HEADER}wavs/000000.wav|wẽnd na kõ-y vĩim|@SPK1\nwavs/000001.wav|yibeogo|@SPK2\n"
            ),
            &format!("{HEADER}wavs/000000.wav|ne y taaba|@SPK1\n"),
        );
        let summary = validate(dir.path()).unwrap();
        assert_eq!(
            summary,
            DatasetSummary {
                train_rows: 2,
                eval_rows: 1,
                speakers: 2
            }
        );
    }

    #[test]
    fn transcript_may_contain_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(
            dir.path(),
            &format!("{HEADER}wavs/000000.wav|left | right|@SPK\n"),
            &format!("{HEADER}wavs/000000.wav|plain|@SPK\n"),
        );
        let rows = parse_metadata(&dir.path().join("metadata_train.csv")).unwrap();
        assert_eq!(rows[0].text, "left | right");
        assert_eq!(rows[0].speaker, "@SPK");
    }

    #[test]
    fn rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate(dir.path()).unwrap_err();
        assert!(err.to_string().contains("metadata_train.csv"), "{err}");
    }

    #[test]
    fn rejects_wrong_header() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(
            dir.path(),
            "file|transcript|who\nwavs/000000.wav|a|@S\n",
            &format!("{HEADER}wavs/000000.wav|a|@S\n"),
        );
        let err = validate(dir.path()).unwrap_err();
        assert!(err.to_string().contains("header"), "{err}");
    }

    #[test]
    fn rejects_header_without_rows() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(dir.path(), HEADER, &format!("{HEADER}wavs/000000.wav|a|@S\n"));
        let err = validate(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no data rows"), "{err}");
    }

    #[test]
    fn rejects_missing_audio() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(
            dir.path(),
            &format!("{HEADER}wavs/does_not_exist.wav|a|@S\n"),
            &format!("{HEADER}wavs/000000.wav|a|@S\n"),
        );
        let err = validate(dir.path()).unwrap_err();
        assert!(err.to_string().contains("missing audio"), "{err}");
    }

    #[test]
    fn skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(
            dir.path(),
            &format!("{HEADER}\nwavs/000000.wav|a|@S\n\n"),
            &format!("{HEADER}wavs/000000.wav|a|@S\n"),
        );
        let summary = validate(dir.path()).unwrap();
        assert_eq!(summary.train_rows, 1);
    }
}
