//! Lightweight timing aggregation for pipeline phases.
//!
//! Coarse-grained durations and counters with minimal overhead, always
//! enabled and reported only at the end of a run (behind `--verbose`).

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Duration,
    Counter,
}

/// Named metrics tracked by the perf collector.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum Metric {
    PrereqCheck,
    ToolkitClone,
    PipInstall,
    GenerateData,
    CheckpointDownload,
    ExtendVocab,
    Train,
    DatasetRows,
    DatasetSpeakers,
    FilesDownloaded,
    BytesDownloaded,
}

impl Metric {
    const COUNT: usize = 11;

    fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            Metric::PrereqCheck => "prereq.check",
            Metric::ToolkitClone => "toolkit.clone",
            Metric::PipInstall => "toolkit.pip_install",
            Metric::GenerateData => "dataset.generate",
            Metric::CheckpointDownload => "checkpoint.download",
            Metric::ExtendVocab => "vocab.extend",
            Metric::Train => "train.run",
            Metric::DatasetRows => "dataset.rows",
            Metric::DatasetSpeakers => "dataset.speakers",
            Metric::FilesDownloaded => "download.files",
            Metric::BytesDownloaded => "download.bytes",
        }
    }

    fn kind(self) -> MetricKind {
        match self {
            Metric::DatasetRows
            | Metric::DatasetSpeakers
            | Metric::FilesDownloaded
            | Metric::BytesDownloaded => MetricKind::Counter,
            _ => MetricKind::Duration,
        }
    }

    const ALL: [Metric; Metric::COUNT] = [
        Metric::PrereqCheck,
        Metric::ToolkitClone,
        Metric::PipInstall,
        Metric::GenerateData,
        Metric::CheckpointDownload,
        Metric::ExtendVocab,
        Metric::Train,
        Metric::DatasetRows,
        Metric::DatasetSpeakers,
        Metric::FilesDownloaded,
        Metric::BytesDownloaded,
    ];
}

struct PerfCollector {
    start: Instant,
    totals_us: [AtomicU64; Metric::COUNT],
    counts: [AtomicU64; Metric::COUNT],
}

impl PerfCollector {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            totals_us: std::array::from_fn(|_| AtomicU64::new(0)),
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn add_duration(&self, metric: Metric, duration: Duration) {
        let micros = duration.as_micros().min(u64::MAX as u128) as u64;
        let index = metric.index();
        self.totals_us[index].fetch_add(micros, Ordering::Relaxed);
        self.counts[index].fetch_add(1, Ordering::Relaxed);
    }

    fn add_count(&self, metric: Metric, delta: u64) {
        self.counts[metric.index()].fetch_add(delta, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PerfSnapshot {
        let mut totals_us = [0u64; Metric::COUNT];
        let mut counts = [0u64; Metric::COUNT];
        for idx in 0..Metric::COUNT {
            totals_us[idx] = self.totals_us[idx].load(Ordering::Relaxed);
            counts[idx] = self.counts[idx].load(Ordering::Relaxed);
        }
        PerfSnapshot {
            uptime: self.start.elapsed(),
            totals_us,
            counts,
        }
    }
}

static COLLECTOR: OnceLock<PerfCollector> = OnceLock::new();

fn collector() -> &'static PerfCollector {
    COLLECTOR.get_or_init(PerfCollector::new)
}

/// A RAII timer that records its duration when dropped.
pub struct PerfSpan {
    metric: Metric,
    start: Instant,
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        collector().add_duration(self.metric, self.start.elapsed());
    }
}

/// Begin a named timing span.
pub fn span(metric: Metric) -> PerfSpan {
    PerfSpan {
        metric,
        start: Instant::now(),
    }
}

/// Record a counter delta for a named metric.
pub fn add_count(metric: Metric, delta: u64) {
    collector().add_count(metric, delta);
}

/// Snapshot of collected performance data.
#[derive(Debug)]
pub struct PerfSnapshot {
    uptime: Duration,
    totals_us: [u64; Metric::COUNT],
    counts: [u64; Metric::COUNT],
}

impl PerfSnapshot {
    /// Format a human-readable report.
    pub fn format(&self) -> String {
        let mut duration_rows: Vec<(Metric, u64, u64)> = Vec::new();
        let mut counter_rows: Vec<(Metric, u64)> = Vec::new();

        for metric in Metric::ALL {
            let total_us = self.totals_us[metric.index()];
            let count = self.counts[metric.index()];
            match metric.kind() {
                MetricKind::Duration => {
                    if count > 0 || total_us > 0 {
                        duration_rows.push((metric, total_us, count));
                    }
                }
                MetricKind::Counter => {
                    if count > 0 {
                        counter_rows.push((metric, count));
                    }
                }
            }
        }

        duration_rows.sort_by(|a, b| b.1.cmp(&a.1));
        counter_rows.sort_by(|a, b| b.1.cmp(&a.1));

        let mut output = String::new();
        let _ = writeln!(
            &mut output,
            "Pipeline summary (uptime: {:.3}s)",
            self.uptime.as_secs_f64()
        );

        if duration_rows.is_empty() && counter_rows.is_empty() {
            let _ = writeln!(&mut output, "No phases recorded.");
            return output;
        }

        if !duration_rows.is_empty() {
            let _ = writeln!(&mut output, "Phases:");
            for (metric, total_us, _count) in duration_rows {
                let _ = writeln!(
                    &mut output,
                    "  {:<24} {:>10.3}s",
                    metric.name(),
                    (total_us as f64) / 1_000_000.0,
                );
            }
        }

        if !counter_rows.is_empty() {
            let _ = writeln!(&mut output, "Counters:");
            for (metric, value) in counter_rows {
                let _ = writeln!(&mut output, "  {:<24} {}", metric.name(), value);
            }
        }

        output
    }
}

/// Format a report of all collected metrics.
pub fn report() -> String {
    collector().snapshot().format()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_and_counter_show_up_in_report() {
        {
            let _span = span(Metric::PrereqCheck);
            std::thread::sleep(Duration::from_millis(1));
        }
        add_count(Metric::DatasetRows, 42);

        let report = report();
        assert!(report.contains("prereq.check"), "{report}");
        assert!(report.contains("dataset.rows"), "{report}");
    }

    #[test]
    fn every_metric_has_a_distinct_name() {
        let mut names: Vec<&str> = Metric::ALL.iter().map(|m| m.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Metric::COUNT);
    }
}
