//! Metrics and the summary report produced by a pipeline run.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::datafile::TokenWidth;

/// Wall-clock time spent in each stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageTimings {
    /// Ensuring every source is on disk.
    pub fetch: Duration,
    /// Reading, annotating, assembling and persisting the annotated text.
    pub annotate: Duration,
    /// Encoding the annotated corpus.
    pub encode: Duration,
    /// Writing both token files.
    pub write: Duration,
    /// Whole run.
    pub total: Duration,
}

/// Per-source summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceReport {
    /// Configured location.
    pub location: String,
    /// Document-id namespace.
    pub namespace: u32,
    /// Local file the raw text was read from.
    pub path: PathBuf,
    /// Raw text size in bytes.
    pub bytes: usize,
    /// Number of annotated documents.
    pub documents: usize,
}

/// A file written by the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactReport {
    /// Destination path.
    pub path: PathBuf,
    /// Tokens for binary files, bytes for the annotated text.
    pub size: usize,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineReport {
    /// Sources in merge order.
    pub sources: Vec<SourceReport>,
    /// Annotated corpus file (`size` in bytes).
    pub annotated: ArtifactReport,
    /// Length of the full token sequence.
    pub total_tokens: usize,
    /// Width used for both token files.
    pub token_width: TokenWidth,
    /// Validation token file (`size` in tokens).
    pub validation: ArtifactReport,
    /// Training token file (`size` in tokens).
    pub train: ArtifactReport,
    /// Stage timings.
    pub timings: StageTimings,
    /// Resident set size sample captured from `/proc/self/status` on Linux.
    pub rss_kb: Option<usize>,
}

impl PipelineReport {
    /// Total number of annotated documents across all sources.
    #[must_use]
    pub fn documents(&self) -> usize {
        self.sources.iter().map(|source| source.documents).sum()
    }
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let value = rest
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok());
            return value;
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size (RSS) on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}
