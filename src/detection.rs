//! Delimiter and encoding inference.
//!
//! Detection runs once per analysis, before anything else touches the file.
//! Encoding comes first because the delimiter scan works on decoded text.
//!
//! ```no_run
//! use profilekit::config::ProfilerConfig;
//! use profilekit::detection;
//!
//! let config = ProfilerConfig::default();
//! let found = detection::detect("data.csv".as_ref(), &config)?;
//! println!("{:?} / {}", found.delimiter, found.encoding);
//! # Ok::<(), profilekit::error::ProfilerError>(())
//! ```

pub mod delimiter;
pub mod encoding;
pub mod sniff;

pub use delimiter::{DelimiterGuess, detect_delimiter};
pub use encoding::{detect_encoding, resolve_encoding};

use crate::config::ProfilerConfig;
use crate::error::{DetectionError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read as _;
use std::path::Path;

/// How the delimiter was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStrategy {
    /// Structural scan winner confirmed by the dialect sniff
    Structural,
    /// Structural scan winner the sniff rejected, kept for its high score
    Heuristic,
    /// Column count from a strict reader matched against the first line
    ReaderFallback,
    /// Supplied by the caller, detection skipped or overridden
    UserOverride,
}

impl std::fmt::Display for DetectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Structural => "structural",
            Self::Heuristic => "heuristic",
            Self::ReaderFallback => "reader fallback",
            Self::UserOverride => "user override",
        };
        f.write_str(name)
    }
}

/// Result of a detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub delimiter: String,
    /// Canonical `encoding_rs` name, e.g. `UTF-8` or `windows-1252`
    pub encoding: String,
    /// Informal score in `[0, 1]`. Not a probability.
    pub confidence: f64,
    pub strategy: DetectionStrategy,
}

/// Detects encoding, then delimiter.
///
/// # Errors
///
/// Returns [`DetectionError`] (wrapped) if the file cannot be read, appears
/// empty, no encoding decodes it, or no delimiter pattern is found.
pub fn detect(path: &Path, config: &ProfilerConfig) -> Result<Detection> {
    let perf = &config.performance;
    let encoding = detect_encoding(path, &config.encoding, perf.encoding_sample_size)?;
    let guess = detect_delimiter(
        path,
        encoding,
        &config.delimiter_detection,
        perf.delimiter_sample_size,
    )?;

    let detection = Detection {
        delimiter: guess.delimiter.to_string(),
        encoding: encoding.name().to_owned(),
        confidence: guess.confidence(),
        strategy: guess.strategy,
    };

    tracing::info!(
        "Detected delimiter {:?} and encoding {} for {} ({}, confidence {:.2})",
        detection.delimiter,
        detection.encoding,
        path.display(),
        detection.strategy,
        detection.confidence
    );

    Ok(detection)
}

/// Reads at most `limit` bytes from the start of `path`.
///
/// The flag is true when the file may continue past the sample.
pub(crate) fn read_sample(
    path: &Path,
    limit: usize,
) -> std::result::Result<(Vec<u8>, bool), DetectionError> {
    let io_err = |source| DetectionError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = std::fs::File::open(path).map_err(io_err)?;
    let mut sample = Vec::with_capacity(limit.min(64 * 1024));
    file.take(limit as u64)
        .read_to_end(&mut sample)
        .map_err(io_err)?;

    let truncated = sample.len() >= limit;
    Ok((sample, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_sample_flags_truncation() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sample.csv");
        std::fs::write(&path, "a,b\n1,2\n")?;

        let (bytes, truncated) = read_sample(&path, 4)?;
        assert_eq!(bytes, b"a,b\n");
        assert!(truncated, "sample stopped at the limit");

        let (bytes, truncated) = read_sample(&path, 1024)?;
        assert_eq!(bytes.len(), 8);
        assert!(!truncated, "whole file fits in the sample");
        Ok(())
    }

    #[test]
    fn test_detect_reports_canonical_encoding_name() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "id,name,age\n1,Alice,25\n2,Bob,30\n")?;

        let found = detect(&path, &ProfilerConfig::default())?;
        assert_eq!(found.delimiter, ",");
        assert_eq!(found.encoding, "UTF-8");
        assert_eq!(found.strategy, DetectionStrategy::Structural);
        assert!((0.0..=1.0).contains(&found.confidence));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = detect(Path::new("/no/such/file.csv"), &ProfilerConfig::default());
        assert!(matches!(
            result,
            Err(crate::error::ProfilerError::Detection(DetectionError::Io { .. }))
        ));
    }
}
