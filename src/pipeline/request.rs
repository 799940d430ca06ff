//! Parameters of a single analysis run.
//!
//! [`AnalysisRequest`] is built once, after detection, through
//! [`AnalysisRequest::new`], which validates every field. It cannot be changed
//! afterwards.

use crate::config::ValidationSettings;
use crate::error::{IngestionError, ProfilerError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

const MAX_DELIMITER_CHARS: usize = 5;
const FORBIDDEN_DELIMITER_CHARS: [char; 3] = ['\n', '\r', '\0'];
const WRITE_PROBE_NAME: &str = ".profilekit_write_probe";

/// Row batching and memory ceiling for validation loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestLimits {
    pub chunk_size: usize,
    pub memory_ceiling: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    source: PathBuf,
    delimiter: String,
    encoding: String,
    output_dir: PathBuf,
    limits: IngestLimits,
}

impl AnalysisRequest {
    /// Validates and assembles a request. The output directory is created if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::InvalidParameter`] for a bad delimiter, chunk
    /// size or memory ceiling, or an unwritable output directory.
    pub fn new(
        source: PathBuf,
        delimiter: &str,
        encoding: &str,
        output_dir: PathBuf,
        limits: IngestLimits,
        validation: &ValidationSettings,
    ) -> Result<Self> {
        validate_delimiter(delimiter)?;
        validate_chunk_size(limits.chunk_size, validation.max_chunk_size)?;
        validate_memory_ceiling(limits.memory_ceiling, validation.max_memory_limit_gb)?;
        validate_output_dir(&output_dir)?;

        if encoding.trim().is_empty() {
            return Err(invalid("Encoding cannot be empty"));
        }

        Ok(Self {
            source,
            delimiter: delimiter.to_owned(),
            encoding: encoding.to_owned(),
            output_dir,
            limits,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn chunk_size(&self) -> usize {
        self.limits.chunk_size
    }

    pub fn memory_ceiling(&self) -> u64 {
        self.limits.memory_ceiling
    }

    pub fn limits(&self) -> IngestLimits {
        self.limits
    }
}

fn invalid(msg: impl Into<String>) -> ProfilerError {
    ProfilerError::InvalidParameter(msg.into())
}

/// Delimiters are 1 to 5 characters and never contain line breaks or NUL.
///
/// # Errors
///
/// Returns [`ProfilerError::InvalidParameter`] describing the problem.
pub fn validate_delimiter(delimiter: &str) -> Result<()> {
    if delimiter.is_empty() {
        return Err(invalid("Delimiter cannot be empty"));
    }
    if delimiter.chars().count() > MAX_DELIMITER_CHARS {
        return Err(invalid(format!(
            "Delimiter is too long (max {MAX_DELIMITER_CHARS} characters)"
        )));
    }
    if delimiter.contains(FORBIDDEN_DELIMITER_CHARS) {
        return Err(invalid("Delimiter contains line break or NUL characters"));
    }
    Ok(())
}

/// # Errors
///
/// Rejects zero and anything above `max`.
pub fn validate_chunk_size(chunk_size: usize, max: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(invalid("Chunk size must be positive"));
    }
    if chunk_size > max {
        return Err(invalid(format!("Chunk size too large (max {max} rows)")));
    }
    Ok(())
}

/// # Errors
///
/// Rejects zero and anything above `max_gb`.
pub fn validate_memory_ceiling(bytes: u64, max_gb: f64) -> Result<()> {
    if bytes == 0 {
        return Err(invalid("Memory limit must be positive"));
    }
    if bytes > crate::utils::gb_to_bytes(max_gb) {
        return Err(invalid(format!("Memory limit too large (max {max_gb}GB)")));
    }
    Ok(())
}

/// Creates the directory if needed and proves it is writable.
///
/// # Errors
///
/// Fails if the directory cannot be created or a probe file cannot be written.
pub fn validate_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        invalid(format!(
            "Cannot create output directory {}: {e}",
            dir.display()
        ))
    })?;

    let probe = dir.join(WRITE_PROBE_NAME);
    std::fs::write(&probe, b"").map_err(|e| {
        invalid(format!(
            "No write permission for output directory {}: {e}",
            dir.display()
        ))
    })?;
    if let Err(e) = std::fs::remove_file(&probe) {
        tracing::warn!("Could not remove {}: {e}", probe.display());
    }
    Ok(())
}

/// Checks the source exists, is a regular readable file and is within the
/// size limit. Returns its size in bytes.
///
/// # Errors
///
/// [`IngestionError::Missing`] if the path does not exist, otherwise
/// [`ProfilerError::InvalidParameter`].
pub fn validate_source_file(path: &Path, max_file_size_mb: u64) -> Result<u64> {
    if !path.exists() {
        return Err(IngestionError::Missing {
            path: path.to_path_buf(),
        }
        .into());
    }

    let meta = std::fs::metadata(path)?;
    if !meta.is_file() {
        return Err(invalid(format!("Path is not a file: {}", path.display())));
    }

    let size = meta.len();
    let limit = crate::utils::mb_to_bytes(max_file_size_mb);
    if size > limit {
        return Err(invalid(format!(
            "File size ({}) exceeds maximum limit ({max_file_size_mb} MB)",
            crate::utils::format_file_size(size)
        )));
    }

    std::fs::File::open(path)
        .map_err(|e| invalid(format!("No read permission for {}: {e}", path.display())))?;

    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> IngestLimits {
        IngestLimits {
            chunk_size: 10_000,
            memory_ceiling: 1024 * 1024 * 1024,
        }
    }

    #[test]
    fn test_delimiter_rules() {
        assert!(validate_delimiter(",").is_ok());
        assert!(validate_delimiter("||").is_ok());
        assert!(validate_delimiter("").is_err());
        assert!(validate_delimiter("abcdef").is_err());
        assert!(validate_delimiter(",\n").is_err());
        assert!(validate_delimiter("\0").is_err());
    }

    #[test]
    fn test_limits() {
        assert!(validate_chunk_size(0, 100).is_err());
        assert!(validate_chunk_size(101, 100).is_err());
        assert!(validate_chunk_size(100, 100).is_ok());

        assert!(validate_memory_ceiling(0, 32.0).is_err());
        assert!(validate_memory_ceiling(crate::utils::gb_to_bytes(33.0), 32.0).is_err());
        assert!(validate_memory_ceiling(crate::utils::gb_to_bytes(1.0), 32.0).is_ok());
    }

    #[test]
    fn test_new_creates_output_dir() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let out = tmp.path().join("reports").join("run");
        let request = AnalysisRequest::new(
            tmp.path().join("data.csv"),
            ";",
            "UTF-8",
            out.clone(),
            limits(),
            &ValidationSettings::default(),
        )?;

        assert!(out.is_dir());
        assert!(!out.join(WRITE_PROBE_NAME).exists(), "probe cleaned up");
        assert_eq!(request.delimiter(), ";");
        assert_eq!(request.output_dir(), out.as_path());
        Ok(())
    }

    #[test]
    fn test_new_rejects_bad_delimiter() {
        let tmp = tempfile::tempdir().expect("Failed to create temp dir");
        let result = AnalysisRequest::new(
            tmp.path().join("data.csv"),
            "",
            "UTF-8",
            tmp.path().to_path_buf(),
            limits(),
            &ValidationSettings::default(),
        );
        assert!(matches!(result, Err(ProfilerError::InvalidParameter(_))));
    }

    #[test]
    fn test_source_file_checks() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let missing = validate_source_file(&tmp.path().join("nope.csv"), 500);
        assert!(matches!(
            missing,
            Err(ProfilerError::Ingestion(IngestionError::Missing { .. }))
        ));

        assert!(validate_source_file(tmp.path(), 500).is_err(), "directory rejected");

        let path = tmp.path().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n")?;
        assert_eq!(validate_source_file(&path, 500)?, 8);

        std::fs::write(&path, vec![b'x'; 2 * 1024 * 1024])?;
        assert!(validate_source_file(&path, 1).is_err(), "over size limit");
        Ok(())
    }
}
