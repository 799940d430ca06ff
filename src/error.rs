//! Centralized error handling for profilekit.
//!
//! Errors are grouped by the stage that raises them:
//!
//! - [`DetectionError`]: encoding or delimiter could not be determined. Fatal to the run.
//! - [`IngestionError`]: a validation load failed (missing file, parse failure,
//!   memory ceiling). Fatal to that load; no partial table is ever returned.
//! - [`DispatchError`]: an engine could not be launched. Recorded against that
//!   engine only; sibling engines still run.
//! - [`ProfilerError::EngineExit`]: an engine exited nonzero. Recorded, never fatal.
//! - [`ProfilerError::Interrupted`]: the user cancelled; remaining engines are skipped.
//!
//! ```
//! use profilekit::error::{DetectionError, ProfilerError};
//! use std::path::PathBuf;
//!
//! let err = ProfilerError::from(DetectionError::Empty { path: PathBuf::from("a.csv") });
//! assert!(err.to_string().contains("appears empty"));
//! ```
//!
//! The [`ResultExt`] trait adds `.context()` to any result whose error converts
//! into [`ProfilerError`]:
//!
//! ```no_run
//! use profilekit::error::ResultExt as _;
//!
//! fn read_sample() -> profilekit::error::Result<String> {
//!     std::fs::read_to_string("data.csv").context("Failed to read sample")
//! }
//! ```

use std::fmt;
use std::path::PathBuf;

/// Encoding or delimiter inference failed.
#[derive(Debug)]
pub enum DetectionError {
    /// Fewer than two non-blank lines were found in the sample.
    Empty { path: PathBuf },

    /// No candidate character produced a consistent per-line pattern.
    NoConsistentPattern { path: PathBuf },

    /// Neither the guesser nor any fallback encoding decoded the sample.
    Encoding { path: PathBuf },

    /// The sample could not be read.
    Io { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { path } => write!(f, "{} appears empty", path.display()),
            Self::NoConsistentPattern { path } => write!(
                f,
                "no consistent delimiter pattern found in {}",
                path.display()
            ),
            Self::Encoding { path } => {
                write!(f, "unable to detect encoding for {}", path.display())
            }
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
        }
    }
}

/// A validation load failed. Loads are all-or-nothing.
#[derive(Debug)]
pub enum IngestionError {
    /// The source file does not exist.
    Missing { path: PathBuf },

    /// The parser rejected the file. Carries the dialect used to aid diagnosis.
    Parse {
        delimiter: String,
        encoding: String,
        message: String,
    },

    /// Process memory exceeded the configured ceiling after a batch was buffered.
    MemoryCeiling { used: u64, ceiling: u64 },

    /// Not a single batch was read.
    NoData { path: PathBuf },

    /// The tabular readers only accept single-byte separators.
    UnsupportedDelimiter(String),

    /// The encoding label is not known to the decoder.
    UnknownEncoding(String),
}

impl fmt::Display for IngestionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { path } => write!(f, "file not found: {}", path.display()),
            Self::Parse {
                delimiter,
                encoding,
                message,
            } => write!(
                f,
                "error parsing file (delimiter {delimiter:?}, encoding {encoding}): {message}"
            ),
            Self::MemoryCeiling { used, ceiling } => write!(
                f,
                "out of memory: usage {} exceeded ceiling {}",
                crate::utils::format_file_size(*used),
                crate::utils::format_file_size(*ceiling)
            ),
            Self::NoData { path } => write!(f, "no data loaded from {}", path.display()),
            Self::UnsupportedDelimiter(d) => {
                write!(f, "delimiter {d:?} is not a single-byte separator")
            }
            Self::UnknownEncoding(label) => write!(f, "unknown encoding: {label}"),
        }
    }
}

/// An engine could not be started at all.
#[derive(Debug)]
pub enum DispatchError {
    /// The engine names an environment the registry does not know.
    UnknownEnvironment { engine: String, environment: String },

    /// The engine's entry point does not exist on disk.
    MissingScript { engine: String, script: PathBuf },

    /// The environment has an empty launch prefix.
    EmptyLaunchPrefix { environment: String },

    /// Spawning the child process failed.
    Launch {
        engine: String,
        program: String,
        source: std::io::Error,
    },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEnvironment {
                engine,
                environment,
            } => write!(f, "engine {engine} uses unknown environment {environment}"),
            Self::MissingScript { engine, script } => {
                write!(f, "script for {engine} not found: {}", script.display())
            }
            Self::EmptyLaunchPrefix { environment } => {
                write!(f, "environment {environment} has an empty launch prefix")
            }
            Self::Launch {
                engine,
                program,
                source,
            } => write!(f, "failed to launch {engine} via {program}: {source}"),
        }
    }
}

/// Main error type for profilekit operations.
#[derive(Debug)]
pub enum ProfilerError {
    Detection(DetectionError),

    Ingestion(IngestionError),

    Dispatch(DispatchError),

    /// The engine ran and exited unsuccessfully. `code` is `None` when the
    /// process was terminated by a signal.
    EngineExit { engine: String, code: Option<i32> },

    /// Operation cancelled by the user
    Interrupted,

    /// Configuration errors
    Config(String),

    /// Caller-supplied parameter rejected by validation
    InvalidParameter(String),

    /// Pipeline stage machine was asked for an illegal transition
    InvalidTransition { from: String, to: String },

    Io(std::io::Error),

    /// Generic error with context
    Other(String),
}

impl fmt::Display for ProfilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detection(e) => write!(f, "Detection error: {e}"),
            Self::Ingestion(e) => write!(f, "Ingestion error: {e}"),
            Self::Dispatch(e) => write!(f, "Dispatch error: {e}"),
            Self::EngineExit {
                engine,
                code: Some(code),
            } => write!(f, "{engine} failed with exit code {code}"),
            Self::EngineExit { engine, code: None } => {
                write!(f, "{engine} was terminated by a signal")
            }
            Self::Interrupted => write!(f, "Interrupted by user"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "Invalid parameter: {msg}"),
            Self::InvalidTransition { from, to } => {
                write!(f, "Illegal pipeline transition {from} -> {to}")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ProfilerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e)
            | Self::Detection(DetectionError::Io { source: e, .. })
            | Self::Dispatch(DispatchError::Launch { source: e, .. }) => Some(e),
            _ => None,
        }
    }
}

impl From<DetectionError> for ProfilerError {
    fn from(err: DetectionError) -> Self {
        Self::Detection(err)
    }
}

impl From<IngestionError> for ProfilerError {
    fn from(err: IngestionError) -> Self {
        Self::Ingestion(err)
    }
}

impl From<DispatchError> for ProfilerError {
    fn from(err: DispatchError) -> Self {
        Self::Dispatch(err)
    }
}

impl From<std::io::Error> for ProfilerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ProfilerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for ProfilerError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Other(format!("Data processing error: {err}"))
    }
}

impl From<csv::Error> for ProfilerError {
    fn from(err: csv::Error) -> Self {
        Self::Other(format!("CSV error: {err}"))
    }
}

impl From<anyhow::Error> for ProfilerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Result type alias for profilekit operations.
pub type Result<T> = std::result::Result<T, ProfilerError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ProfilerError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: ProfilerError = e.into();
            ProfilerError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: ProfilerError = e.into();
            ProfilerError::Other(format!("{}: {}", f(), err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProfilerError::Config("chunk_size must be positive".to_owned());
        assert_eq!(
            err.to_string(),
            "Configuration error: chunk_size must be positive"
        );
    }

    #[test]
    fn test_detection_messages() {
        let empty = DetectionError::Empty {
            path: PathBuf::from("data.csv"),
        };
        assert!(empty.to_string().contains("appears empty"));

        let none = DetectionError::NoConsistentPattern {
            path: PathBuf::from("data.csv"),
        };
        assert!(none.to_string().contains("no consistent delimiter pattern"));
    }

    #[test]
    fn test_engine_exit_display() {
        let err = ProfilerError::EngineExit {
            engine: "ydata".to_owned(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "ydata failed with exit code 2");

        let killed = ProfilerError::EngineExit {
            engine: "ydata".to_owned(),
            code: None,
        };
        assert!(killed.to_string().contains("signal"));
    }

    #[test]
    fn test_parse_error_names_dialect() {
        let err = IngestionError::Parse {
            delimiter: ";".to_owned(),
            encoding: "windows-1252".to_owned(),
            message: "found record with 4 fields".to_owned(),
        };
        let text = err.to_string();
        assert!(text.contains("\";\""));
        assert!(text.contains("windows-1252"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file.txt",
        ));

        let result: Result<()> = result.context("Failed to read file");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read file")
        );
    }
}
