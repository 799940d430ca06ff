//! Runtime configuration.
//!
//! A single [`ProfilerConfig`] is built at process start and passed by reference
//! into every component. It is read from JSON, falls back to built-in defaults
//! that mirror the stock engine layout, and accepts a handful of
//! `PROFILEKIT_*` environment overrides.

use crate::error::{ProfilerError, Result, ResultExt as _};
use crate::registry::{ArgConvention, EngineDescriptor, EnvironmentDescriptor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const APP_DIR_NAME: &str = "profilekit";

const ENV_CHUNK_SIZE: &str = "PROFILEKIT_CHUNK_SIZE";
const ENV_MEMORY_LIMIT_GB: &str = "PROFILEKIT_MEMORY_LIMIT_GB";
const ENV_SMALL_FILE_THRESHOLD_MB: &str = "PROFILEKIT_SMALL_FILE_THRESHOLD_MB";
const ENV_ENGINES_ROOT: &str = "PROFILEKIT_ENGINES_ROOT";
const ENV_LOG_LEVEL: &str = "PROFILEKIT_LOG_LEVEL";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Files smaller than this are loaded in one pass without memory sampling
    pub small_file_threshold_mb: u64,
    /// Rows per batch for chunked ingestion
    pub chunk_size: usize,
    /// Default memory ceiling for chunked ingestion
    pub memory_limit_gb: f64,
    /// Source files larger than this are rejected up front
    pub max_file_size_mb: u64,
    /// Bytes read for encoding detection
    pub encoding_sample_size: usize,
    /// Bytes read for delimiter detection
    pub delimiter_sample_size: usize,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            small_file_threshold_mb: 50,
            chunk_size: 10_000,
            memory_limit_gb: 1.0,
            max_file_size_mb: 500,
            encoding_sample_size: 8192,
            delimiter_sample_size: 16_384,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ValidationSettings {
    pub max_chunk_size: usize,
    pub max_memory_limit_gb: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_chunk_size: 100_000,
            max_memory_limit_gb: 32.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DelimiterSettings {
    /// Leading non-blank lines scored per candidate
    pub sample_lines: usize,
    /// Minimum share of lines agreeing on the modal count
    pub min_consistency: f64,
    /// Heuristic score above which an unconfirmed winner is still accepted
    pub confidence_threshold: f64,
    /// Delimiters that receive `canonical_weight`
    pub canonical_delimiters: Vec<String>,
    pub canonical_weight: f64,
    /// Delimiters tried by the reader fallback
    pub common_delimiters: Vec<String>,
    /// Characters handed to the dialect sniff
    pub sniff_sample_chars: usize,
    /// Rows parsed by the reader fallback
    pub fallback_rows: usize,
}

impl Default for DelimiterSettings {
    fn default() -> Self {
        Self {
            sample_lines: 20,
            min_consistency: 0.8,
            confidence_threshold: 2.0,
            canonical_delimiters: [",", ";", "\t", "|"].map(str::to_owned).to_vec(),
            canonical_weight: 1.2,
            common_delimiters: [",", ";", "\t", "|", ":", " "].map(str::to_owned).to_vec(),
            sniff_sample_chars: 1024,
            fallback_rows: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EncodingSettings {
    pub use_statistical_guesser: bool,
    pub fallback_encodings: Vec<String>,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            use_statistical_guesser: true,
            fallback_encodings: ["utf-8", "utf-8-sig", "latin1", "iso-8859-1", "cp1252", "ascii"]
                .map(str::to_owned)
                .to_vec(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ArtifactSettings {
    /// File written by the interactive engine and consumed by later engines
    pub handoff_file: String,
    /// Extensions of top-level report files listed in the summary
    pub report_extensions: Vec<String>,
    /// Subdirectories holding batched visualization output
    pub visualization_dirs: Vec<String>,
    /// Copy the source file into the output directory before dispatch
    pub copy_source: bool,
    /// Maximum characters of error text shown per failed engine
    pub error_excerpt_chars: usize,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            handoff_file: "modified_dataset.csv".to_owned(),
            report_extensions: ["csv", "txt", "html", "json"].map(str::to_owned).to_vec(),
            visualization_dirs: ["kde_plots", "box_plots", "qq_plots", "bar_charts", "pie_charts"]
                .map(str::to_owned)
                .to_vec(),
            copy_source: true,
            error_excerpt_chars: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// Overrides the platform data directory for log files
    pub directory: Option<PathBuf>,
    pub file_output: bool,
    pub max_files: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            directory: None,
            file_output: true,
            max_files: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Base directory for relative engine script paths
    pub engines_root: PathBuf,
    pub environments: Vec<EnvironmentDescriptor>,
    pub engines: Vec<EngineDescriptor>,
    pub performance: PerformanceSettings,
    pub validation: ValidationSettings,
    pub delimiter_detection: DelimiterSettings,
    pub encoding: EncodingSettings,
    pub artifacts: ArtifactSettings,
    pub logging: LoggingSettings,
    /// `key = value` for each environment override applied by [`ProfilerConfig::load`]
    #[serde(skip)]
    env_overrides: Vec<String>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            engines_root: PathBuf::from("engines"),
            environments: default_environments(),
            engines: default_engines(),
            performance: PerformanceSettings::default(),
            validation: ValidationSettings::default(),
            delimiter_detection: DelimiterSettings::default(),
            encoding: EncodingSettings::default(),
            artifacts: ArtifactSettings::default(),
            logging: LoggingSettings::default(),
            env_overrides: Vec::new(),
        }
    }
}

fn conda_environment(id: &str, name: &str) -> EnvironmentDescriptor {
    EnvironmentDescriptor {
        id: id.to_owned(),
        name: name.to_owned(),
        launch_prefix: ["conda", "run", "--no-capture-output", "-n", name, "python"]
            .map(str::to_owned)
            .to_vec(),
    }
}

fn default_environments() -> Vec<EnvironmentDescriptor> {
    vec![
        conda_environment("main", "csv-profiler-main"),
        conda_environment("profiling", "csv-profiler-profiling"),
        conda_environment("dataprep", "csv-profiler-dataprep"),
    ]
}

fn default_engines() -> Vec<EngineDescriptor> {
    vec![
        EngineDescriptor {
            id: "main".to_owned(),
            display_name: "Statistical analysis".to_owned(),
            environment: "main".to_owned(),
            script: PathBuf::from("main/analyzer.py"),
            args: ArgConvention::PathDelimiterOutput,
            interactive: true,
            description: "Core statistics, column exclusion and visualizations".to_owned(),
        },
        EngineDescriptor {
            id: "ydata".to_owned(),
            display_name: "YData profiling".to_owned(),
            environment: "profiling".to_owned(),
            script: PathBuf::from("profiling/ydata_report.py"),
            args: ArgConvention::PathDelimiterOutput,
            interactive: false,
            description: "YData profiling HTML report".to_owned(),
        },
        EngineDescriptor {
            id: "sweetviz".to_owned(),
            display_name: "SweetViz".to_owned(),
            environment: "profiling".to_owned(),
            script: PathBuf::from("profiling/sweetviz_report.py"),
            args: ArgConvention::PathDelimiterOutput,
            interactive: false,
            description: "SweetViz HTML report".to_owned(),
        },
        EngineDescriptor {
            id: "dataprep".to_owned(),
            display_name: "DataPrep EDA".to_owned(),
            environment: "dataprep".to_owned(),
            script: PathBuf::from("dataprep/dataprep_report.py"),
            args: ArgConvention::PathDelimiterOutput,
            interactive: false,
            description: "DataPrep EDA HTML report".to_owned(),
        },
    ]
}

/// Platform location of the default configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl ProfilerConfig {
    /// Loads configuration from `path`, or from the platform default location if it
    /// exists, or built-in defaults. Environment overrides are applied and the
    /// result is validated.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::Config`] if an explicit file is missing or
    /// malformed, or if validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file without overrides or validation.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&content)
    }

    /// # Errors
    ///
    /// Fails on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overrides applied by [`ProfilerConfig::load`], as `key = value`.
    ///
    /// Loading happens before logging is initialised, so the caller logs these.
    pub fn env_overrides(&self) -> &[String] {
        &self.env_overrides
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(chunk) = parse_positive::<usize>(lookup(ENV_CHUNK_SIZE)) {
            self.performance.chunk_size = chunk;
            self.env_overrides.push(format!("chunk_size = {chunk}"));
        }
        if let Some(limit) = parse_positive::<f64>(lookup(ENV_MEMORY_LIMIT_GB)) {
            self.performance.memory_limit_gb = limit;
            self.env_overrides.push(format!("memory_limit_gb = {limit}"));
        }
        if let Some(threshold) = parse_positive::<u64>(lookup(ENV_SMALL_FILE_THRESHOLD_MB)) {
            self.performance.small_file_threshold_mb = threshold;
            self.env_overrides
                .push(format!("small_file_threshold_mb = {threshold}"));
        }
        if let Some(root) = lookup(ENV_ENGINES_ROOT).filter(|r| !r.is_empty()) {
            self.env_overrides.push(format!("engines_root = {root}"));
            self.engines_root = PathBuf::from(root);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|l| !l.is_empty()) {
            self.logging.level = level.to_lowercase();
            self.env_overrides
                .push(format!("logging.level = {}", self.logging.level));
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let perf = &self.performance;
        if perf.chunk_size == 0 {
            return Err(config_err("performance.chunk_size must be positive"));
        }
        if !(perf.memory_limit_gb > 0.0) {
            return Err(config_err("performance.memory_limit_gb must be positive"));
        }
        if perf.encoding_sample_size == 0 || perf.delimiter_sample_size == 0 {
            return Err(config_err("performance sample sizes must be positive"));
        }
        if self.validation.max_chunk_size == 0 {
            return Err(config_err("validation.max_chunk_size must be positive"));
        }
        if !(self.validation.max_memory_limit_gb > 0.0) {
            return Err(config_err("validation.max_memory_limit_gb must be positive"));
        }

        let delim = &self.delimiter_detection;
        if !(0.0..=1.0).contains(&delim.min_consistency) {
            return Err(config_err(
                "delimiter_detection.min_consistency must be between 0 and 1",
            ));
        }
        if delim.sample_lines < 2 {
            return Err(config_err("delimiter_detection.sample_lines must be at least 2"));
        }
        if delim.canonical_weight <= 0.0 {
            return Err(config_err("delimiter_detection.canonical_weight must be positive"));
        }

        if self.encoding.fallback_encodings.is_empty() {
            return Err(config_err("encoding.fallback_encodings must not be empty"));
        }
        if self.artifacts.handoff_file.trim().is_empty() {
            return Err(config_err("artifacts.handoff_file must not be empty"));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(config_err(&format!(
                "logging.level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Default memory ceiling in bytes.
    pub fn memory_ceiling_bytes(&self) -> u64 {
        crate::utils::gb_to_bytes(self.performance.memory_limit_gb)
    }
}

fn config_err(msg: &str) -> ProfilerError {
    ProfilerError::Config(msg.to_owned())
}

fn parse_positive<T: std::str::FromStr + PartialOrd + Default>(value: Option<String>) -> Option<T> {
    value
        .and_then(|value| value.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProfilerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engines.len(), 4);
        assert_eq!(config.engines.iter().filter(|e| e.interactive).count(), 1);
        assert_eq!(config.artifacts.handoff_file, "modified_dataset.csv");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ProfilerConfig::from_json(r#"{"performance": {"chunk_size": 500}}"#)
            .expect("partial config should parse");
        assert_eq!(config.performance.chunk_size, 500);
        assert_eq!(config.performance.small_file_threshold_mb, 50);
        assert_eq!(config.environments.len(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ProfilerConfig::default();
        config.performance.chunk_size = 0;
        assert!(matches!(config.validate(), Err(ProfilerError::Config(_))));

        let mut config = ProfilerConfig::default();
        config.delimiter_detection.min_consistency = 1.5;
        assert!(config.validate().is_err());

        let mut config = ProfilerConfig::default();
        config.logging.level = "verbose".to_owned();
        assert!(config.validate().is_err());

        let mut config = ProfilerConfig::default();
        config.performance.memory_limit_gb = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = ProfilerConfig::default();
        config.performance.chunk_size = 2500;
        config.save(&path)?;

        let loaded = ProfilerConfig::load(Some(&path))?;
        assert_eq!(loaded.performance.chunk_size, 2500);
        assert_eq!(loaded.engines.len(), config.engines.len());
        Ok(())
    }

    #[test]
    fn test_env_overrides_are_recorded() {
        let mut config = ProfilerConfig::default();
        config.apply_overrides_from(|key| match key {
            ENV_CHUNK_SIZE => Some("2500".to_owned()),
            ENV_MEMORY_LIMIT_GB => Some("-1".to_owned()),
            ENV_LOG_LEVEL => Some("DEBUG".to_owned()),
            _ => None,
        });

        assert_eq!(config.performance.chunk_size, 2500);
        assert_eq!(config.logging.level, "debug");
        assert!(config.performance.memory_limit_gb > 0.0, "non-positive value ignored");
        assert_eq!(
            config.env_overrides(),
            ["chunk_size = 2500", "logging.level = debug"]
        );
        assert!(ProfilerConfig::default().env_overrides().is_empty());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ProfilerConfig::load(Some(Path::new("/definitely/not/here.json")));
        assert!(result.is_err());
    }
}
