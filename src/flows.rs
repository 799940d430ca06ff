//! End-to-end analysis flow: detect, validate, dispatch, summarize.

use crate::aggregate::{ResultAggregator, RunSummary};
use crate::config::ProfilerConfig;
use crate::detection::{self, Detection, DetectionStrategy};
use crate::error::{ProfilerError, Result, ResultExt as _};
use crate::ingest::{BoundedIngestor, IngestStrategy};
use crate::pipeline::request::{validate_delimiter, validate_source_file};
use crate::pipeline::{
    AnalysisRequest, EngineOrchestrator, ExecutionResult, IngestLimits, PipelineState, Stage,
};
use crate::registry::EnvironmentRegistry;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Caller-supplied parameters for one run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub source: PathBuf,
    /// Skips delimiter detection when set
    pub delimiter_override: Option<String>,
    /// Defaults to `<source parent>/<source stem>`
    pub output_dir: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub memory_limit_bytes: Option<u64>,
    /// Engine ids in any order; empty or `all` selects every engine
    pub engines: Vec<String>,
    /// Load the file once before dispatch to prove it parses
    pub validate: bool,
}

/// Shape of the validation load. The frame itself is dropped.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ValidationLoad {
    pub rows: usize,
    pub columns: usize,
    pub chunks: usize,
    pub strategy: IngestStrategy,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub request: AnalysisRequest,
    pub detection: Detection,
    pub validation: Option<ValidationLoad>,
    pub results: Vec<ExecutionResult>,
    pub summary: RunSummary,
}

impl AnalysisReport {
    pub fn all_succeeded(&self) -> bool {
        self.summary.failed == 0 && !self.results.is_empty()
    }
}

/// Runs the whole analysis for `options.source`.
///
/// # Errors
///
/// Detection, parameter and validation-load errors abort before any engine
/// runs. Engine failures never abort the flow; they are reported in
/// [`AnalysisReport::results`].
pub fn analyze_flow(
    config: &ProfilerConfig,
    options: AnalysisOptions,
    interrupt: Arc<AtomicBool>,
) -> Result<AnalysisReport> {
    let source = options.source;
    validate_source_file(&source, config.performance.max_file_size_mb)?;

    let registry = EnvironmentRegistry::from_config(config)?;
    let engines = registry.select(options.engines.as_slice())?;
    let mut state = PipelineState::new(engines);

    state.transition(Stage::Detecting)?;
    let detection = detect_with_override(&source, config, options.delimiter_override.as_deref())?;

    let output_dir = match options.output_dir {
        Some(dir) => dir,
        None => default_output_dir(&source)?,
    };
    let limits = IngestLimits {
        chunk_size: options.chunk_size.unwrap_or(config.performance.chunk_size),
        memory_ceiling: options
            .memory_limit_bytes
            .unwrap_or_else(|| config.memory_ceiling_bytes()),
    };
    let request = AnalysisRequest::new(
        source,
        &detection.delimiter,
        &detection.encoding,
        output_dir,
        limits,
        &config.validation,
    )?;

    if config.artifacts.copy_source {
        copy_source(request.source(), request.output_dir())?;
    }

    let validation = if options.validate {
        let table = BoundedIngestor::new(&config.performance).load(&request)?;
        tracing::info!(
            "Validation load read {} rows x {} columns ({:?}, {} chunk(s))",
            table.rows,
            table.columns,
            table.strategy,
            table.chunks
        );
        Some(ValidationLoad {
            rows: table.rows,
            columns: table.columns,
            chunks: table.chunks,
            strategy: table.strategy,
        })
    } else {
        None
    };

    state.transition(Stage::Ready)?;
    let orchestrator =
        EngineOrchestrator::new(&registry, &config.artifacts).with_interrupt(interrupt);
    orchestrator.execute(&mut state, &request)?;

    let summary = ResultAggregator::new(&config.artifacts).summarize(
        state.results(),
        request.output_dir(),
        request.source(),
    );
    state.transition(Stage::Done)?;
    tracing::info!(
        "Analysis workflow completed: {}/{} engines successful",
        summary.succeeded,
        state.results().len()
    );

    Ok(AnalysisReport {
        request,
        detection,
        validation,
        results: state.into_results(),
        summary,
    })
}

/// Detection honouring a user delimiter. The override replaces delimiter
/// detection entirely; the encoding is still detected and falls back to
/// UTF-8 if that fails.
///
/// # Errors
///
/// Returns [`ProfilerError::InvalidParameter`] for a malformed override, or
/// the detection error when no override was given.
pub fn detect_with_override(
    path: &Path,
    config: &ProfilerConfig,
    delimiter_override: Option<&str>,
) -> Result<Detection> {
    let Some(delimiter) = delimiter_override else {
        return detection::detect(path, config);
    };
    validate_delimiter(delimiter)?;

    let encoding = match detection::detect_encoding(
        path,
        &config.encoding,
        config.performance.encoding_sample_size,
    ) {
        Ok(enc) => enc.name().to_owned(),
        Err(e) => {
            tracing::warn!("Encoding detection failed ({e}), assuming UTF-8");
            "UTF-8".to_owned()
        }
    };

    tracing::info!("Using delimiter {delimiter:?} supplied by the user");
    Ok(Detection {
        delimiter: delimiter.to_owned(),
        encoding,
        confidence: 1.0,
        strategy: DetectionStrategy::UserOverride,
    })
}

/// `<parent>/<stem>` next to the source file.
///
/// # Errors
///
/// Fails if the path has no file stem.
pub fn default_output_dir(source: &Path) -> Result<PathBuf> {
    let stem = source.file_stem().ok_or_else(|| {
        ProfilerError::InvalidParameter(format!("{} has no file name", source.display()))
    })?;
    let parent = source.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(stem))
}

fn copy_source(source: &Path, output_dir: &Path) -> Result<()> {
    let Some(name) = source.file_name() else {
        return Ok(());
    };
    let target = output_dir.join(name);
    if target == source {
        return Ok(());
    }
    std::fs::copy(source, &target)
        .with_context(|| format!("Failed to copy source into {}", output_dir.display()))?;
    tracing::debug!("Copied {} to {}", source.display(), target.display());
    Ok(())
}
