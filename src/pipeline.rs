//! Engine orchestration.
//!
//! A run dispatches the selected engines one at a time, each inside its own
//! isolated environment, and records one [`ExecutionResult`] per engine.
//!
//! # Example
//!
//! ```no_run
//! use profilekit::config::ProfilerConfig;
//! use profilekit::pipeline::EngineOrchestrator;
//! use profilekit::registry::EnvironmentRegistry;
//! use std::path::Path;
//!
//! let config = ProfilerConfig::default();
//! let registry = EnvironmentRegistry::from_config(&config)?;
//! let engines = registry.select(&["ydata", "sweetviz"])?;
//!
//! let orchestrator = EngineOrchestrator::new(&registry, &config.artifacts);
//! let results = orchestrator.run(&engines, Path::new("data.csv"), ",", Path::new("data"));
//! for r in &results {
//!     println!("{}: {}", r.engine, if r.success { "ok" } else { "failed" });
//! }
//! # Ok::<(), profilekit::error::ProfilerError>(())
//! ```
//!
//! # Stages
//!
//! Each run walks a [`PipelineState`] through
//! `Idle -> Detecting -> Ready -> Running(i) -> Completed(i) -> ... -> Summarizing -> Done`.
//! Illegal transitions are rejected rather than silently applied.

pub mod launcher;
pub mod orchestrator;
pub mod request;
pub mod state;

pub use launcher::{PrefixLauncher, ProcessLauncher};
pub use orchestrator::EngineOrchestrator;
pub use request::{AnalysisRequest, IngestLimits};
pub use state::{ExecutionResult, PipelineState, Stage};
