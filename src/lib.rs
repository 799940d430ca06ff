//! # profilekit - delimited-file profiling orchestrator
//!
//! profilekit works out how a delimited text file is encoded and split, proves
//! it can be loaded under a memory ceiling, and then runs a fixed sequence of
//! analysis engines, each inside its own isolated runtime. Engines share
//! nothing but the output directory.
//!
//! ## Quick Start
//!
//! ```no_run
//! use profilekit::config::ProfilerConfig;
//! use profilekit::flows::{analyze_flow, AnalysisOptions};
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! let config = ProfilerConfig::load(None)?;
//! let options = AnalysisOptions {
//!     source: "data.csv".into(),
//!     validate: true,
//!     ..AnalysisOptions::default()
//! };
//! let report = analyze_flow(&config, options, Arc::new(AtomicBool::new(false)))?;
//! print!("{}", report.summary.render());
//! # Ok::<(), profilekit::error::ProfilerError>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`detection`]: encoding and delimiter inference
//! - [`ingest`]: bounded, chunk-aware loading into a `polars` frame
//! - [`registry`]: environments and engines from configuration
//! - [`pipeline`]: request validation, stage tracking and engine dispatch
//! - [`aggregate`]: end-of-run summary and artifact listing
//! - [`pool`]: fixed worker pool for independent post-processing tasks
//! - [`flows`]: the end-to-end run used by the CLI
//! - [`config`], [`logging`], [`error`], [`utils`]: ambient plumbing

#![warn(clippy::all, rust_2018_idioms)]

pub mod aggregate;
pub mod config;
pub mod detection;
pub mod error;
pub mod flows;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod utils;
