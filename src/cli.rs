use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use profilekit::config::{ProfilerConfig, default_config_path};
use profilekit::detection;
use profilekit::flows::{self, AnalysisOptions};
use profilekit::ingest::BoundedIngestor;
use profilekit::pipeline::request::validate_source_file;
use profilekit::registry::EnvironmentRegistry;
use profilekit::utils::{format_file_size, gb_to_bytes};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

#[derive(Parser)]
#[command(
    name = "profilekit",
    about = "Profile delimited data files with isolated analysis engines"
)]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(long, global = true, env = "PROFILEKIT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect the dialect and run the selected engines
    Run {
        /// Delimited text file to profile
        file: PathBuf,

        /// Field delimiter. Skips delimiter detection.
        #[arg(short, long)]
        delimiter: Option<String>,

        /// Output directory. Defaults to a folder named after the file, next to it.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Comma-separated engine ids, or "all"
        #[arg(short, long, value_delimiter = ',', default_value = "all")]
        engines: Vec<String>,

        /// Rows per batch for chunked reads
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Memory ceiling for the validation load, in GB
        #[arg(long)]
        memory_limit_gb: Option<f64>,

        /// Load the file once before running engines
        #[arg(long)]
        validate: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the detected delimiter and encoding
    Detect {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },
    /// Load a file under the memory ceiling and print its shape
    Ingest {
        file: PathBuf,

        /// Field delimiter. Detected when omitted.
        #[arg(short, long)]
        delimiter: Option<String>,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        memory_limit_gb: Option<f64>,
    },
    /// List configured environments and engines
    Engines,
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Destination. Defaults to the per-user config location.
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run_command(
    command: Commands,
    config: &ProfilerConfig,
    interrupt: Arc<AtomicBool>,
) -> Result<ExitCode> {
    match command {
        Commands::Run {
            file,
            delimiter,
            output_dir,
            engines,
            chunk_size,
            memory_limit_gb,
            validate,
            json,
        } => {
            let options = AnalysisOptions {
                source: file,
                delimiter_override: delimiter,
                output_dir,
                chunk_size,
                memory_limit_bytes: memory_limit_gb.map(gb_to_bytes),
                engines,
                validate,
            };
            handle_run(config, options, json, interrupt)
        }
        Commands::Detect { file, json } => handle_detect(config, &file, json),
        Commands::Ingest {
            file,
            delimiter,
            chunk_size,
            memory_limit_gb,
        } => handle_ingest(config, &file, delimiter, chunk_size, memory_limit_gb),
        Commands::Engines => handle_engines(config),
        Commands::Config {
            action: ConfigAction::Init { path, force },
        } => handle_config_init(path, force),
    }
}

fn handle_run(
    config: &ProfilerConfig,
    options: AnalysisOptions,
    json: bool,
    interrupt: Arc<AtomicBool>,
) -> Result<ExitCode> {
    println!("Analyzing {}...", options.source.display());
    let report = flows::analyze_flow(config, options, interrupt).context("Analysis failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let d = &report.detection;
        println!(
            "Delimiter {:?}, encoding {} ({}, confidence {:.2})",
            d.delimiter, d.encoding, d.strategy, d.confidence
        );
        if let Some(v) = &report.validation {
            println!("Validated {} rows x {} columns", v.rows, v.columns);
        }
        println!();
        print!("{}", report.summary.render());
    }

    Ok(if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_detect(config: &ProfilerConfig, file: &Path, json: bool) -> Result<ExitCode> {
    validate_source_file(file, config.performance.max_file_size_mb)?;
    let detection = detection::detect(file, config)
        .with_context(|| format!("Could not detect the dialect of {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detection)?);
    } else {
        println!("Delimiter:  {:?}", detection.delimiter);
        println!("Encoding:   {}", detection.encoding);
        println!("Confidence: {:.2}", detection.confidence);
        println!("Strategy:   {}", detection.strategy);
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_ingest(
    config: &ProfilerConfig,
    file: &Path,
    delimiter: Option<String>,
    chunk_size: Option<usize>,
    memory_limit_gb: Option<f64>,
) -> Result<ExitCode> {
    let size = validate_source_file(file, config.performance.max_file_size_mb)?;
    let detection = flows::detect_with_override(file, config, delimiter.as_deref())?;

    let chunk_size = chunk_size.unwrap_or(config.performance.chunk_size);
    let ceiling = memory_limit_gb.map_or_else(|| config.memory_ceiling_bytes(), gb_to_bytes);

    println!(
        "Loading {} ({}) with delimiter {:?}, encoding {}",
        file.display(),
        format_file_size(size),
        detection.delimiter,
        detection.encoding
    );
    let table = BoundedIngestor::new(&config.performance).load_path(
        file,
        &detection.delimiter,
        &detection.encoding,
        chunk_size,
        ceiling,
    )?;

    println!("Rows:     {}", table.rows);
    println!("Columns:  {}", table.columns);
    println!("Strategy: {:?} ({} chunk(s))", table.strategy, table.chunks);
    Ok(ExitCode::SUCCESS)
}

fn handle_engines(config: &ProfilerConfig) -> Result<ExitCode> {
    let registry = EnvironmentRegistry::from_config(config)?;

    println!("Environments:");
    for env in registry.environments() {
        println!("  {:<12} {:<24} {}", env.id, env.name, env.launch_prefix.join(" "));
    }

    println!();
    println!("Engines (root: {}):", registry.engines_root().display());
    for engine in registry.engines() {
        let script = registry.script_path(engine);
        let marker = if engine.interactive { " [interactive]" } else { "" };
        let missing = if script.is_file() { "" } else { " (script missing)" };
        println!(
            "  {:<10} {:<22} env={:<10} {}{missing}{marker}",
            engine.id,
            engine.display_name,
            engine.environment,
            script.display()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_config_init(path: Option<PathBuf>, force: bool) -> Result<ExitCode> {
    let Some(path) = path.or_else(default_config_path) else {
        bail!("No config directory on this platform; pass a path");
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ProfilerConfig::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(ExitCode::SUCCESS)
}
