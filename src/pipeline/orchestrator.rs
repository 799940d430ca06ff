//! Sequential dispatch of engines into their isolated environments.
//!
//! Engines run strictly one after another with a blocking wait and no timeout.
//! They share nothing in memory: the only channel between them is the handoff
//! file the interactive engine may leave in the output directory. A failing
//! engine is recorded and the next one still runs. An interrupt stops the
//! queue but keeps the results gathered so far.

use super::launcher::{PrefixLauncher, ProcessLauncher};
use super::request::AnalysisRequest;
use super::state::{ExecutionResult, PipelineState, Stage};
use crate::config::ArtifactSettings;
use crate::error::{DispatchError, ProfilerError, Result};
use crate::registry::{EngineDescriptor, EnvironmentRegistry};
use chrono::Local;
use std::collections::VecDeque;
use std::io::{BufRead as _, BufReader, Write as _};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Lines of engine stderr kept for the error text.
const STDERR_TAIL_LINES: usize = 20;

struct EngineExit {
    status: ExitStatus,
    stderr_tail: Vec<String>,
}

pub struct EngineOrchestrator<'a> {
    registry: &'a EnvironmentRegistry,
    artifacts: &'a ArtifactSettings,
    launcher: Box<dyn ProcessLauncher>,
    interrupt: Arc<AtomicBool>,
}

impl<'a> EngineOrchestrator<'a> {
    pub fn new(registry: &'a EnvironmentRegistry, artifacts: &'a ArtifactSettings) -> Self {
        Self {
            registry,
            artifacts,
            launcher: Box::new(PrefixLauncher),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: impl ProcessLauncher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    /// Shares a cancellation flag, typically set from a Ctrl-C handler.
    #[must_use]
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Runs `engines` in order and returns one result per dispatched engine.
    pub fn run(
        &self,
        engines: &[EngineDescriptor],
        source: &Path,
        delimiter: &str,
        output_dir: &Path,
    ) -> Vec<ExecutionResult> {
        let mut state = PipelineState::new(engines.to_vec());
        let driven = state
            .transition(Stage::Detecting)
            .and_then(|()| state.transition(Stage::Ready))
            .and_then(|()| self.drive(&mut state, source, delimiter, output_dir));
        if let Err(e) = driven {
            tracing::error!("Pipeline stopped early: {e}");
        }
        state.into_results()
    }

    /// Drives a prepared state from `Ready` to `Summarizing`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::InvalidTransition`] if `state` is not `Ready`.
    /// Engine failures are recorded in the state, not returned.
    pub fn execute(&self, state: &mut PipelineState, request: &AnalysisRequest) -> Result<()> {
        self.drive(
            state,
            request.source(),
            request.delimiter(),
            request.output_dir(),
        )
    }

    fn drive(
        &self,
        state: &mut PipelineState,
        source: &Path,
        delimiter: &str,
        output_dir: &Path,
    ) -> Result<()> {
        if state.stage() != Stage::Ready {
            return Err(ProfilerError::InvalidTransition {
                from: state.stage().to_string(),
                to: Stage::Running(0).to_string(),
            });
        }

        let total = state.engines().len();
        for index in 0..total {
            if self.interrupted() {
                tracing::warn!("Interrupted, skipping {} remaining engine(s)", total - index);
                break;
            }

            state.transition(Stage::Running(index))?;
            let Some(engine) = state.engines().get(index).cloned() else {
                break;
            };
            tracing::info!("[{}/{total}] Running {}", index + 1, engine.display_name);

            self.note_handoff(state, output_dir);
            let result = self.dispatch(&engine, source, delimiter, output_dir, state.handoff());
            if result.success {
                tracing::info!(
                    "{} completed in {:.1}s",
                    engine.display_name,
                    result.duration.as_secs_f64()
                );
            } else {
                tracing::warn!(
                    "{} failed: {}",
                    engine.display_name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            state.record(result);
            self.note_handoff(state, output_dir);

            if self.interrupted() {
                tracing::warn!("Interrupted during {}, stopping", engine.display_name);
                break;
            }
            state.transition(Stage::Completed(index))?;
        }

        state.transition(Stage::Summarizing)
    }

    /// Records the handoff artifact in `state` once it shows up on disk.
    fn note_handoff(&self, state: &mut PipelineState, output_dir: &Path) {
        if state.handoff().is_some() {
            return;
        }
        let handoff = output_dir.join(&self.artifacts.handoff_file);
        if handoff.is_file() {
            tracing::info!("Handoff artifact available at {}", handoff.display());
            state.set_handoff(handoff);
        }
    }

    /// Input for `engine`: the recorded handoff artifact when the engine is not
    /// interactive and the file is still there, else the original source.
    pub fn effective_input(
        &self,
        engine: &EngineDescriptor,
        source: &Path,
        handoff: Option<&Path>,
    ) -> PathBuf {
        match handoff {
            Some(path) if !engine.interactive && path.is_file() => path.to_path_buf(),
            _ => source.to_path_buf(),
        }
    }

    fn dispatch(
        &self,
        engine: &EngineDescriptor,
        source: &Path,
        delimiter: &str,
        output_dir: &Path,
        handoff: Option<&Path>,
    ) -> ExecutionResult {
        let started_at = Local::now();
        let clock = Instant::now();
        let input = self.effective_input(engine, source, handoff);
        tracing::debug!("{} reads {}", engine.id, input.display());

        let outcome = self.spawn_and_wait(engine, &input, delimiter, output_dir);

        let (success, mut error, exit_code) = match outcome {
            Ok(exit) if exit.status.success() => (true, None, exit.status.code()),
            Ok(exit) => {
                let code = exit.status.code();
                let mut text = ProfilerError::EngineExit {
                    engine: engine.id.clone(),
                    code,
                }
                .to_string();
                if let Some(last) = exit.stderr_tail.iter().rev().find(|l| !l.trim().is_empty()) {
                    text.push_str(": ");
                    text.push_str(last.trim());
                }
                (false, Some(text), code)
            }
            Err(e) => (false, Some(e.to_string()), None),
        };

        if !success && self.interrupted() {
            error = Some(ProfilerError::Interrupted.to_string());
        }

        ExecutionResult {
            engine: engine.id.clone(),
            display_name: engine.display_name.clone(),
            success,
            error,
            exit_code,
            duration: clock.elapsed(),
            started_at,
            input,
        }
    }

    fn spawn_and_wait(
        &self,
        engine: &EngineDescriptor,
        input: &Path,
        delimiter: &str,
        output_dir: &Path,
    ) -> std::result::Result<EngineExit, DispatchError> {
        let environment = self.registry.environment(&engine.environment).ok_or_else(|| {
            DispatchError::UnknownEnvironment {
                engine: engine.id.clone(),
                environment: engine.environment.clone(),
            }
        })?;

        let script = self.registry.script_path(engine);
        if !script.is_file() {
            return Err(DispatchError::MissingScript {
                engine: engine.id.clone(),
                script,
            });
        }

        let mut command = self.launcher.command(environment)?;
        command
            .arg(&script)
            .args(engine.args.arguments(input, delimiter, output_dir));

        if engine.interactive {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::piped());
        }

        let program = command.get_program().to_string_lossy().into_owned();
        let launch_err = |source| DispatchError::Launch {
            engine: engine.id.clone(),
            program: program.clone(),
            source,
        };

        tracing::debug!("Spawning {program} for {} in {}", engine.id, environment.name);
        let mut child = command.spawn().map_err(launch_err)?;

        // stdout is inherited, so draining stderr to EOF cannot deadlock
        let stderr_tail = child
            .stderr
            .take()
            .map(|stderr| tee_tail(stderr, STDERR_TAIL_LINES))
            .unwrap_or_default();

        let status = child.wait().map_err(launch_err)?;
        Ok(EngineExit {
            status,
            stderr_tail,
        })
    }
}

/// Copies `reader` to this process's stderr line by line, keeping the last
/// `keep` lines.
fn tee_tail(reader: impl std::io::Read, keep: usize) -> Vec<String> {
    let mut reader = BufReader::new(reader);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(keep + 1);
    let mut line = Vec::new();
    let mut sink = std::io::stderr().lock();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if let Err(e) = sink.write_all(&line) {
                    tracing::trace!("Could not echo engine stderr: {e}");
                }
                tail.push_back(String::from_utf8_lossy(&line).trim_end().to_owned());
                if tail.len() > keep {
                    tail.pop_front();
                }
            }
            Err(e) => {
                tracing::debug!("Stopped reading engine stderr: {e}");
                break;
            }
        }
    }
    tail.into()
}
