//! Per-run pipeline state.
//!
//! ```text
//! Idle -> Detecting -> Ready -> Running(0) -> Completed(0) -> Running(1) -> ... -> Summarizing -> Done
//!                          \                 \                \
//!                           `----------------`----------------`--> Summarizing (no engines / interrupt)
//! ```

use crate::error::{ProfilerError, Result};
use crate::registry::EngineDescriptor;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "engine", rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Detecting,
    Ready,
    Running(usize),
    Completed(usize),
    Summarizing,
    Done,
}

impl Stage {
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Idle, Self::Detecting)
            | (Self::Detecting, Self::Ready)
            | (Self::Ready | Self::Running(_) | Self::Completed(_), Self::Summarizing)
            | (Self::Summarizing, Self::Done) => true,
            (Self::Ready, Self::Running(i)) => i == 0,
            (Self::Running(i), Self::Completed(j)) => i == j,
            (Self::Completed(i), Self::Running(j)) => j == i + 1,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Detecting => write!(f, "detecting"),
            Self::Ready => write!(f, "ready"),
            Self::Running(i) => write!(f, "running({i})"),
            Self::Completed(i) => write!(f, "completed({i})"),
            Self::Summarizing => write!(f, "summarizing"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Outcome of one dispatched engine.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub engine: String,
    pub display_name: String,
    pub success: bool,
    pub error: Option<String>,
    /// `None` for launch failures and signal termination
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub started_at: DateTime<Local>,
    /// Input path handed to the engine
    pub input: PathBuf,
}

#[derive(Debug)]
pub struct PipelineState {
    engines: Vec<EngineDescriptor>,
    position: usize,
    stage: Stage,
    results: Vec<ExecutionResult>,
    handoff: Option<PathBuf>,
}

impl PipelineState {
    pub fn new(engines: Vec<EngineDescriptor>) -> Self {
        Self {
            engines,
            position: 0,
            stage: Stage::Idle,
            results: Vec::new(),
            handoff: None,
        }
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::InvalidTransition`] if the move is not allowed
    /// from the current stage or points past the selected engines.
    pub fn transition(&mut self, next: Stage) -> Result<()> {
        let in_range = match next {
            Stage::Running(i) | Stage::Completed(i) => i < self.engines.len(),
            _ => true,
        };
        if !in_range || !self.stage.can_transition_to(next) {
            return Err(ProfilerError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }

        tracing::trace!("Pipeline {} -> {next}", self.stage);
        if let Stage::Running(i) = next {
            self.position = i;
        }
        self.stage = next;
        Ok(())
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn engines(&self) -> &[EngineDescriptor] {
        &self.engines
    }

    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn handoff(&self) -> Option<&Path> {
        self.handoff.as_deref()
    }

    pub(crate) fn record(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }

    pub(crate) fn set_handoff(&mut self, path: PathBuf) {
        self.handoff = Some(path);
    }

    pub fn into_results(self) -> Vec<ExecutionResult> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ArgConvention;

    fn engines(n: usize) -> Vec<EngineDescriptor> {
        (0..n)
            .map(|i| EngineDescriptor {
                id: format!("e{i}"),
                display_name: format!("Engine {i}"),
                environment: "env".to_owned(),
                script: PathBuf::from("e.sh"),
                args: ArgConvention::PathOutput,
                interactive: false,
                description: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_full_walk() -> Result<()> {
        let mut state = PipelineState::new(engines(2));
        for stage in [
            Stage::Detecting,
            Stage::Ready,
            Stage::Running(0),
            Stage::Completed(0),
            Stage::Running(1),
            Stage::Completed(1),
            Stage::Summarizing,
            Stage::Done,
        ] {
            state.transition(stage)?;
        }
        assert_eq!(state.stage(), Stage::Done);
        assert_eq!(state.position(), 1);
        Ok(())
    }

    #[test]
    fn test_illegal_moves() {
        let mut state = PipelineState::new(engines(1));
        assert!(state.transition(Stage::Running(0)).is_err(), "idle cannot run");

        state.transition(Stage::Detecting).expect("idle -> detecting");
        state.transition(Stage::Ready).expect("detecting -> ready");
        assert!(state.transition(Stage::Running(1)).is_err(), "must start at 0");
        state.transition(Stage::Running(0)).expect("ready -> running(0)");
        assert!(state.transition(Stage::Completed(1)).is_err(), "index mismatch");
        state.transition(Stage::Completed(0)).expect("running -> completed");
        assert!(
            state.transition(Stage::Running(1)).is_err(),
            "only one engine selected"
        );
        assert!(state.transition(Stage::Done).is_err(), "must summarize first");
    }

    #[test]
    fn test_interrupt_skips_to_summary() -> Result<()> {
        let mut state = PipelineState::new(engines(3));
        state.transition(Stage::Detecting)?;
        state.transition(Stage::Ready)?;
        state.transition(Stage::Running(0))?;
        state.transition(Stage::Summarizing)?;
        assert_eq!(state.stage(), Stage::Summarizing);
        Ok(())
    }

    #[test]
    fn test_transition_error_names_stages() {
        let mut state = PipelineState::new(engines(1));
        let err = state
            .transition(Stage::Done)
            .expect_err("idle cannot finish");
        assert_eq!(err.to_string(), "Illegal pipeline transition idle -> done");
    }
}
