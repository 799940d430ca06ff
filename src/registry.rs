//! Catalogue of isolated runtimes and the engines that run inside them.
//!
//! Built once from configuration and read-only afterwards. Provisioning the
//! runtimes themselves is an administrative precondition and not handled here.

use crate::config::ProfilerConfig;
use crate::error::{ProfilerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Keyword selecting every registered engine.
pub const ALL_ENGINES: &str = "all";

/// An isolated runtime environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    pub id: String,
    /// Name of the environment as known to the isolation tool
    pub name: String,
    /// Program and leading arguments that run a script inside the environment,
    /// e.g. `["conda", "run", "--no-capture-output", "-n", "main", "python"]`
    pub launch_prefix: Vec<String>,
}

/// Positional arguments an engine expects after its script path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgConvention {
    /// `<input> <delimiter> <output_dir>`
    PathDelimiterOutput,
    /// `<input> <output_dir>`
    PathOutput,
}

impl ArgConvention {
    pub fn arguments(self, input: &Path, delimiter: &str, output_dir: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output_dir.display().to_string();
        match self {
            Self::PathDelimiterOutput => vec![input, delimiter.to_owned(), output],
            Self::PathOutput => vec![input, output],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDescriptor {
    pub id: String,
    pub display_name: String,
    /// Id of the [`EnvironmentDescriptor`] the engine runs in
    pub environment: String,
    /// Entry point, relative to the engines root unless absolute
    pub script: PathBuf,
    pub args: ArgConvention,
    /// Gets the terminal and is never fed the handoff artifact
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct EnvironmentRegistry {
    engines_root: PathBuf,
    environments: Vec<EnvironmentDescriptor>,
    engines: Vec<EngineDescriptor>,
}

impl EnvironmentRegistry {
    /// Builds the registry from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::Config`] on duplicate ids, an engine whose
    /// environment is not declared, or more than one interactive engine.
    pub fn from_config(config: &ProfilerConfig) -> Result<Self> {
        Self::new(
            config.engines_root.clone(),
            config.environments.clone(),
            config.engines.clone(),
        )
    }

    /// # Errors
    ///
    /// See [`EnvironmentRegistry::from_config`].
    pub fn new(
        engines_root: PathBuf,
        environments: Vec<EnvironmentDescriptor>,
        engines: Vec<EngineDescriptor>,
    ) -> Result<Self> {
        let mut env_ids = HashSet::new();
        for env in &environments {
            if !env_ids.insert(env.id.as_str()) {
                return Err(config_err(format!("Duplicate environment id: {}", env.id)));
            }
        }

        let mut engine_ids = HashSet::new();
        for engine in &engines {
            if engine.id == ALL_ENGINES {
                return Err(config_err(format!("Engine id {ALL_ENGINES:?} is reserved")));
            }
            if !engine_ids.insert(engine.id.as_str()) {
                return Err(config_err(format!("Duplicate engine id: {}", engine.id)));
            }
            if !env_ids.contains(engine.environment.as_str()) {
                return Err(config_err(format!(
                    "Engine {} uses undeclared environment {}",
                    engine.id, engine.environment
                )));
            }
        }

        let interactive: Vec<&str> = engines
            .iter()
            .filter(|e| e.interactive)
            .map(|e| e.id.as_str())
            .collect();
        if interactive.len() > 1 {
            return Err(config_err(format!(
                "At most one engine may be interactive, found: {}",
                interactive.join(", ")
            )));
        }

        Ok(Self {
            engines_root,
            environments,
            engines,
        })
    }

    pub fn environment(&self, id: &str) -> Option<&EnvironmentDescriptor> {
        self.environments.iter().find(|e| e.id == id)
    }

    pub fn engine(&self, id: &str) -> Option<&EngineDescriptor> {
        self.engines.iter().find(|e| e.id == id)
    }

    /// Engines in declared order.
    pub fn engines(&self) -> &[EngineDescriptor] {
        &self.engines
    }

    pub fn environments(&self) -> &[EnvironmentDescriptor] {
        &self.environments
    }

    pub fn engines_root(&self) -> &Path {
        &self.engines_root
    }

    /// Resolves a selection into descriptors.
    ///
    /// `["all"]` (or an empty selection) yields every engine in declared order.
    /// Otherwise the given order is kept and duplicates are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::Config`] naming the first unknown id.
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<EngineDescriptor>> {
        if ids.is_empty() || ids.iter().any(|id| id.as_ref() == ALL_ENGINES) {
            return Ok(self.engines.clone());
        }

        let mut selected: Vec<EngineDescriptor> = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref().trim();
            let engine = self.engine(id).ok_or_else(|| {
                let known: Vec<&str> = self.engines.iter().map(|e| e.id.as_str()).collect();
                config_err(format!(
                    "Unknown engine {id:?} (known: {})",
                    known.join(", ")
                ))
            })?;
            if !selected.iter().any(|e| e.id == engine.id) {
                selected.push(engine.clone());
            }
        }
        Ok(selected)
    }

    /// Absolute or root-relative script location for `engine`.
    pub fn script_path(&self, engine: &EngineDescriptor) -> PathBuf {
        if engine.script.is_absolute() {
            engine.script.clone()
        } else {
            self.engines_root.join(&engine.script)
        }
    }
}

fn config_err(msg: String) -> ProfilerError {
    ProfilerError::Config(msg)
}
