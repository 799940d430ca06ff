use crate::error::DispatchError;
use crate::registry::EnvironmentDescriptor;
use std::process::Command;

/// Turns an environment into a command that runs a script inside it.
///
/// The orchestrator appends the script path and engine arguments.
pub trait ProcessLauncher: Send + Sync {
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the environment cannot be launched.
    fn command(&self, environment: &EnvironmentDescriptor) -> Result<Command, DispatchError>;
}

/// Uses the environment's `launch_prefix` verbatim, e.g.
/// `conda run --no-capture-output -n csv-profiler-main python`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixLauncher;

impl ProcessLauncher for PrefixLauncher {
    fn command(&self, environment: &EnvironmentDescriptor) -> Result<Command, DispatchError> {
        let Some((program, leading)) = environment.launch_prefix.split_first() else {
            return Err(DispatchError::EmptyLaunchPrefix {
                environment: environment.id.clone(),
            });
        };

        let mut command = Command::new(program);
        command.args(leading);
        command.env("PYTHONIOENCODING", "utf-8");
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_split() {
        let env = EnvironmentDescriptor {
            id: "main".to_owned(),
            name: "csv-profiler-main".to_owned(),
            launch_prefix: ["conda", "run", "-n", "csv-profiler-main", "python"]
                .map(str::to_owned)
                .to_vec(),
        };
        let command = PrefixLauncher.command(&env).expect("prefix is not empty");
        assert_eq!(command.get_program(), "conda");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, ["run", "-n", "csv-profiler-main", "python"]);
    }

    #[test]
    fn test_empty_prefix() {
        let env = EnvironmentDescriptor {
            id: "broken".to_owned(),
            name: "broken".to_owned(),
            launch_prefix: vec![],
        };
        assert!(matches!(
            PrefixLauncher.command(&env),
            Err(DispatchError::EmptyLaunchPrefix { .. })
        ));
    }
}
