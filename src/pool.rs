//! Fixed-size worker pool for independent post-processing tasks.
//!
//! Tasks are queued on a channel and pulled by scoped worker threads. Every
//! task borrows the same immutable snapshot; nothing is shared mutably. A task
//! that fails or panics only affects its own [`TaskOutcome`]. If no worker
//! thread can be started the batch runs on the calling thread instead.

use crate::error::{ProfilerError, Result};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Upper bound on workers regardless of core count.
const MAX_WORKERS: usize = 4;

/// Result of one named task.
#[derive(Debug)]
pub struct TaskOutcome<R> {
    pub name: String,
    pub result: Result<R>,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskPool {
    workers: usize,
}

impl TaskPool {
    /// Pool with an explicit worker count. Zero runs every batch inline.
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    /// Three quarters of the logical cores, between 1 and 4 workers.
    pub fn sized_for_host() -> Self {
        let cores = num_cpus::get();
        let workers = (cores * 3 / 4).clamp(1, MAX_WORKERS);
        Self::new(workers)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `f` over every task and returns outcomes in submission order.
    pub fn execute<S, T, R, F>(&self, snapshot: &S, tasks: Vec<(String, T)>, f: F) -> Vec<TaskOutcome<R>>
    where
        S: Sync + ?Sized,
        T: Send,
        R: Send,
        F: Fn(&S, T) -> Result<R> + Sync,
    {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let (task_tx, task_rx) = crossbeam_channel::unbounded::<(usize, String, T)>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, TaskOutcome<R>)>();
        for (index, (name, task)) in tasks.into_iter().enumerate() {
            if task_tx.send((index, name, task)).is_err() {
                tracing::error!("Task queue closed while submitting");
            }
        }
        drop(task_tx);

        let f = &f;
        std::thread::scope(|scope| {
            let mut spawned = 0;
            for worker in 0..self.workers.min(total) {
                let rx = task_rx.clone();
                let tx = done_tx.clone();
                let spawn = std::thread::Builder::new()
                    .name(format!("profilekit-worker-{worker}"))
                    .spawn_scoped(scope, move || {
                        for (index, name, task) in rx.iter() {
                            let outcome = run_isolated(&name, || f(snapshot, task));
                            if tx.send((index, TaskOutcome { name, result: outcome })).is_err() {
                                break;
                            }
                        }
                    });
                match spawn {
                    Ok(_) => spawned += 1,
                    Err(e) => {
                        tracing::warn!("Failed to spawn worker {worker}: {e}");
                        break;
                    }
                }
            }

            if spawned == 0 {
                if self.workers > 0 {
                    tracing::warn!("No worker threads available, running {total} task(s) inline");
                }
                for (index, name, task) in task_rx.iter() {
                    let outcome = run_isolated(&name, || f(snapshot, task));
                    if done_tx.send((index, TaskOutcome { name, result: outcome })).is_err() {
                        break;
                    }
                }
            }
        });
        drop(done_tx);

        let mut slots: Vec<Option<TaskOutcome<R>>> = (0..total).map(|_| None).collect();
        for (index, outcome) in done_rx.iter() {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(outcome);
            }
        }
        slots.into_iter().flatten().collect()
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::sized_for_host()
    }
}

fn run_isolated<R>(name: &str, task: impl FnOnce() -> Result<R>) -> Result<R> {
    catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_owned());
        tracing::error!("Task {name} panicked: {detail}");
        Err(ProfilerError::Other(format!("task {name} panicked: {detail}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(n: usize) -> Vec<(String, usize)> {
        (0..n).map(|i| (format!("task-{i}"), i)).collect()
    }

    #[test]
    fn test_host_sizing_is_bounded() {
        let pool = TaskPool::sized_for_host();
        assert!((1..=MAX_WORKERS).contains(&pool.workers()));
    }

    #[test]
    fn test_outcomes_in_submission_order() {
        let offset = 100_usize;
        let outcomes = TaskPool::new(3).execute(&offset, tasks(20), |base, i| Ok(base + i));

        assert_eq!(outcomes.len(), 20);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.name, format!("task-{i}"));
            assert_eq!(outcome.result.as_ref().ok(), Some(&(100 + i)));
        }
    }

    #[test]
    fn test_failures_are_isolated() {
        let outcomes = TaskPool::new(2).execute(&(), tasks(4), |(), i| {
            if i == 1 {
                return Err(ProfilerError::Other("bad input".to_owned()));
            }
            if i == 2 {
                panic!("worker blew up");
            }
            Ok(i)
        });

        assert_eq!(outcomes.len(), 4, "every task reports");
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());
        let panic_text = outcomes[2]
            .result
            .as_ref()
            .err()
            .map(ToString::to_string)
            .unwrap_or_default();
        assert!(panic_text.contains("worker blew up"), "{panic_text}");
        assert!(outcomes[3].result.is_ok());
    }

    #[test]
    fn test_inline_pool() {
        let outcomes = TaskPool::new(0).execute("snapshot", tasks(3), |s, i| Ok(s.len() + i));
        let values: Vec<usize> = outcomes.into_iter().filter_map(|o| o.result.ok()).collect();
        assert_eq!(values, [8, 9, 10]);
    }

    #[test]
    fn test_empty_batch() {
        let outcomes: Vec<TaskOutcome<()>> = TaskPool::new(2).execute(&(), Vec::<(String, ())>::new(), |(), ()| Ok(()));
        assert!(outcomes.is_empty());
    }
}
