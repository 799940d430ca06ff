//! End-of-run summary.
//!
//! Collects per-engine results into a [`RunSummary`] and lists the artifacts
//! left in the output directory. Artifacts are checked for existence and
//! naming only; their content is never read.

use crate::config::ArtifactSettings;
use crate::error::Result;
use crate::pipeline::ExecutionResult;
use crate::pool::TaskPool;
use crate::utils::{excerpt, format_file_size, truncate_path};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Paths longer than this are shortened in the rendered summary.
const DISPLAY_PATH_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// Every dispatched engine succeeded
    Success,
    /// Some engines succeeded
    Partial,
    /// Nothing succeeded, or nothing ran
    Failed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "SUCCESS",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Report,
    Visualization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub bytes: u64,
}

/// One line of the final table.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub engine: String,
    pub success: bool,
    pub duration: Duration,
    /// Bounded error text, only for failures
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub rows: Vec<SummaryRow>,
    pub artifacts: Vec<Artifact>,
    pub outcome: RunOutcome,
    pub output_dir: PathBuf,
}

impl RunSummary {
    /// Plain-text table plus status block.
    pub fn render(&self) -> String {
        let name_width = self
            .rows
            .iter()
            .map(|r| r.engine.chars().count())
            .max()
            .unwrap_or(0)
            .max("Engine".len());

        let mut lines = vec![
            "Analysis Results".to_owned(),
            format!("{:<name_width$}  {:<8}  Details", "Engine", "Status"),
        ];
        for row in &self.rows {
            let (status, details) = if row.success {
                ("SUCCESS", "Analysis completed successfully")
            } else {
                ("FAILED", row.details.as_deref().unwrap_or("Unknown error"))
            };
            lines.push(format!("{:<name_width$}  {status:<8}  {details}", row.engine));
        }

        let total = self.succeeded + self.failed;
        let headline = match self.outcome {
            RunOutcome::Success => "All engines completed successfully!".to_owned(),
            RunOutcome::Partial => format!("{} of {total} engines completed", self.succeeded),
            RunOutcome::Failed if total == 0 => "No engines were run".to_owned(),
            RunOutcome::Failed => "All engines failed".to_owned(),
        };

        let shown_dir = if self.output_dir.as_os_str().len() > DISPLAY_PATH_CHARS {
            truncate_path(&self.output_dir)
        } else {
            self.output_dir.display().to_string()
        };

        lines.push(String::new());
        lines.push(format!("[{}] {headline}", self.outcome));
        lines.push(format!("Results saved to: {shown_dir}"));
        lines.push(format!("Successful: {} engines", self.succeeded));
        if self.failed > 0 {
            lines.push(format!("Failed: {} engines", self.failed));
        }
        if !self.artifacts.is_empty() {
            let bytes: u64 = self.artifacts.iter().map(|a| a.bytes).sum();
            lines.push(format!(
                "Artifacts: {} files ({})",
                self.artifacts.len(),
                format_file_size(bytes)
            ));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

#[derive(Debug)]
pub struct ResultAggregator<'a> {
    settings: &'a ArtifactSettings,
    pool: TaskPool,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(settings: &'a ArtifactSettings) -> Self {
        Self {
            settings,
            pool: TaskPool::sized_for_host(),
        }
    }

    #[must_use]
    pub fn with_pool(mut self, pool: TaskPool) -> Self {
        self.pool = pool;
        self
    }

    /// Builds the summary for `results`. `source` is the analysed file; its
    /// copy in `output_dir` is not reported as an artifact.
    pub fn summarize(&self, results: &[ExecutionResult], output_dir: &Path, source: &Path) -> RunSummary {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        let outcome = if results.is_empty() || succeeded == 0 {
            RunOutcome::Failed
        } else if failed == 0 {
            RunOutcome::Success
        } else {
            RunOutcome::Partial
        };

        let rows = results
            .iter()
            .map(|r| SummaryRow {
                engine: r.engine.clone(),
                success: r.success,
                duration: r.duration,
                details: (!r.success).then(|| {
                    excerpt(
                        r.error.as_deref().unwrap_or("Unknown error"),
                        self.settings.error_excerpt_chars,
                    )
                }),
            })
            .collect();

        let mut artifacts = self.report_files(output_dir, source);
        artifacts.extend(self.visualizations(output_dir));

        tracing::info!(
            "Run finished: {succeeded} succeeded, {failed} failed, {} artifacts",
            artifacts.len()
        );

        RunSummary {
            succeeded,
            failed,
            rows,
            artifacts,
            outcome,
            output_dir: output_dir.to_path_buf(),
        }
    }

    fn report_files(&self, output_dir: &Path, source: &Path) -> Vec<Artifact> {
        let source_name = source.file_name();
        let extensions = &self.settings.report_extensions;
        match list_files(output_dir, |path| {
            path.file_name() != source_name && has_extension(path, extensions)
        }) {
            Ok(files) => files
                .into_iter()
                .map(|(path, bytes)| Artifact {
                    path,
                    kind: ArtifactKind::Report,
                    bytes,
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Could not list {}: {e}", output_dir.display());
                Vec::new()
            }
        }
    }

    fn visualizations(&self, output_dir: &Path) -> Vec<Artifact> {
        let tasks = self
            .settings
            .visualization_dirs
            .iter()
            .map(|dir| (dir.clone(), dir.clone()))
            .collect();

        let png = ["png".to_owned()];
        let outcomes = self.pool.execute(output_dir, tasks, |root, dir| {
            let path = root.join(dir);
            if !path.is_dir() {
                return Ok(Vec::new());
            }
            list_files(&path, |p| has_extension(p, &png))
        });

        let mut artifacts = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(files) => artifacts.extend(files.into_iter().map(|(path, bytes)| Artifact {
                    path,
                    kind: ArtifactKind::Visualization,
                    bytes,
                })),
                Err(e) => tracing::warn!("Skipping {}: {e}", outcome.name),
            }
        }
        artifacts
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
}

/// Regular files directly under `dir` accepted by `keep`, sorted by path.
fn list_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<(PathBuf, u64)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        let path = entry.path();
        if meta.is_file() && keep(&path) {
            files.push((path, meta.len()));
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn result(engine: &str, success: bool, error: Option<&str>) -> ExecutionResult {
        ExecutionResult {
            engine: engine.to_owned(),
            display_name: engine.to_owned(),
            success,
            error: error.map(str::to_owned),
            exit_code: if success { Some(0) } else { Some(1) },
            duration: Duration::from_millis(10),
            started_at: Local::now(),
            input: PathBuf::from("data.csv"),
        }
    }

    #[test]
    fn test_outcomes() {
        let settings = ArtifactSettings::default();
        let agg = ResultAggregator::new(&settings).with_pool(TaskPool::new(1));
        let tmp = tempfile::tempdir().expect("Failed to create temp dir");
        let src = tmp.path().join("data.csv");

        let all = agg.summarize(&[result("a", true, None)], tmp.path(), &src);
        assert_eq!(all.outcome, RunOutcome::Success);

        let some = agg.summarize(
            &[result("a", true, None), result("b", false, Some("boom"))],
            tmp.path(),
            &src,
        );
        assert_eq!(some.outcome, RunOutcome::Partial);
        assert_eq!((some.succeeded, some.failed), (1, 1));

        let none = agg.summarize(&[result("a", false, None)], tmp.path(), &src);
        assert_eq!(none.outcome, RunOutcome::Failed);

        let empty = agg.summarize(&[], tmp.path(), &src);
        assert_eq!(empty.outcome, RunOutcome::Failed);
    }

    #[test]
    fn test_error_excerpt_is_bounded() {
        let settings = ArtifactSettings::default();
        let agg = ResultAggregator::new(&settings).with_pool(TaskPool::new(1));
        let tmp = tempfile::tempdir().expect("Failed to create temp dir");
        let long = "x".repeat(200);

        let summary = agg.summarize(
            &[result("ydata", false, Some(&long))],
            tmp.path(),
            &tmp.path().join("data.csv"),
        );
        let details = summary.rows[0].details.clone().unwrap_or_default();
        assert_eq!(details.chars().count(), 63);
        assert!(details.ends_with("..."));

        let rendered = summary.render();
        assert!(rendered.contains("FAILED"));
        assert!(rendered.contains("[FAILED] All engines failed"));
        assert!(!rendered.contains(&long), "full error text never shown");
    }

    #[test]
    fn test_artifact_discovery() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let out = tmp.path();
        std::fs::write(out.join("data.csv"), "a\n1\n")?;
        std::fs::write(out.join("modified_dataset.csv"), "a\n1\n")?;
        std::fs::write(out.join("ydata_profiling_report.html"), "<html/>")?;
        std::fs::write(out.join("summary.txt"), "ok")?;
        std::fs::write(out.join("notes.md"), "ignored")?;
        std::fs::create_dir_all(out.join("kde_plots"))?;
        std::fs::write(out.join("kde_plots").join("age.png"), [0_u8; 4])?;
        std::fs::write(out.join("kde_plots").join("readme.txt"), "ignored")?;
        std::fs::create_dir_all(out.join("bar_charts"))?;
        std::fs::write(out.join("bar_charts").join("city.png"), [0_u8; 4])?;

        let settings = ArtifactSettings::default();
        let summary = ResultAggregator::new(&settings)
            .with_pool(TaskPool::new(2))
            .summarize(&[result("main", true, None)], out, &tmp.path().join("data.csv"));

        let names: Vec<String> = summary
            .artifacts
            .iter()
            .filter_map(|a| a.path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(
            names,
            [
                "modified_dataset.csv",
                "summary.txt",
                "ydata_profiling_report.html",
                "age.png",
                "city.png"
            ]
        );
        let plots = summary
            .artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::Visualization)
            .count();
        assert_eq!(plots, 2);
        Ok(())
    }

    #[test]
    fn test_render_lists_every_engine() {
        let summary = RunSummary {
            succeeded: 1,
            failed: 1,
            rows: vec![
                SummaryRow {
                    engine: "main".to_owned(),
                    success: true,
                    duration: Duration::ZERO,
                    details: None,
                },
                SummaryRow {
                    engine: "dataprep".to_owned(),
                    success: false,
                    duration: Duration::ZERO,
                    details: Some("dataprep failed with exit code 2".to_owned()),
                },
            ],
            artifacts: vec![],
            outcome: RunOutcome::Partial,
            output_dir: PathBuf::from("/tmp/out"),
        };

        let text = summary.render();
        assert!(text.contains("main"));
        assert!(text.contains("SUCCESS"));
        assert!(text.contains("dataprep failed with exit code 2"));
        assert!(text.contains("[PARTIAL] 1 of 2 engines completed"));
        assert!(text.contains("Failed: 1 engines"));
    }
}
