//! Job dispatcher: one load+render job per run, sequential or pooled
//!
//! Each job walks `Pending → Loading → Rendering → Done` (or `Failed` from
//! either working state). Jobs share nothing: in parallel mode every job
//! re-opens the sweep on its worker, because a sweep handle encapsulates
//! open file resources and never crosses worker boundaries. Concurrency
//! safety comes from partitioning (disjoint run indices), not locking.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::figure::FigureSpec;
use crate::render;
use crate::store::{run_label, LoadDepth, SweepStore};

/// Fixed relative directory artifacts are written under.
pub const DEFAULT_OUT_DIR: &str = "figures";

/// Lifecycle state of one run job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Job is created but not yet started.
    Pending,
    /// Job is loading its run from the store.
    Loading,
    /// Job is rendering the loaded run.
    Rendering,
    /// Artifact written.
    Done,
    /// Load or render failed; no artifact exists for this run.
    Failed,
}

/// Outcome record for one run job. Artifacts are the only durable output;
/// the report exists for logging and exit-code decisions.
#[derive(Debug, Clone)]
pub struct JobReport {
    index: usize,
    label: String,
    state: JobState,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    artifact: Option<PathBuf>,
    error: Option<String>,
}

impl JobReport {
    fn new(index: usize) -> Self {
        Self {
            index,
            label: run_label(index),
            state: JobState::Pending,
            started_at: None,
            ended_at: None,
            artifact: None,
            error: None,
        }
    }

    fn enter(&mut self, state: JobState) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.state = state;
    }

    fn complete(&mut self, artifact: PathBuf) {
        self.state = JobState::Done;
        self.artifact = Some(artifact);
        self.ended_at = Some(Utc::now());
    }

    fn fail(&mut self, error: &Error) {
        self.state = JobState::Failed;
        self.error = Some(error.to_string());
        self.ended_at = Some(Utc::now());
    }

    /// Run index this job processed.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Canonical run label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Final (or current) job state.
    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// When the job left `Pending`, if it started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the job reached `Done` or `Failed`.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Artifact path, when the job is `Done`.
    #[must_use]
    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    /// Failure message, when the job is `Failed`.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Everything one job needs, passed explicitly at dispatch time.
/// Workers never read process-global state.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Path of the sweep file each worker opens.
    pub sweep_path: PathBuf,
    /// Sweep title used in artifact names.
    pub title: String,
    /// Output directory for artifacts.
    pub out_dir: PathBuf,
    /// Figure layout, shared read-only by all jobs.
    pub spec: FigureSpec,
}

impl JobConfig {
    /// Config for a sweep file: title from the filename stem, artifacts
    /// under [`DEFAULT_OUT_DIR`].
    #[must_use]
    pub fn for_sweep(sweep_path: &Path, spec: FigureSpec) -> Self {
        let title = sweep_path
            .file_stem()
            .map_or_else(|| "sweep".to_string(), |s| s.to_string_lossy().into_owned());
        Self {
            sweep_path: sweep_path.to_path_buf(),
            title,
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            spec,
        }
    }
}

/// Execute one job against an already opened store.
fn run_job(store: &SweepStore, config: &JobConfig, index: usize) -> JobReport {
    let mut report = JobReport::new(index);
    let span = tracing::info_span!("job", run = %report.label());
    let _guard = span.enter();

    report.enter(JobState::Loading);
    let run = match store.load_run(index, LoadDepth::Full) {
        Ok(run) => run,
        Err(e) => {
            tracing::warn!(error = %e, "run load failed");
            report.fail(&e);
            return report;
        }
    };

    report.enter(JobState::Rendering);
    match render::render(&run, &config.spec, &config.title, &config.out_dir) {
        Ok(artifact) => {
            tracing::info!(artifact = %artifact.display(), "run rendered");
            report.complete(artifact);
        }
        Err(e) => {
            tracing::warn!(error = %e, "render failed");
            report.fail(&e);
        }
    }
    report
}

/// Dispatch render jobs for run indices `0..num_runs`.
///
/// Sequential mode (`parallel == false`) executes jobs in index order on
/// the calling thread and aborts the remaining batch on the first failure
/// (deliberate policy; parallel mode isolates failures per job instead).
///
/// Parallel mode distributes indices over a fixed pool of `pool_size`
/// workers; each job re-opens the sweep. Job and completion order are
/// unspecified. The call blocks until every job is `Done` or `Failed` and
/// the pool is torn down before returning.
///
/// # Errors
///
/// Returns [`Error::StoreOpen`] if the sweep cannot be opened at all, or
/// [`Error::Dispatch`] if the worker pool cannot be built. Individual job
/// failures are reported, not returned.
pub fn run_all(
    config: &JobConfig,
    num_runs: usize,
    parallel: bool,
    pool_size: usize,
) -> Result<Vec<JobReport>> {
    // fail fast before dispatching anything
    let store = SweepStore::open(&config.sweep_path)?;

    if !parallel {
        let mut reports = Vec::with_capacity(num_runs);
        for index in 0..num_runs {
            let report = run_job(&store, config, index);
            let failed = report.state() == JobState::Failed;
            reports.push(report);
            if failed {
                tracing::error!(run = %run_label(index), "sequential batch aborted");
                break;
            }
        }
        return Ok(reports);
    }

    if pool_size == 0 {
        return Err(Error::Dispatch("pool size must be at least 1".into()));
    }
    drop(store);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size)
        .build()
        .map_err(|e| Error::Dispatch(e.to_string()))?;

    let reports = pool.install(|| {
        (0..num_runs)
            .into_par_iter()
            .map(|index| match SweepStore::open(&config.sweep_path) {
                Ok(worker_store) => run_job(&worker_store, config, index),
                Err(e) => {
                    let mut report = JobReport::new(index);
                    report.enter(JobState::Loading);
                    report.fail(&e);
                    report
                }
            })
            .collect()
    });
    // pool dropped here: all workers joined, no orphaned background work
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_report_lifecycle() {
        let mut report = JobReport::new(3);
        assert_eq!(report.state(), JobState::Pending);
        assert_eq!(report.label(), "run_00000003");
        assert!(report.started_at().is_none());

        report.enter(JobState::Loading);
        assert!(report.started_at().is_some());
        report.enter(JobState::Rendering);
        report.complete(PathBuf::from("x.png"));
        assert_eq!(report.state(), JobState::Done);
        assert!(report.ended_at().is_some());
        assert!(report.error().is_none());
    }

    #[test]
    fn test_job_config_for_sweep_derives_title() {
        let spec = FigureSpec::new(1, 1, (10, 10));
        let config = JobConfig::for_sweep(Path::new("/data/demo.traj"), spec);
        assert_eq!(config.title, "demo");
        assert_eq!(config.out_dir, PathBuf::from(DEFAULT_OUT_DIR));
    }

    #[test]
    fn test_run_all_rejects_zero_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.traj");
        let mut writer = crate::store::SweepWriter::create(&path, &["a"], &[]).unwrap();
        writer
            .add_parameter("a", &crate::store::ParamValue::Scalar(1.0))
            .unwrap();
        writer.finish_run().unwrap();
        writer.close().unwrap();

        let config = JobConfig {
            sweep_path: path,
            title: "p".into(),
            out_dir: dir.path().join("figs"),
            spec: FigureSpec::new(1, 1, (10, 10)),
        };
        let err = run_all(&config, 1, true, 0).unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));
    }
}
