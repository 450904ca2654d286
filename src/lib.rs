//! # trajplot: batch diagnostic figures for simulation sweeps
//!
//! trajplot renders one diagnostic figure per run of a parameterized
//! neural-network simulation sweep. A sweep is a single on-disk container
//! of many independent runs sharing a schema; trajplot opens it read-only,
//! loads runs by index, and fans out one render job per run across a
//! fixed-size worker pool (or sequentially, for debugging).
//!
//! ## Pipeline
//!
//! ```text
//! SweepStore (sweep file) ──[run index]──> (Parameters, Results)
//!        │                                         │
//!        └── dispatcher drives 0..N-1              ▼
//!                                     FigureSpec + render() ──> {title}_{run}.png
//! ```
//!
//! Jobs are embarrassingly parallel: no shared mutable state, no
//! cross-run interaction, one artifact per run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use trajplot::dispatch::{run_all, JobConfig};
//! use trajplot::figure::default_figure_spec;
//! use trajplot::store::SweepStore;
//!
//! let store = SweepStore::open("data/demo.traj")?;
//! let num_runs = store.run_count();
//! let config = JobConfig::for_sweep(store.path(), default_figure_spec()?);
//! drop(store);
//!
//! // 4 workers, each re-opening the sweep for its own jobs
//! let reports = run_all(&config, num_runs, true, 4)?;
//! # Ok::<(), trajplot::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod dispatch;
pub mod error;
pub mod figure;
pub mod plots;
pub mod render;
pub mod store;

pub use error::{Error, Result};
