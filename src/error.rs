//! Error types for trajplot
//!
//! Errors are local to the job that raised them: a failed run load or a
//! failed cell render fails that run's figure only, never the sweep handle
//! or the other jobs.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trajplot error types
#[derive(Error, Debug)]
pub enum Error {
    /// Sweep file missing, unreadable, or schema-incompatible.
    /// Fatal: aborts the whole invocation before any run is processed.
    #[error("failed to open sweep store: {0}")]
    StoreOpen(String),

    /// Run index outside the declared range. Indicates a dispatcher bug
    /// (index enumeration inconsistent with the store).
    #[error("run index {index} out of range (sweep declares {count} runs)")]
    RunNotFound {
        /// Requested run index
        index: usize,
        /// Number of runs declared by the sweep
        count: usize,
    },

    /// A specific run's stored rows are missing or malformed.
    /// Fails that job only.
    #[error("failed to load run {label}: {reason}")]
    RunLoad {
        /// Canonical run label (e.g. `run_00000003`)
        label: String,
        /// What was wrong with the stored data
        reason: String,
    },

    /// A cell's drawing routine failed or the figure could not be written.
    /// Not caught per cell: a failing cell fails the whole figure.
    #[error("render failed: {0}")]
    Render(String),

    /// Figure spec construction error (cell out of range or duplicated).
    #[error("invalid figure spec: {0}")]
    FigureSpec(String),

    /// Worker pool could not be built or configured.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Sweep writer error (schema violation, encoding failure).
    #[error("sweep write error: {0}")]
    StoreWrite(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
