//! Renderer: draws one run's figure and persists it as a PNG artifact
//!
//! Artifacts are named `{title}_{run_label}.png` inside the output
//! directory, which is created on demand (idempotent). Rendering a run
//! with a fixed spec is deterministic: same run, same spec, same bytes.

use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::error::{Error, Result};
use crate::figure::{CellContent, FigureSpec};
use crate::store::RunData;

/// Render every non-blank cell of `spec` for `run` and write one PNG
/// artifact under `out_dir`. Returns the artifact path.
///
/// Cell errors are not caught: a failing cell fails the whole figure, and
/// the partially written artifact is removed so a failed run leaves no
/// image file behind.
///
/// # Errors
///
/// Returns [`Error::Render`] when a cell's drawing routine or the figure
/// write fails, or [`Error::Io`] when the output directory cannot be
/// created.
pub fn render(run: &RunData, spec: &FigureSpec, title: &str, out_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{title}_{}.png", run.label()));

    match draw_figure(&path, run, spec) {
        Ok(()) => {
            tracing::debug!(artifact = %path.display(), run = run.label(), "figure written");
            Ok(path)
        }
        Err(e) => {
            // no artifact for a failed run
            let _ = fs::remove_file(&path);
            Err(e)
        }
    }
}

fn draw_figure(path: &Path, run: &RunData, spec: &FigureSpec) -> Result<()> {
    let root = BitMapBackend::new(path, spec.size()).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| Error::Render(e.to_string()))?;

    // split_evenly tiles the surface without overlap; blank cells stay white
    let regions = root.split_evenly((spec.rows(), spec.cols()));
    for cell in spec.cells() {
        if let CellContent::Draw { draw, options } = cell.content() {
            let region = &regions[cell.row() * spec.cols() + cell.col()];
            draw(region, run, options)?;
        }
    }

    root.present().map_err(|e| Error::Render(e.to_string()))?;
    Ok(())
}
