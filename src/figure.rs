//! Figure spec: declarative grid layout for one diagnostic figure
//!
//! A [`FigureSpec`] is a typed, ordered list of grid cells, each bound to
//! one drawing function and its options. Positions are validated once at
//! construction; the renderer never resolves cells by lookup. Specs are
//! stateless and shared read-only across all jobs.

use plotters::coord::Shift;
use plotters::prelude::{BitMapBackend, DrawingArea};

use crate::error::{Error, Result};
use crate::plots;
use crate::store::RunData;

/// A cell drawing function: draws one statistic of `run` into `region`,
/// configured by `options`. Communicates only via side effects on the
/// drawing surface; must not mutate the run data.
pub type CellFn =
    for<'a> fn(&DrawingArea<BitMapBackend<'a>, Shift>, &RunData, &CellOptions) -> Result<()>;

/// Per-cell configuration options.
#[derive(Debug, Clone, Default)]
pub struct CellOptions {
    /// Snapshot selector for distribution plots; negative counts from the
    /// end (`-1` = final snapshot). Defaults to `-1` where relevant.
    pub tstep: Option<i64>,
    /// Lower time bound for trace plots.
    pub tmin: Option<f64>,
    /// Upper time bound for trace plots.
    pub tmax: Option<f64>,
    /// Parameter-name prefix for summary panels (e.g. `"stdp."`).
    pub group: Option<String>,
}

impl CellOptions {
    /// Options selecting the snapshot at `tstep`.
    #[must_use]
    pub fn tstep(tstep: i64) -> Self {
        Self {
            tstep: Some(tstep),
            ..Self::default()
        }
    }

    /// Options clipping traces to `[tmin, tmax]`.
    #[must_use]
    pub fn window(tmin: f64, tmax: f64) -> Self {
        Self {
            tmin: Some(tmin),
            tmax: Some(tmax),
            ..Self::default()
        }
    }

    /// Options selecting a parameter group by name prefix.
    #[must_use]
    pub fn group(prefix: &str) -> Self {
        Self {
            group: Some(prefix.to_string()),
            ..Self::default()
        }
    }
}

/// What a cell renders.
#[derive(Debug, Clone)]
pub enum CellContent {
    /// Bound drawing function with its options.
    Draw {
        /// The drawing function.
        draw: CellFn,
        /// Options passed to every invocation.
        options: CellOptions,
    },
    /// Explicitly reserved empty slot.
    Blank,
}

/// One grid cell of a figure.
#[derive(Debug, Clone)]
pub struct Cell {
    row: usize,
    col: usize,
    content: CellContent,
}

impl Cell {
    /// Grid row (zero-based, top to bottom).
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Grid column (zero-based, left to right).
    #[must_use]
    pub fn col(&self) -> usize {
        self.col
    }

    /// The cell's content.
    #[must_use]
    pub fn content(&self) -> &CellContent {
        &self.content
    }
}

/// Declarative layout of one diagnostic figure.
#[derive(Debug, Clone)]
pub struct FigureSpec {
    rows: usize,
    cols: usize,
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl FigureSpec {
    /// Empty spec with the given grid shape and pixel size.
    #[must_use]
    pub fn new(rows: usize, cols: usize, size: (u32, u32)) -> Self {
        Self {
            rows,
            cols,
            width: size.0,
            height: size.1,
            cells: Vec::new(),
        }
    }

    /// Bind a drawing function to the cell at `(row, col)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FigureSpec`] if the position is out of range or
    /// already occupied.
    pub fn draw_cell(
        mut self,
        row: usize,
        col: usize,
        draw: CellFn,
        options: CellOptions,
    ) -> Result<Self> {
        self.check_position(row, col)?;
        self.cells.push(Cell {
            row,
            col,
            content: CellContent::Draw { draw, options },
        });
        Ok(self)
    }

    /// Reserve an explicitly empty slot at `(row, col)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FigureSpec`] if the position is out of range or
    /// already occupied.
    pub fn blank_cell(mut self, row: usize, col: usize) -> Result<Self> {
        self.check_position(row, col)?;
        self.cells.push(Cell {
            row,
            col,
            content: CellContent::Blank,
        });
        Ok(self)
    }

    /// Grid rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Grid columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Artifact pixel size `(width, height)`.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Cells in declaration order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    fn check_position(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::FigureSpec(format!(
                "cell ({row},{col}) outside {}x{} grid",
                self.rows, self.cols
            )));
        }
        if self.cells.iter().any(|c| c.row == row && c.col == col) {
            return Err(Error::FigureSpec(format!(
                "cell ({row},{col}) bound more than once"
            )));
        }
        Ok(())
    }
}

/// The stock synapse-dynamics diagnostic layout: weight traces and
/// distributions (linear and log) at several snapshots, firing statistics,
/// threshold traces, and a parameter-summary column, on a 6x4 grid.
///
/// # Errors
///
/// Returns [`Error::FigureSpec`] only if the layout itself is inconsistent,
/// which would be a bug in this function.
pub fn default_figure_spec() -> Result<FigureSpec> {
    FigureSpec::new(6, 4, (1600, 2160))
        .draw_cell(0, 0, plots::synapse_weight_traces, CellOptions::default())?
        .draw_cell(0, 1, plots::active_synapse_count, CellOptions::default())?
        .draw_cell(0, 3, plots::parameter_group_display, CellOptions::group("netw."))?
        .draw_cell(1, 0, plots::weight_distribution, CellOptions::tstep(1))?
        .draw_cell(1, 1, plots::weight_distribution, CellOptions::tstep(3))?
        .draw_cell(1, 2, plots::weight_distribution, CellOptions::tstep(-1))?
        .draw_cell(1, 3, plots::parameter_group_display, CellOptions::group("neuron."))?
        .draw_cell(2, 0, plots::weight_distribution_log, CellOptions::tstep(1))?
        .draw_cell(2, 1, plots::weight_distribution_log, CellOptions::tstep(3))?
        .draw_cell(2, 2, plots::weight_distribution_log, CellOptions::tstep(-1))?
        .draw_cell(2, 3, plots::parameter_group_display, CellOptions::group("synapse."))?
        .draw_cell(3, 0, plots::firing_rate_distribution, CellOptions::default())?
        .draw_cell(3, 3, plots::parameter_group_display, CellOptions::group("stdp."))?
        .draw_cell(4, 0, plots::membrane_threshold_traces, CellOptions::default())?
        .blank_cell(4, 1)?
        .blank_cell(4, 2)?
        .draw_cell(4, 3, plots::parameter_group_display, CellOptions::group("sn."))?
        .blank_cell(5, 0)?
        .blank_cell(5, 1)?
        .blank_cell(5, 2)?
        .draw_cell(5, 3, plots::parameter_group_display, CellOptions::group("strct."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec_builds() {
        let spec = default_figure_spec().unwrap();
        assert_eq!(spec.rows(), 6);
        assert_eq!(spec.cols(), 4);
        assert!(!spec.cells().is_empty());
    }

    #[test]
    fn test_duplicate_cell_rejected() {
        let spec = FigureSpec::new(2, 2, (100, 100))
            .draw_cell(0, 0, plots::synapse_weight_traces, CellOptions::default())
            .unwrap();
        let err = spec.blank_cell(0, 0).unwrap_err();
        assert!(matches!(err, Error::FigureSpec(_)));
    }

    #[test]
    fn test_out_of_range_cell_rejected() {
        let err = FigureSpec::new(2, 2, (100, 100)).blank_cell(2, 0).unwrap_err();
        assert!(matches!(err, Error::FigureSpec(_)));
    }
}
