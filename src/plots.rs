//! Built-in cell drawing functions
//!
//! Each function follows the cell contract: draw one statistic of the run
//! into the given region, configured by [`CellOptions`], communicating only
//! via side effects on the drawing surface. Errors (missing series, empty
//! data) propagate to the renderer and fail the whole figure for that run.

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::{Error, Result};
use crate::figure::CellOptions;
use crate::store::{ParamValue, RunData, Series};

/// Series name: synaptic weight snapshots (one weight vector per sample).
pub const WEIGHT_SERIES: &str = "synapse_weights";
/// Series name: spike events (spike time, `[neuron_id]`).
pub const SPIKE_SERIES: &str = "spikes";
/// Series name: membrane threshold traces (one threshold vector per sample).
pub const THRESHOLD_SERIES: &str = "membrane_thresholds";

/// At most this many individual traces per cell; denser runs are thinned.
const MAX_TRACES: usize = 100;

const HIST_BINS: usize = 30;

type Region<'a, 'b> = &'b DrawingArea<BitMapBackend<'a>, Shift>;

fn render_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Render(e.to_string())
}

fn loaded_series<'r>(run: &'r RunData, name: &str) -> Result<&'r Series> {
    run.series(name)
        .ok_or_else(|| Error::Render(format!("series `{name}` is missing or not loaded")))
}

/// Per-synapse weight evolution over time.
pub fn synapse_weight_traces(area: Region<'_, '_>, run: &RunData, opts: &CellOptions) -> Result<()> {
    line_traces(area, run, opts, WEIGHT_SERIES, "synapse weights", "w")
}

/// Per-neuron membrane threshold evolution over time.
pub fn membrane_threshold_traces(
    area: Region<'_, '_>,
    run: &RunData,
    opts: &CellOptions,
) -> Result<()> {
    line_traces(area, run, opts, THRESHOLD_SERIES, "membrane thresholds", "V_t")
}

fn line_traces(
    area: Region<'_, '_>,
    run: &RunData,
    opts: &CellOptions,
    series_name: &str,
    caption: &str,
    y_desc: &str,
) -> Result<()> {
    let series = loaded_series(run, series_name)?;
    let points = series.window(opts.tmin, opts.tmax);
    if points.is_empty() {
        return Err(Error::Render(format!("series `{series_name}` is empty")));
    }

    let t0 = points[0].0;
    let mut t1 = points[points.len() - 1].0;
    if t1 <= t0 {
        t1 = t0 + 1.0;
    }
    let y_max = points
        .iter()
        .flat_map(|(_, v)| v.iter().copied())
        .fold(f64::NEG_INFINITY, f64::max)
        .max(f64::EPSILON);
    let y_min = points
        .iter()
        .flat_map(|(_, v)| v.iter().copied())
        .fold(f64::INFINITY, f64::min)
        .min(0.0);

    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 16))
        .margin(8)
        .x_label_area_size(24)
        .y_label_area_size(40)
        .build_cartesian_2d(t0..t1, y_min..y_max * 1.05)
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_desc("t [s]")
        .y_desc(y_desc)
        .draw()
        .map_err(render_err)?;

    let n_traces = points[0].1.len().min(MAX_TRACES);
    for j in 0..n_traces {
        chart
            .draw_series(LineSeries::new(
                points.iter().filter(|(_, v)| v.len() > j).map(|(t, v)| (*t, v[j])),
                &Palette99::pick(j).mix(0.7),
            ))
            .map_err(render_err)?;
    }
    Ok(())
}

/// Count of active (non-zero-weight) synapses over time.
pub fn active_synapse_count(area: Region<'_, '_>, run: &RunData, opts: &CellOptions) -> Result<()> {
    let series = loaded_series(run, WEIGHT_SERIES)?;
    let points = series.window(opts.tmin, opts.tmax);
    if points.is_empty() {
        return Err(Error::Render("synapse weight series is empty".into()));
    }

    #[allow(clippy::cast_precision_loss)]
    let counts: Vec<(f64, f64)> = points
        .iter()
        .map(|(t, v)| (*t, v.iter().filter(|w| **w > 0.0).count() as f64))
        .collect();
    let t0 = counts[0].0;
    let mut t1 = counts[counts.len() - 1].0;
    if t1 <= t0 {
        t1 = t0 + 1.0;
    }
    let y_max = counts.iter().map(|(_, c)| *c).fold(1.0, f64::max);

    let mut chart = ChartBuilder::on(area)
        .caption("active synapses", ("sans-serif", 16))
        .margin(8)
        .x_label_area_size(24)
        .y_label_area_size(40)
        .build_cartesian_2d(t0..t1, 0.0..y_max * 1.1)
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_desc("t [s]")
        .y_desc("count")
        .draw()
        .map_err(render_err)?;
    chart
        .draw_series(LineSeries::new(counts, &BLUE))
        .map_err(render_err)?;
    Ok(())
}

/// Histogram of synaptic weights at the snapshot selected by `tstep`.
pub fn weight_distribution(area: Region<'_, '_>, run: &RunData, opts: &CellOptions) -> Result<()> {
    let series = loaded_series(run, WEIGHT_SERIES)?;
    let tstep = opts.tstep.unwrap_or(-1);
    let (t, weights) = series.snapshot(tstep).ok_or_else(|| {
        Error::Render(format!(
            "snapshot {tstep} out of range for `{WEIGHT_SERIES}` ({} samples)",
            series.len()
        ))
    })?;
    draw_histogram(area, &format!("w distribution (t={t:.1})"), weights, "w")
}

/// Histogram of log10 synaptic weights at the snapshot selected by `tstep`.
/// Zero and negative weights are excluded.
pub fn weight_distribution_log(
    area: Region<'_, '_>,
    run: &RunData,
    opts: &CellOptions,
) -> Result<()> {
    let series = loaded_series(run, WEIGHT_SERIES)?;
    let tstep = opts.tstep.unwrap_or(-1);
    let (t, weights) = series.snapshot(tstep).ok_or_else(|| {
        Error::Render(format!(
            "snapshot {tstep} out of range for `{WEIGHT_SERIES}` ({} samples)",
            series.len()
        ))
    })?;
    let logs: Vec<f64> = weights
        .iter()
        .filter(|w| **w > 0.0)
        .map(|w| w.log10())
        .collect();
    draw_histogram(area, &format!("log w distribution (t={t:.1})"), &logs, "log10 w")
}

/// Histogram of per-neuron firing rates derived from the spike series.
pub fn firing_rate_distribution(
    area: Region<'_, '_>,
    run: &RunData,
    opts: &CellOptions,
) -> Result<()> {
    let series = loaded_series(run, SPIKE_SERIES)?;
    let spikes = series.window(opts.tmin, opts.tmax);
    if spikes.is_empty() {
        return Err(Error::Render("spike series is empty".into()));
    }

    let mut duration = spikes[spikes.len() - 1].0 - spikes[0].0;
    if duration <= 0.0 {
        duration = 1.0;
    }
    let mut counts: std::collections::BTreeMap<u64, usize> = std::collections::BTreeMap::new();
    for (_, ids) in &spikes {
        for id in *ids {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let neuron = id.round().max(0.0) as u64;
            *counts.entry(neuron).or_insert(0) += 1;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let rates: Vec<f64> = counts.values().map(|c| *c as f64 / duration).collect();
    draw_histogram(area, "firing rates", &rates, "rate [Hz]")
}

fn draw_histogram(area: Region<'_, '_>, caption: &str, samples: &[f64], x_desc: &str) -> Result<()> {
    if samples.is_empty() {
        return Err(Error::Render(format!("no samples for `{caption}`")));
    }
    let lo = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi <= lo {
        hi = lo + 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let bin_width = (hi - lo) / HIST_BINS as f64;

    let mut counts = [0usize; HIST_BINS];
    for s in samples {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bin = (((s - lo) / bin_width) as usize).min(HIST_BINS - 1);
        counts[bin] += 1;
    }
    #[allow(clippy::cast_precision_loss)]
    let y_max = counts.iter().max().copied().unwrap_or(1).max(1) as f64 * 1.1;

    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 16))
        .margin(8)
        .x_label_area_size(24)
        .y_label_area_size(40)
        .build_cartesian_2d(lo..hi, 0.0..y_max)
        .map_err(render_err)?;
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("count")
        .draw()
        .map_err(render_err)?;

    #[allow(clippy::cast_precision_loss)]
    chart
        .draw_series(counts.iter().enumerate().map(|(i, c)| {
            let x0 = lo + i as f64 * bin_width;
            let x1 = x0 + bin_width;
            Rectangle::new([(x0, 0.0), (x1, *c as f64)], BLUE.mix(0.5).filled())
        }))
        .map_err(render_err)?;
    Ok(())
}

/// Text panel listing the parameters whose names start with the configured
/// group prefix (all parameters when no prefix is set).
pub fn parameter_group_display(
    area: Region<'_, '_>,
    run: &RunData,
    opts: &CellOptions,
) -> Result<()> {
    let prefix = opts.group.as_deref().unwrap_or("");
    let header = if prefix.is_empty() {
        "parameters".to_string()
    } else {
        format!("{} parameters", prefix.trim_end_matches('.'))
    };

    area.draw(&Text::new(header, (8, 8), ("sans-serif", 15)))
        .map_err(render_err)?;

    let mut y = 30;
    for (name, value) in run.parameters() {
        if !name.starts_with(prefix) {
            continue;
        }
        let short = name.strip_prefix(prefix).unwrap_or(name);
        let line = format!("{short} = {}", fmt_value(value));
        area.draw(&Text::new(line, (8, y), ("monospace", 13)))
            .map_err(render_err)?;
        y += 17;
    }
    Ok(())
}

fn fmt_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Scalar(v) => format!("{v}"),
        ParamValue::Array(vs) if vs.len() <= 4 => format!("{vs:?}"),
        ParamValue::Array(vs) => {
            format!("[{}, {}, ...] (n={})", vs[0], vs[1], vs.len())
        }
    }
}
