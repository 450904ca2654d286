//! Run store: read-only access to sweep containers
//!
//! A *sweep* is one parameterized experiment stored as a single Parquet file,
//! written one row group per run. Every run shares the sweep's declared
//! schema (parameter names + series names) but carries its own values.
//!
//! Row schema of the container:
//!
//! ```text
//! run_idx: UInt32 | kind: Utf8 ("parameter" | "series") | name: Utf8 | payload: Utf8 (JSON)
//! ```
//!
//! Because each run occupies exactly one row group, the run count is
//! available from the footer alone and `load_run(idx)` reads exactly one
//! row group — random access without materializing the whole sweep.
//!
//! The store is strictly read-only. Sweep files are produced by the
//! simulation exporter (or, in tests, by [`SweepWriter`]).

mod writer;

pub use writer::SweepWriter;

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{StringArray, UInt32Array};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Container format version understood by this store.
pub const FORMAT_VERSION: &str = "1";

/// Expected column names of the sweep container, in order.
const COLUMNS: [&str; 4] = ["run_idx", "kind", "name", "payload"];

/// Canonical per-run identifier string, stable within a sweep.
#[must_use]
pub fn run_label(index: usize) -> String {
    format!("run_{index:08}")
}

/// How much of a run to materialize on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDepth {
    /// Parameters fully materialized; series as name-only skeletons.
    /// Cheap enumeration without reading series values.
    Skeleton,
    /// Parameters and all series values fully materialized.
    Full,
}

/// A parameter value: scalar or small array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Single numeric value (network size, synaptic constant, rate, ...)
    Scalar(f64),
    /// Small numeric array
    Array(Vec<f64>),
}

impl ParamValue {
    /// Scalar value, if this parameter is a scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Array(_) => None,
        }
    }
}

/// One time-indexed result series. Each series carries its own sampling
/// times; series within a run are not necessarily co-sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Sample times, ascending
    pub times: Vec<f64>,
    /// One value vector per sample time
    pub values: Vec<Vec<f64>>,
}

impl Series {
    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True if the series holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Snapshot at position `tstep`. Negative values index from the end
    /// (`-1` is the last sample). Returns `None` when out of range.
    #[must_use]
    pub fn snapshot(&self, tstep: i64) -> Option<(f64, &[f64])> {
        let n = i64::try_from(self.times.len()).ok()?;
        let i = if tstep < 0 { n + tstep } else { tstep };
        if i < 0 || i >= n {
            return None;
        }
        let i = usize::try_from(i).ok()?;
        Some((self.times[i], self.values[i].as_slice()))
    }

    /// Samples whose time falls inside `[tmin, tmax]` (unbounded where `None`).
    #[must_use]
    pub fn window(&self, tmin: Option<f64>, tmax: Option<f64>) -> Vec<(f64, &[f64])> {
        self.times
            .iter()
            .zip(self.values.iter())
            .filter(|(t, _)| tmin.map_or(true, |lo| **t >= lo) && tmax.map_or(true, |hi| **t <= hi))
            .map(|(t, v)| (*t, v.as_slice()))
            .collect()
    }
}

/// A result series as loaded from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesData {
    /// Name known, values not read (skeleton-depth load).
    Skeleton,
    /// Fully materialized series.
    Loaded(Series),
}

impl SeriesData {
    /// The materialized series, if loaded at full depth.
    #[must_use]
    pub fn series(&self) -> Option<&Series> {
        match self {
            Self::Skeleton => None,
            Self::Loaded(s) => Some(s),
        }
    }
}

/// One run, materialized into memory. Read-only after load; never cached
/// across jobs.
#[derive(Debug, Clone)]
pub struct RunData {
    index: usize,
    label: String,
    parameters: BTreeMap<String, ParamValue>,
    results: BTreeMap<String, SeriesData>,
}

impl RunData {
    /// Zero-based run index within the sweep.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Canonical run label (e.g. `run_00000003`).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// All parameters, keyed by name.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    /// Single parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    /// All result series, keyed by name.
    #[must_use]
    pub fn results(&self) -> &BTreeMap<String, SeriesData> {
        &self.results
    }

    /// Fully materialized series by name. `None` when the series is absent
    /// or was loaded as a skeleton.
    #[must_use]
    pub fn series(&self, name: &str) -> Option<&Series> {
        self.results.get(name).and_then(SeriesData::series)
    }
}

/// Read-only handle over one sweep file.
///
/// The handle keeps only the path and footer-derived metadata; every
/// `load_run` re-opens the file, so a handle never holds data for more
/// than one call. Handles are cheap to create and are NOT shared across
/// worker boundaries — each worker opens its own (see the dispatcher).
#[derive(Debug)]
pub struct SweepStore {
    path: PathBuf,
    title: String,
    run_count: usize,
    parameter_names: Vec<String>,
    series_names: Vec<String>,
}

impl SweepStore {
    /// Open a sweep file read-only.
    ///
    /// Reads the Parquet footer, validates the container schema and
    /// format version, and derives the sweep title from the filename stem.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreOpen`] if the path is missing, not a valid
    /// Parquet file, or schema-incompatible.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::StoreOpen(format!("{}: {e}", path.display())))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::StoreOpen(format!("not a sweep container: {e}")))?;

        let schema = builder.schema();
        if schema.fields().len() != COLUMNS.len() {
            return Err(Error::StoreOpen(format!(
                "expected {} columns, found {}",
                COLUMNS.len(),
                schema.fields().len()
            )));
        }
        for (field, expected) in schema.fields().iter().zip(COLUMNS.iter()) {
            if field.name() != expected {
                return Err(Error::StoreOpen(format!(
                    "unexpected column `{}` (expected `{expected}`)",
                    field.name()
                )));
            }
        }
        if schema.field(0).data_type() != &DataType::UInt32 {
            return Err(Error::StoreOpen("run_idx column must be UInt32".into()));
        }

        let metadata = schema.metadata();
        let version = metadata
            .get("sweep.format_version")
            .ok_or_else(|| Error::StoreOpen("missing sweep.format_version".into()))?;
        if version != FORMAT_VERSION {
            return Err(Error::StoreOpen(format!(
                "unsupported sweep format version {version} (supported: {FORMAT_VERSION})"
            )));
        }
        let parameter_names = decode_name_list(metadata.get("sweep.parameters"), "sweep.parameters")?;
        let series_names = decode_name_list(metadata.get("sweep.series"), "sweep.series")?;

        let run_count = builder.metadata().num_row_groups();
        if let Some(declared) = declared_run_count(builder.metadata().file_metadata().key_value_metadata()) {
            if declared != run_count {
                return Err(Error::StoreOpen(format!(
                    "footer declares {declared} runs but file holds {run_count} row groups"
                )));
            }
        }

        let title = path
            .file_stem()
            .map_or_else(|| "sweep".to_string(), |s| s.to_string_lossy().into_owned());

        tracing::debug!(
            path = %path.display(),
            run_count,
            parameters = parameter_names.len(),
            series = series_names.len(),
            "opened sweep store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            title,
            run_count,
            parameter_names,
            series_names,
        })
    }

    /// Path of the underlying sweep file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sweep title (filename stem), used to name artifacts.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of runs declared in the sweep. Available before any run is
    /// loaded.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.run_count
    }

    /// Parameter names declared by the sweep schema.
    #[must_use]
    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// Series names declared by the sweep schema.
    #[must_use]
    pub fn series_names(&self) -> &[String] {
        &self.series_names
    }

    /// Load one run, reading exactly its row group.
    ///
    /// Parameters are always fully materialized. Series values are read
    /// only at [`LoadDepth::Full`]; at [`LoadDepth::Skeleton`] the result
    /// map holds name-only entries. No I/O happens after this returns.
    ///
    /// # Errors
    ///
    /// [`Error::RunNotFound`] when `index >= run_count`;
    /// [`Error::RunLoad`] when the run's rows are malformed or do not
    /// match the declared schema.
    pub fn load_run(&self, index: usize, depth: LoadDepth) -> Result<RunData> {
        if index >= self.run_count {
            return Err(Error::RunNotFound {
                index,
                count: self.run_count,
            });
        }
        let label = run_label(index);
        let load_err = |reason: String| Error::RunLoad {
            label: run_label(index),
            reason,
        };

        let file = File::open(&self.path).map_err(|e| load_err(e.to_string()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| load_err(e.to_string()))?
            .with_row_groups(vec![index])
            .build()
            .map_err(|e| load_err(e.to_string()))?;

        let mut parameters = BTreeMap::new();
        let mut results = BTreeMap::new();

        for batch in reader {
            let batch = batch.map_err(|e| load_err(e.to_string()))?;
            let run_idx = downcast::<UInt32Array>(&batch, 0, &label)?;
            let kinds = downcast::<StringArray>(&batch, 1, &label)?;
            let names = downcast::<StringArray>(&batch, 2, &label)?;
            let payloads = downcast::<StringArray>(&batch, 3, &label)?;

            for row in 0..batch.num_rows() {
                if run_idx.value(row) as usize != index {
                    return Err(load_err(format!(
                        "row group {index} holds rows for run {}",
                        run_idx.value(row)
                    )));
                }
                let name = names.value(row).to_string();
                match kinds.value(row) {
                    "parameter" => {
                        let value: ParamValue = serde_json::from_str(payloads.value(row))
                            .map_err(|e| load_err(format!("parameter `{name}`: {e}")))?;
                        parameters.insert(name, value);
                    }
                    "series" => {
                        let data = match depth {
                            LoadDepth::Skeleton => SeriesData::Skeleton,
                            LoadDepth::Full => {
                                let series: Series = serde_json::from_str(payloads.value(row))
                                    .map_err(|e| load_err(format!("series `{name}`: {e}")))?;
                                if series.times.len() != series.values.len() {
                                    return Err(load_err(format!(
                                        "series `{name}`: {} times but {} value vectors",
                                        series.times.len(),
                                        series.values.len()
                                    )));
                                }
                                SeriesData::Loaded(series)
                            }
                        };
                        results.insert(name, data);
                    }
                    other => {
                        return Err(load_err(format!("unknown record kind `{other}`")));
                    }
                }
            }
        }

        self.check_schema(&parameters, &results, &label)?;

        Ok(RunData {
            index,
            label,
            parameters,
            results,
        })
    }

    /// Loaded keys must match the declared schema exactly: no missing
    /// entries, no extras.
    fn check_schema(
        &self,
        parameters: &BTreeMap<String, ParamValue>,
        results: &BTreeMap<String, SeriesData>,
        label: &str,
    ) -> Result<()> {
        let declared_params: BTreeSet<&str> =
            self.parameter_names.iter().map(String::as_str).collect();
        let loaded_params: BTreeSet<&str> = parameters.keys().map(String::as_str).collect();
        if declared_params != loaded_params {
            return Err(Error::RunLoad {
                label: label.to_string(),
                reason: format!(
                    "parameter keys {loaded_params:?} do not match declared schema {declared_params:?}"
                ),
            });
        }

        let declared_series: BTreeSet<&str> =
            self.series_names.iter().map(String::as_str).collect();
        let loaded_series: BTreeSet<&str> = results.keys().map(String::as_str).collect();
        if declared_series != loaded_series {
            return Err(Error::RunLoad {
                label: label.to_string(),
                reason: format!(
                    "series keys {loaded_series:?} do not match declared schema {declared_series:?}"
                ),
            });
        }
        Ok(())
    }
}

fn decode_name_list(raw: Option<&String>, key: &str) -> Result<Vec<String>> {
    let raw = raw.ok_or_else(|| Error::StoreOpen(format!("missing {key} metadata")))?;
    serde_json::from_str(raw).map_err(|e| Error::StoreOpen(format!("invalid {key} metadata: {e}")))
}

fn declared_run_count(kv: Option<&Vec<parquet::format::KeyValue>>) -> Option<usize> {
    kv?.iter()
        .find(|entry| entry.key == "sweep.run_count")
        .and_then(|entry| entry.value.as_ref())
        .and_then(|v| v.parse().ok())
}

fn downcast<'a, T: 'static>(
    batch: &'a arrow::record_batch::RecordBatch,
    column: usize,
    label: &str,
) -> Result<&'a T> {
    batch
        .column(column)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::RunLoad {
            label: label.to_string(),
            reason: format!("column {column} has an unexpected array type"),
        })
}
