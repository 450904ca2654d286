//! Sweep writer (append-only, one row group per run)
//!
//! Produces sweep containers the [`SweepStore`](super::SweepStore) can read.
//! The write pattern is strictly append-only: accumulate one run's records,
//! `finish_run` to seal its row group, repeat, then `close`. There are no
//! updates — a sweep is immutable once written, matching the read side.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::format::KeyValue;

use crate::error::{Error, Result};

use super::{ParamValue, Series, FORMAT_VERSION};

/// Append-only producer of sweep containers.
///
/// Declared parameter and series names are fixed at creation; every run
/// must provide exactly the declared names (the reader enforces the same
/// invariant on load).
#[derive(Debug)]
pub struct SweepWriter {
    writer: ArrowWriter<File>,
    schema: SchemaRef,
    parameter_names: Vec<String>,
    series_names: Vec<String>,
    next_index: u32,
    kinds: Vec<String>,
    names: Vec<String>,
    payloads: Vec<String>,
}

impl SweepWriter {
    /// Create a sweep file with the given declared schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWrite`] if the declared schema is empty or the
    /// file cannot be created.
    pub fn create<P: AsRef<Path>>(
        path: P,
        parameter_names: &[&str],
        series_names: &[&str],
    ) -> Result<Self> {
        if parameter_names.is_empty() && series_names.is_empty() {
            return Err(Error::StoreWrite(
                "sweep schema must declare at least one parameter or series".into(),
            ));
        }

        let mut metadata = std::collections::HashMap::new();
        metadata.insert(
            "sweep.format_version".to_string(),
            FORMAT_VERSION.to_string(),
        );
        metadata.insert(
            "sweep.parameters".to_string(),
            serde_json::to_string(parameter_names).map_err(|e| Error::StoreWrite(e.to_string()))?,
        );
        metadata.insert(
            "sweep.series".to_string(),
            serde_json::to_string(series_names).map_err(|e| Error::StoreWrite(e.to_string()))?,
        );

        let schema = Arc::new(Schema::new_with_metadata(
            vec![
                Field::new("run_idx", DataType::UInt32, false),
                Field::new("kind", DataType::Utf8, false),
                Field::new("name", DataType::Utf8, false),
                Field::new("payload", DataType::Utf8, false),
            ],
            metadata,
        ));

        let file = File::create(path.as_ref())?;
        let writer = ArrowWriter::try_new(file, schema.clone(), None)
            .map_err(|e| Error::StoreWrite(e.to_string()))?;

        Ok(Self {
            writer,
            schema,
            parameter_names: parameter_names.iter().map(ToString::to_string).collect(),
            series_names: series_names.iter().map(ToString::to_string).collect(),
            next_index: 0,
            kinds: Vec::new(),
            names: Vec::new(),
            payloads: Vec::new(),
        })
    }

    /// Index the next `finish_run` call will seal.
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.next_index as usize
    }

    /// Record one parameter for the current run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWrite`] if `name` is not in the declared schema.
    pub fn add_parameter(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        if !self.parameter_names.iter().any(|n| n == name) {
            return Err(Error::StoreWrite(format!(
                "parameter `{name}` is not declared by the sweep schema"
            )));
        }
        let payload = serde_json::to_string(value).map_err(|e| Error::StoreWrite(e.to_string()))?;
        self.push_row("parameter", name, payload);
        Ok(())
    }

    /// Record one result series for the current run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWrite`] if `name` is undeclared or the series
    /// has mismatched times/values lengths.
    pub fn add_series(&mut self, name: &str, series: &Series) -> Result<()> {
        if series.times.len() != series.values.len() {
            return Err(Error::StoreWrite(format!(
                "series `{name}`: {} times but {} value vectors",
                series.times.len(),
                series.values.len()
            )));
        }
        let payload =
            serde_json::to_string(series).map_err(|e| Error::StoreWrite(e.to_string()))?;
        self.add_series_json(name, &payload)
    }

    /// Record a series whose payload is already JSON-encoded.
    ///
    /// Escape hatch for exporters that hold pre-encoded payloads; the
    /// payload is not validated here, only on load.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWrite`] if `name` is not in the declared schema.
    pub fn add_series_json(&mut self, name: &str, payload: &str) -> Result<()> {
        if !self.series_names.iter().any(|n| n == name) {
            return Err(Error::StoreWrite(format!(
                "series `{name}` is not declared by the sweep schema"
            )));
        }
        self.push_row("series", name, payload.to_string());
        Ok(())
    }

    /// Seal the current run as one row group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWrite`] when the accumulated records do not
    /// cover the declared schema exactly.
    pub fn finish_run(&mut self) -> Result<()> {
        self.check_complete()?;

        let n = self.kinds.len();
        let batch = RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(UInt32Array::from(vec![self.next_index; n])),
                Arc::new(StringArray::from(std::mem::take(&mut self.kinds))),
                Arc::new(StringArray::from(std::mem::take(&mut self.names))),
                Arc::new(StringArray::from(std::mem::take(&mut self.payloads))),
            ],
        )?;

        self.writer
            .write(&batch)
            .map_err(|e| Error::StoreWrite(e.to_string()))?;
        // one row group per run: the reader relies on this alignment
        self.writer
            .flush()
            .map_err(|e| Error::StoreWrite(e.to_string()))?;
        self.next_index += 1;
        Ok(())
    }

    /// Finalize the file, recording the run count in the footer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWrite`] if an unfinished run is pending or the
    /// footer cannot be written.
    pub fn close(mut self) -> Result<()> {
        if !self.kinds.is_empty() {
            return Err(Error::StoreWrite(
                "pending run records: call finish_run before close".into(),
            ));
        }
        self.writer.append_key_value_metadata(KeyValue {
            key: "sweep.run_count".to_string(),
            value: Some(self.next_index.to_string()),
        });
        self.writer
            .close()
            .map_err(|e| Error::StoreWrite(e.to_string()))?;
        Ok(())
    }

    fn push_row(&mut self, kind: &str, name: &str, payload: String) {
        self.kinds.push(kind.to_string());
        self.names.push(name.to_string());
        self.payloads.push(payload);
    }

    fn check_complete(&self) -> Result<()> {
        let mut seen_params = BTreeSet::new();
        let mut seen_series = BTreeSet::new();
        for (kind, name) in self.kinds.iter().zip(self.names.iter()) {
            let seen = if kind == "parameter" {
                &mut seen_params
            } else {
                &mut seen_series
            };
            if !seen.insert(name.as_str()) {
                return Err(Error::StoreWrite(format!(
                    "duplicate {kind} `{name}` in run {}",
                    self.next_index
                )));
            }
        }
        for name in &self.parameter_names {
            if !seen_params.contains(name.as_str()) {
                return Err(Error::StoreWrite(format!(
                    "run {} is missing parameter `{name}`",
                    self.next_index
                )));
            }
        }
        for name in &self.series_names {
            if !seen_series.contains(name.as_str()) {
                return Err(Error::StoreWrite(format!(
                    "run {} is missing series `{name}`",
                    self.next_index
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undeclared_parameter_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            SweepWriter::create(dir.path().join("w.traj"), &["a"], &["s"]).unwrap();
        let err = writer
            .add_parameter("b", &ParamValue::Scalar(1.0))
            .unwrap_err();
        assert!(matches!(err, Error::StoreWrite(_)));
    }

    #[test]
    fn test_incomplete_run_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            SweepWriter::create(dir.path().join("w.traj"), &["a"], &["s"]).unwrap();
        writer.add_parameter("a", &ParamValue::Scalar(1.0)).unwrap();
        // series `s` never added
        let err = writer.finish_run().unwrap_err();
        assert!(matches!(err, Error::StoreWrite(_)));
    }

    #[test]
    fn test_duplicate_record_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SweepWriter::create(dir.path().join("w.traj"), &["a"], &[]).unwrap();
        writer.add_parameter("a", &ParamValue::Scalar(1.0)).unwrap();
        writer.add_parameter("a", &ParamValue::Scalar(2.0)).unwrap();
        let err = writer.finish_run().unwrap_err();
        assert!(matches!(err, Error::StoreWrite(_)));
    }

    #[test]
    fn test_close_with_pending_run_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SweepWriter::create(dir.path().join("w.traj"), &["a"], &[]).unwrap();
        writer.add_parameter("a", &ParamValue::Scalar(1.0)).unwrap();
        let err = writer.close().unwrap_err();
        assert!(matches!(err, Error::StoreWrite(_)));
    }

    #[test]
    fn test_empty_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = SweepWriter::create(dir.path().join("w.traj"), &[], &[]).unwrap_err();
        assert!(matches!(err, Error::StoreWrite(_)));
    }
}
