//! [`CsvSink`] – telemetry persisted as comma-separated rows.
//!
//! The header row is derived from [`TelemetryRecord`]'s serde field names and
//! written before the first record.  Timestamps are RFC 3339.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use teleop_types::{TeleopError, TelemetryRecord};

use crate::telemetry_logger::TelemetrySink;

pub struct CsvSink<W: Write = File> {
    writer: csv::Writer<W>,
}

impl CsvSink<File> {
    /// Create (or truncate) the log file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Telemetry`] when the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, TeleopError> {
        let writer = csv::Writer::from_path(path)
            .map_err(|e| TeleopError::Telemetry(format!("{}: {e}", path.display())))?;
        Ok(Self { writer })
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    /// Flush and hand back the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Telemetry`] when the final flush fails.
    pub fn into_inner(self) -> Result<W, TeleopError> {
        self.writer
            .into_inner()
            .map_err(|e| TeleopError::Telemetry(e.to_string()))
    }
}

impl<W: Write + Send> TelemetrySink for CsvSink<W> {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), TeleopError> {
        self.writer
            .serialize(record)
            .map_err(|e| TeleopError::Telemetry(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), TeleopError> {
        self.writer
            .flush()
            .map_err(|e| TeleopError::Telemetry(e.to_string()))
    }
}
