//! Delimited text exporter, writing one file per record stream.

use std::path::{Path, PathBuf};

use ::csv::Writer;
use tracing::debug;

use crate::{avec::Recording, sans::stats::ParseStatistics};

use super::{ExportError, Exporter, Table};

/// Write each non-empty stream to `<dir>/<stem>_<stream>.csv`, plus the device
/// information to `<dir>/<stem>_device.csv`.
///
/// Timestamps are written as ISO-8601 in UTC, with millisecond precision.
/// Unresolved timestamps are left empty.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    dir: PathBuf,
    stem: String,
}

impl CsvExporter {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            stem: stem.to_owned(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}_{name}.csv", self.stem))
    }

    fn tables(recording: &Recording) -> impl Iterator<Item = Table> {
        recording
            .tables()
            .into_iter()
            .chain(recording.device_table())
            .filter(|t| !t.is_empty())
    }
}

impl Exporter for CsvExporter {
    fn planned(&self, recording: &Recording) -> Vec<PathBuf> {
        Self::tables(recording).map(|t| self.path(t.name)).collect()
    }

    fn write(&self, recording: &Recording, _: &ParseStatistics) -> Result<(), ExportError> {
        for table in Self::tables(recording) {
            let path = self.path(table.name);
            debug!(?path, rows = table.rows.len(), "writing table");

            let mut writer = Writer::from_path(&path)?;
            writer.write_record(table.columns.iter().map(|c| c.as_bytes()))?;

            for row in &table.rows {
                writer.write_record(row.iter().map(|v| v.to_string()))?;
            }

            writer.flush()?;
        }

        Ok(())
    }
}
