//! Columnar table store, written as a single JSON document.
//!
//! The document holds one entry per non-empty stream, with each column stored
//! as an array of values. Timestamps are kept as milliseconds since the epoch
//! (`null` when unresolved). Device information and the parse statistics of
//! the session travel alongside the streams.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::debug;

use crate::{avec::Recording, sans::stats::ParseStatistics};

use super::{ExportError, Exporter, Table, Value};

/// Write a recording to `<dir>/<stem>.json`.
#[derive(Debug, Clone)]
pub struct ColumnarExporter {
    path: PathBuf,
}

impl ColumnarExporter {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            path: dir.join(format!("{stem}.json")),
        }
    }
}

#[derive(Serialize)]
struct Document<'a> {
    device: Option<Vec<Column<'a>>>,
    streams: Vec<Stream<'a>>,
    statistics: &'a ParseStatistics,
}

#[derive(Serialize)]
struct Stream<'a> {
    name: &'static str,
    sample_frequency_hz: Option<f64>,
    length: usize,
    columns: Vec<Column<'a>>,
}

#[derive(Serialize)]
struct Column<'a> {
    name: &'a str,
    values: Vec<&'a Value>,
}

fn columns(table: &Table) -> Vec<Column<'_>> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| Column {
            name: name.as_ref(),
            values: table.rows.iter().filter_map(|row| row.get(i)).collect(),
        })
        .collect()
}

impl Exporter for ColumnarExporter {
    fn planned(&self, _: &Recording) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }

    fn write(
        &self,
        recording: &Recording,
        statistics: &ParseStatistics,
    ) -> Result<(), ExportError> {
        let tables: Vec<_> = recording
            .tables()
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect();
        let device = recording.device_table();

        let document = Document {
            device: device.as_ref().map(columns),
            streams: tables
                .iter()
                .map(|t| Stream {
                    name: t.name,
                    sample_frequency_hz: t.sample_frequency_hz,
                    length: t.rows.len(),
                    columns: columns(t),
                })
                .collect(),
            statistics,
        };

        debug!(path = ?self.path, streams = tables.len(), "writing document");

        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.flush()?;

        Ok(())
    }
}
