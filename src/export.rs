//! Writing recordings out as tables.
//!
//! Every record stream of a [`Recording`](crate::avec::Recording) becomes a
//! [`Table`]: a list of named columns and rows of [`Value`]s, led by the
//! `timestamp` and `resolved` columns. Exporters receive tables already ordered
//! by time and free of duplicate timestamps, and write them without sorting.

use std::{
    borrow::Cow,
    fmt,
    path::{Path, PathBuf},
};

use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{avec::Recording, sans::stats::ParseStatistics};

pub mod columnar;
pub mod csv;

pub use self::columnar::ColumnarExporter;
pub use self::csv::CsvExporter;

/// Derive [`Row`] for a struct with named fields.
///
/// Each field becomes a column, labelled with the field's name. Add
/// `#[column("label")]` to a field to change its label, or `#[column(skip)]`
/// to leave it out. Field types must convert into [`Value`] and implement
/// [`Clone`].
///
/// The macro refers to `Row` and `Value` by name, so both must be in scope.
///
/// ```
/// use sprocket::export::{Row, Value};
///
/// #[derive(Debug, Clone, Row)]
/// struct Battery {
///     #[column("voltage_mv")]
///     voltage: u16,
///     #[column(skip)]
///     note: String,
/// }
/// ```
pub use sprocket_derive::Row;

/// A single row of an exported table.
///
/// See the [`Row`](macro@Row) derive macro for an automatic implementation of
/// this trait.
pub trait Row {
    /// Column labels, stable across every row of a stream.
    fn columns(&self) -> Vec<Cow<'static, str>>;
    /// Values, in the same order as [`Row::columns`].
    fn values(&self) -> Vec<Value>;
}

/// A cell of an exported table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Milliseconds since the Unix epoch.
    Time(u64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Time(ms) => {
                match i64::try_from(*ms).ok().and_then(DateTime::from_timestamp_millis) {
                    Some(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true)),
                    None => write!(f, "{ms}"),
                }
            }
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v.into())
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Missing, Into::into)
    }
}

/// A record stream laid out for export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: &'static str,
    pub columns: Vec<Cow<'static, str>>,
    pub rows: Vec<Vec<Value>>,
    /// Nominal sampling rate, when the stream has one.
    pub sample_frequency_hz: Option<f64>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Output formats with a bundled exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One delimited text file per stream.
    Csv,
    /// A single JSON document of column arrays.
    Columnar,
}

impl Format {
    /// Create an exporter writing into `dir`, naming outputs after `stem`.
    pub fn exporter(self, dir: &Path, stem: &str) -> Box<dyn Exporter> {
        match self {
            Format::Csv => Box::new(CsvExporter::new(dir, stem)),
            Format::Columnar => Box::new(ColumnarExporter::new(dir, stem)),
        }
    }
}

/// Errors occurring while exporting a recording.
#[derive(Debug, Error)]
pub enum ExportError {
    /// An error from the file system.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// An error from the delimited text writer.
    #[error(transparent)]
    Csv(#[from] ::csv::Error),
    /// An error from the JSON writer.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// An output file exists and overwriting was not requested.
    #[error("Output file {0:?} already exists.")]
    Exists(PathBuf),
}

/// Write a recording in some output format.
pub trait Exporter {
    /// Paths of the files [`Exporter::write`] would create for a recording.
    fn planned(&self, recording: &Recording) -> Vec<PathBuf>;

    /// Write a recording, overwriting any existing outputs.
    fn write(&self, recording: &Recording, statistics: &ParseStatistics)
    -> Result<(), ExportError>;

    /// Write a recording, refusing to overwrite existing outputs unless `force`
    /// is set. Returns the paths written.
    fn export(
        &self,
        recording: &Recording,
        statistics: &ParseStatistics,
        force: bool,
    ) -> Result<Vec<PathBuf>, ExportError> {
        let planned = self.planned(recording);

        if !force && let Some(path) = planned.iter().find(|p| p.exists()) {
            Err(ExportError::Exists(path.clone()))?;
        }

        self.write(recording, statistics)?;
        info!(files = planned.len(), "exported recording");

        Ok(planned)
    }
}
