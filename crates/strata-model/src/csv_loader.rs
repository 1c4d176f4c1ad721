//! Loader for delimited text files (source type `"csv"`).
//!
//! The first record is the header. Column types are inferred from the first
//! `sample_rows` records (default 100): a column is boolean when every
//! non-empty sample is a textual boolean, then datetime, then number, falling
//! back to string. Empty fields and fields that fail to parse as the
//! column's type load as nulls.
//!
//! Options: `delimiter` (one ASCII character, default `,`) and `sample_rows`.

use crate::config::SourceConfig;
use crate::error::{ModelError, ModelResult};
use crate::loader::TableLoader;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::path::Path;
use strata_columnar::{ColumnSchema, ColumnType, Table, TableBuilder, Value};

const DEFAULT_SAMPLE_ROWS: usize = 100;

#[derive(Clone, Copy, Debug, Default)]
pub struct CsvLoader;

impl CsvLoader {
    pub fn new() -> Self {
        Self
    }
}

struct CsvOptions {
    delimiter: u8,
    sample_rows: usize,
}

impl CsvOptions {
    fn from_source(source: &SourceConfig) -> ModelResult<Self> {
        let invalid = |key: &str, value: &str| ModelError::Load {
            name: source.name.clone(),
            message: format!("invalid csv option {key}={value:?}"),
        };

        let delimiter = match source.option("delimiter") {
            None => b',',
            Some("\\t") => b'\t',
            Some(value) => match value.as_bytes() {
                [byte] if byte.is_ascii() => *byte,
                _ => return Err(invalid("delimiter", value)),
            },
        };
        let sample_rows = match source.option("sample_rows") {
            None => DEFAULT_SAMPLE_ROWS,
            Some(value) => value
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid("sample_rows", value))?,
        };
        Ok(Self {
            delimiter,
            sample_rows,
        })
    }

    fn reader(&self, path: &Path) -> ModelResult<csv::Reader<std::fs::File>> {
        Ok(csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?)
    }
}

impl TableLoader for CsvLoader {
    fn source_type(&self) -> &str {
        "csv"
    }

    fn discover_schema(&self, source: &SourceConfig) -> ModelResult<Vec<ColumnSchema>> {
        let options = CsvOptions::from_source(source)?;
        let mut reader = options.reader(source.require_path()?)?;
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(ModelError::Load {
                name: source.name.clone(),
                message: "csv input has no header".to_string(),
            });
        }

        let mut samples = Vec::with_capacity(options.sample_rows);
        for record in reader.records().take(options.sample_rows) {
            samples.push(record?);
        }

        Ok(headers
            .iter()
            .enumerate()
            .map(|(idx, name)| ColumnSchema::new(name, infer_column_type(&samples, idx)))
            .collect())
    }

    fn load(&self, source: &SourceConfig, schema: &[ColumnSchema]) -> ModelResult<Table> {
        let options = CsvOptions::from_source(source)?;
        let mut reader = options.reader(source.require_path()?)?;
        let width = reader.headers()?.len();
        if width != schema.len() {
            return Err(ModelError::Load {
                name: source.name.clone(),
                message: format!("schema has {} columns, file has {width}", schema.len()),
            });
        }

        let column_types: Vec<ColumnType> = schema.iter().map(|c| c.column_type).collect();
        let mut builder = TableBuilder::new(source.name.clone(), schema.to_vec())?;
        let mut row = vec![Value::Null; width];
        let mut record = StringRecord::new();
        while reader.read_record(&mut record)? {
            for (idx, column_type) in column_types.iter().copied().enumerate() {
                row[idx] = parse_typed_value(record.get(idx).unwrap_or(""), column_type);
            }
            builder.append_row(&row)?;
        }

        log::debug!("read {} rows from {}", builder.row_count(), source.name);
        Ok(builder.finalize())
    }
}

fn infer_column_type(samples: &[StringRecord], idx: usize) -> ColumnType {
    let mut is_bool = true;
    let mut is_datetime = true;
    let mut is_number = true;
    let mut seen = false;

    for field in samples.iter().filter_map(|r| r.get(idx)) {
        if field.is_empty() {
            continue;
        }
        seen = true;
        is_bool &= parse_bool(field).is_some();
        is_datetime &= parse_datetime_nanos(field).is_some();
        is_number &= parse_number(field).is_some();
    }

    if !seen {
        ColumnType::String
    } else if is_bool {
        ColumnType::Boolean
    } else if is_datetime {
        ColumnType::DateTime
    } else if is_number {
        ColumnType::Number
    } else {
        ColumnType::String
    }
}

fn parse_typed_value(field: &str, column_type: ColumnType) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    let parsed = match column_type {
        ColumnType::Number => parse_number(field).map(Value::Number),
        ColumnType::Boolean => parse_bool(field).map(Value::Boolean),
        ColumnType::DateTime => parse_datetime_nanos(field).map(Value::DateTime),
        ColumnType::String => Some(Value::from(field)),
    };
    parsed.unwrap_or(Value::Null)
}

/// Textual booleans only; `0` and `1` stay numbers.
fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_number(v: &str) -> Option<f64> {
    v.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// RFC 3339, or a naive date / date-time taken as UTC.
fn parse_datetime_nanos(v: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return dt.timestamp_nanos_opt();
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(v, format) {
            return dt.and_utc().timestamp_nanos_opt();
        }
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)?
        .and_utc()
        .timestamp_nanos_opt()
}
