use std::fs::File;
use std::path::Path;

use chrono::NaiveDateTime;
use polars::prelude::*;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::schema::{ColumnSpec, ColumnType, TableSchema};

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Reads one CSV source into a DataFrame under a declared schema.
///
/// The header row is required; each declared column is located by name and
/// parsed cell by cell. Empty cells become nulls. A cell that fails its typed
/// parse, or a declared column absent from the header, is a schema mismatch.
/// No retry happens here; the caller halts the run.
pub fn read_csv_source(name: &str, location: &Path, schema: &TableSchema) -> Result<DataFrame> {
    let file = File::open(location).map_err(|source| PipelineError::SourceUnavailable {
        name: name.to_string(),
        location: location.display().to_string(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let mut indices = Vec::with_capacity(schema.columns.len());
    for spec in &schema.columns {
        let idx = headers
            .iter()
            .position(|header| header.trim() == spec.name)
            .ok_or_else(|| {
                PipelineError::SchemaMismatch(format!(
                    "source '{name}': declared column '{}' missing from header",
                    spec.name
                ))
            })?;
        indices.push(idx);
    }

    let mut builders: Vec<ColumnValues> = schema
        .columns
        .iter()
        .map(|spec| ColumnValues::new(spec.dtype))
        .collect();

    for (row_index, record) in reader.records().enumerate() {
        let record = record?;
        for ((builder, spec), &idx) in builders.iter_mut().zip(&schema.columns).zip(&indices) {
            let raw = record.get(idx).unwrap_or("");
            builder.push(name, spec, row_index, raw)?;
        }
    }

    let mut columns: Vec<Column> = Vec::with_capacity(builders.len());
    for (builder, spec) in builders.into_iter().zip(&schema.columns) {
        columns.push(builder.into_series(spec)?.into());
    }

    let df = DataFrame::new(columns)?;
    info!(source = name, rows = df.height(), "loaded source");
    Ok(df)
}

enum ColumnValues {
    Utf8(Vec<Option<String>>),
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Datetime(Vec<Option<i64>>),
}

impl ColumnValues {
    fn new(dtype: ColumnType) -> Self {
        match dtype {
            ColumnType::Utf8 => ColumnValues::Utf8(Vec::new()),
            ColumnType::Int64 => ColumnValues::Int64(Vec::new()),
            ColumnType::Float64 => ColumnValues::Float64(Vec::new()),
            ColumnType::Datetime => ColumnValues::Datetime(Vec::new()),
        }
    }

    fn push(
        &mut self,
        source: &str,
        spec: &ColumnSpec,
        row_index: usize,
        raw: &str,
    ) -> Result<()> {
        let trimmed = raw.trim();
        match self {
            ColumnValues::Utf8(values) => {
                values.push(if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                });
            }
            ColumnValues::Int64(values) => {
                if trimmed.is_empty() {
                    values.push(None);
                } else {
                    let parsed = trimmed.parse::<i64>().map_err(|err| {
                        cell_mismatch(source, spec.name, row_index, "integer", &err.to_string())
                    })?;
                    values.push(Some(parsed));
                }
            }
            ColumnValues::Float64(values) => {
                if trimmed.is_empty() {
                    values.push(None);
                } else {
                    let parsed = trimmed.parse::<f64>().map_err(|err| {
                        cell_mismatch(source, spec.name, row_index, "float", &err.to_string())
                    })?;
                    values.push(Some(parsed));
                }
            }
            ColumnValues::Datetime(values) => {
                if trimmed.is_empty() {
                    values.push(None);
                } else {
                    values.push(Some(parse_timestamp(source, spec.name, row_index, trimmed)?));
                }
            }
        }
        Ok(())
    }

    fn into_series(self, spec: &ColumnSpec) -> Result<Series> {
        let series = match self {
            ColumnValues::Utf8(values) => Series::new(spec.name.into(), values),
            ColumnValues::Int64(values) => Series::new(spec.name.into(), values),
            ColumnValues::Float64(values) => Series::new(spec.name.into(), values),
            ColumnValues::Datetime(values) => Series::new(spec.name.into(), values)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?,
        };
        Ok(series)
    }
}

fn parse_timestamp(source: &str, column: &str, row_index: usize, value: &str) -> Result<i64> {
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(dt.and_utc().timestamp_micros());
        }
    }
    Err(cell_mismatch(
        source,
        column,
        row_index,
        "timestamp",
        &format!("unrecognized value '{value}'"),
    ))
}

fn cell_mismatch(
    source: &str,
    column: &str,
    row_index: usize,
    expected: &str,
    detail: &str,
) -> PipelineError {
    PipelineError::SchemaMismatch(format!(
        "source '{source}' row {row_index}: column '{column}' failed {expected} parse: {detail}"
    ))
}
