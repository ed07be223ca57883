use std::cmp::Ordering;
use std::fmt;

use polars::prelude::*;

use crate::error::{PipelineError, Result};

/// A grouping/join key cell. Float columns are not usable as keys; grouping on
/// them is a schema mismatch rather than a silent bitwise comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Null,
    Int(i64),
    Str(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Null => write!(f, "null"),
            KeyValue::Int(value) => write!(f, "{value}"),
            KeyValue::Str(value) => write!(f, "{value}"),
        }
    }
}

/// Ascending comparison with nulls ordered last, regardless of direction.
pub fn compare_keys(a: &KeyValue, b: &KeyValue) -> Ordering {
    match (a, b) {
        (KeyValue::Null, KeyValue::Null) => Ordering::Equal,
        (KeyValue::Null, _) => Ordering::Greater,
        (_, KeyValue::Null) => Ordering::Less,
        _ => a.cmp(b),
    }
}

/// Materializes a column as key cells. Supports Utf8 and integer columns.
pub fn column_keys(df: &DataFrame, name: &str) -> Result<Vec<KeyValue>> {
    let column = df.column(name)?;
    let mut keys = Vec::with_capacity(column.len());
    match column.dtype() {
        DataType::String => {
            let values = column.str()?;
            for idx in 0..values.len() {
                keys.push(match values.get(idx) {
                    Some(value) => KeyValue::Str(value.to_string()),
                    None => KeyValue::Null,
                });
            }
        }
        DataType::Int64 => {
            let values = column.i64()?;
            for idx in 0..values.len() {
                keys.push(match values.get(idx) {
                    Some(value) => KeyValue::Int(value),
                    None => KeyValue::Null,
                });
            }
        }
        DataType::Int32 => {
            let values = column.i32()?;
            for idx in 0..values.len() {
                keys.push(match values.get(idx) {
                    Some(value) => KeyValue::Int(value as i64),
                    None => KeyValue::Null,
                });
            }
        }
        other => {
            return Err(PipelineError::SchemaMismatch(format!(
                "column '{name}' has dtype {other} which is not usable as a key"
            )))
        }
    }
    Ok(keys)
}

/// Materializes a numeric column as `f64` cells, widening integers.
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?;
    let mut values = Vec::with_capacity(column.len());
    match column.dtype() {
        DataType::Float64 => {
            let col = column.f64()?;
            for idx in 0..col.len() {
                values.push(col.get(idx));
            }
        }
        DataType::Int64 => {
            let col = column.i64()?;
            for idx in 0..col.len() {
                values.push(col.get(idx).map(|value| value as f64));
            }
        }
        DataType::Int32 => {
            let col = column.i32()?;
            for idx in 0..col.len() {
                values.push(col.get(idx).map(|value| value as f64));
            }
        }
        other => {
            return Err(PipelineError::SchemaMismatch(format!(
                "column '{name}' has non-numeric dtype {other}"
            )))
        }
    }
    Ok(values)
}

pub fn non_null_mask(df: &DataFrame, name: &str) -> Result<Vec<bool>> {
    let series = df.column(name)?.as_materialized_series();
    Ok(series
        .is_not_null()
        .into_iter()
        .map(|value| value.unwrap_or(false))
        .collect())
}

/// Rebuilds a column of key cells under its original dtype.
pub fn series_from_keys(name: &str, dtype: &DataType, keys: &[KeyValue]) -> Result<Series> {
    let series = match dtype {
        DataType::String => {
            let values: Vec<Option<&str>> = keys
                .iter()
                .map(|key| match key {
                    KeyValue::Str(value) => Some(value.as_str()),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), values)
        }
        DataType::Int64 | DataType::Int32 => {
            let values: Vec<Option<i64>> = keys
                .iter()
                .map(|key| match key {
                    KeyValue::Int(value) => Some(*value),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), values).cast(dtype)?
        }
        other => {
            return Err(PipelineError::SchemaMismatch(format!(
                "cannot rebuild key column '{name}' with dtype {other}"
            )))
        }
    };
    Ok(series)
}
