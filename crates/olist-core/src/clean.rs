use polars::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::keys::{column_keys, non_null_mask, numeric_values, KeyValue};

/// Per-table row filter. Cleaning only drops rows; it never rewrites the rows
/// that survive.
#[derive(Debug, Clone)]
pub enum RowPredicate {
    /// Keep rows whose string cell is one of the allowed values.
    StatusIn {
        column: String,
        allowed: Vec<String>,
    },
    /// Keep rows where the cell is non-null.
    NotNull { column: String },
    /// Keep rows where the numeric cell is strictly positive.
    Positive { column: String },
}

impl RowPredicate {
    pub fn status_in(column: &str, allowed: &[&str]) -> Self {
        RowPredicate::StatusIn {
            column: column.to_string(),
            allowed: allowed.iter().map(|value| value.to_string()).collect(),
        }
    }

    pub fn not_null(column: &str) -> Self {
        RowPredicate::NotNull {
            column: column.to_string(),
        }
    }

    pub fn positive(column: &str) -> Self {
        RowPredicate::Positive {
            column: column.to_string(),
        }
    }

    fn mask(&self, df: &DataFrame) -> Result<Vec<bool>> {
        match self {
            RowPredicate::StatusIn { column, allowed } => {
                let keys = column_keys(df, column)?;
                Ok(keys
                    .iter()
                    .map(|key| match key {
                        KeyValue::Str(value) => allowed.iter().any(|allow| allow == value),
                        _ => false,
                    })
                    .collect())
            }
            RowPredicate::NotNull { column } => non_null_mask(df, column),
            RowPredicate::Positive { column } => {
                let values = numeric_values(df, column)?;
                Ok(values
                    .iter()
                    .map(|value| value.map(|v| v > 0.0).unwrap_or(false))
                    .collect())
            }
        }
    }
}

/// Keeps exactly the rows satisfying every predicate.
pub fn apply_predicates(df: &DataFrame, predicates: &[RowPredicate]) -> Result<DataFrame> {
    if predicates.is_empty() {
        return Ok(df.clone());
    }

    let mut keep = vec![true; df.height()];
    for predicate in predicates {
        let mask = predicate.mask(df)?;
        for (slot, passed) in keep.iter_mut().zip(mask) {
            *slot &= passed;
        }
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let filtered = df.filter(&mask)?;
    info!(
        before = df.height(),
        after = filtered.height(),
        "applied row predicates"
    );
    Ok(filtered)
}
