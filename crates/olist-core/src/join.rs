use std::collections::HashMap;

use polars::prelude::*;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::keys::{column_keys, KeyValue};

/// `Inner` drops unmatched rows on both sides; `Left` preserves every left row,
/// nulling the right-side columns where no match exists. Changing the kind
/// changes row counts and null patterns, so each pipeline fixes and documents
/// its join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// Hash join on a shared key column. Null keys never match (SQL semantics).
/// The right side's key column is dropped from the output; the left side's
/// copy carries the key. One output row is produced per matched pair.
pub fn join_on(left: &DataFrame, right: &DataFrame, key: &str, kind: JoinKind) -> Result<DataFrame> {
    for (df, side) in [(left, "left"), (right, "right")] {
        if df.column(key).is_err() {
            return Err(PipelineError::JoinKeyMissing {
                key: key.to_string(),
                side: side.to_string(),
            });
        }
    }

    let right_dropped = right.drop(key)?;
    for column in right_dropped.get_column_names() {
        if left.column(column).is_ok() {
            return Err(PipelineError::SchemaMismatch(format!(
                "join on '{key}' would duplicate column '{column}'"
            )));
        }
    }

    let left_keys = column_keys(left, key)?;
    let right_keys = column_keys(right, key)?;

    let mut right_index: HashMap<&KeyValue, Vec<IdxSize>> = HashMap::new();
    for (idx, right_key) in right_keys.iter().enumerate() {
        if matches!(right_key, KeyValue::Null) {
            continue;
        }
        right_index.entry(right_key).or_default().push(idx as IdxSize);
    }

    let mut left_rows: Vec<IdxSize> = Vec::new();
    let mut right_rows: Vec<Option<IdxSize>> = Vec::new();

    for (idx, left_key) in left_keys.iter().enumerate() {
        let matches = if matches!(left_key, KeyValue::Null) {
            None
        } else {
            right_index.get(left_key)
        };
        match matches {
            Some(rows) => {
                for &row in rows {
                    left_rows.push(idx as IdxSize);
                    right_rows.push(Some(row));
                }
            }
            None => {
                if kind == JoinKind::Left {
                    left_rows.push(idx as IdxSize);
                    right_rows.push(None);
                }
            }
        }
    }

    let left_idx = IdxCa::from_vec("".into(), left_rows);
    let mut output = left.take(&left_idx)?;

    let right_idx: IdxCa = right_rows.into_iter().collect();
    let right_taken = right_dropped.take(&right_idx)?;
    output.hstack_mut(right_taken.get_columns())?;

    info!(
        key,
        left = left.height(),
        right = right.height(),
        rows = output.height(),
        "joined record sets"
    );
    Ok(output)
}
