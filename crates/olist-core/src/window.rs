//! Order-dependent metrics over an aggregated record set: rank and percentile
//! within a partition, moving averages, cumulative sums, and lag-based growth
//! rates. Each operator collects row indices per partition key, sorts the
//! partition by the declared key, and fills output columns aligned to the
//! input row order with a single forward scan.

use std::cmp::Ordering;
use std::collections::HashMap;

use polars::prelude::*;

use crate::error::Result;
use crate::keys::{column_keys, compare_keys, numeric_values, KeyValue};

/// Standard (competition) rank over `value` within each partition: tied values
/// share a rank and the next distinct value resumes at its position. The
/// underlying sort is stable, so tied rows keep their input order; null values
/// order after all non-null values. The percentile is `(rank - 1) / (n - 1)`,
/// and 0.0 for a single-row partition.
pub fn with_rank(
    df: &DataFrame,
    partition_by: &str,
    value: &str,
    descending: bool,
    rank_name: &str,
    pct_name: &str,
) -> Result<DataFrame> {
    let len = df.height();
    let values = numeric_values(df, value)?;

    let mut ranks: Vec<Option<i64>> = vec![None; len];
    let mut percentiles: Vec<Option<f64>> = vec![None; len];

    for bucket in partitions(df, partition_by)? {
        let mut ordered = bucket;
        ordered.sort_by(|&a, &b| compare_values(values[a], values[b], descending));

        let n = ordered.len();
        let mut previous: Option<Option<f64>> = None;
        let mut current_rank = 1i64;

        for (pos, &row) in ordered.iter().enumerate() {
            let this = values[row];
            if let Some(previous) = previous {
                if previous != this {
                    current_rank = pos as i64 + 1;
                }
            }
            previous = Some(this);

            ranks[row] = Some(current_rank);
            percentiles[row] = Some(if n <= 1 {
                0.0
            } else {
                (current_rank - 1) as f64 / (n - 1) as f64
            });
        }
    }

    let mut output = df.clone();
    output.hstack_mut(&[
        Series::new(rank_name.into(), ranks).into(),
        Series::new(pct_name.into(), percentiles).into(),
    ])?;
    Ok(output)
}

/// Mean over the current row and up to `window - 1` preceding rows within the
/// partition, ordered by `order_by`. Boundary rows average over however many
/// rows exist; nulls inside the window are ignored, an all-null window is null.
pub fn with_moving_average(
    df: &DataFrame,
    partition_by: &str,
    order_by: &str,
    value: &str,
    window: usize,
    name: &str,
) -> Result<DataFrame> {
    let window = window.max(1);
    let order_keys = column_keys(df, order_by)?;
    let values = numeric_values(df, value)?;

    let mut out: Vec<Option<f64>> = vec![None; df.height()];

    for bucket in ordered_partitions(df, partition_by, &order_keys)? {
        for (pos, &row) in bucket.iter().enumerate() {
            let start = pos + 1 - window.min(pos + 1);
            let mut sum = 0.0;
            let mut observed = 0u32;
            for &in_window in &bucket[start..=pos] {
                if let Some(value) = values[in_window] {
                    sum += value;
                    observed += 1;
                }
            }
            out[row] = if observed == 0 {
                None
            } else {
                Some(sum / observed as f64)
            };
        }
    }

    let mut output = df.clone();
    output.hstack_mut(&[Series::new(name.into(), out).into()])?;
    Ok(output)
}

/// Running sum of non-null values within the partition; null until the first
/// non-null value appears.
pub fn with_cumulative_sum(
    df: &DataFrame,
    partition_by: &str,
    order_by: &str,
    value: &str,
    name: &str,
) -> Result<DataFrame> {
    let order_keys = column_keys(df, order_by)?;
    let values = numeric_values(df, value)?;

    let mut out: Vec<Option<f64>> = vec![None; df.height()];

    for bucket in ordered_partitions(df, partition_by, &order_keys)? {
        let mut running: Option<f64> = None;
        for &row in &bucket {
            if let Some(value) = values[row] {
                running = Some(running.unwrap_or(0.0) + value);
            }
            out[row] = running;
        }
    }

    let mut output = df.clone();
    output.hstack_mut(&[Series::new(name.into(), out).into()])?;
    Ok(output)
}

/// Lag-1 previous value and growth rate `(current - previous) / previous * 100`
/// within the partition, ordered by `order_by`. The partition's first row has
/// no previous value, so both columns are null there; a previous value of
/// exactly zero also yields a null growth rate. Never a crash.
pub fn with_growth_rate(
    df: &DataFrame,
    partition_by: &str,
    order_by: &str,
    value: &str,
    prev_name: &str,
    growth_name: &str,
) -> Result<DataFrame> {
    let order_keys = column_keys(df, order_by)?;
    let values = numeric_values(df, value)?;

    let len = df.height();
    let mut previous_out: Vec<Option<f64>> = vec![None; len];
    let mut growth_out: Vec<Option<f64>> = vec![None; len];

    for bucket in ordered_partitions(df, partition_by, &order_keys)? {
        let mut lagged: Option<Option<f64>> = None;
        for &row in &bucket {
            if let Some(previous) = lagged {
                previous_out[row] = previous;
                growth_out[row] = match (values[row], previous) {
                    (Some(current), Some(previous)) if previous != 0.0 => {
                        Some((current - previous) / previous * 100.0)
                    }
                    _ => None,
                };
            }
            lagged = Some(values[row]);
        }
    }

    let mut output = df.clone();
    output.hstack_mut(&[
        Series::new(prev_name.into(), previous_out).into(),
        Series::new(growth_name.into(), growth_out).into(),
    ])?;
    Ok(output)
}

fn partitions(df: &DataFrame, partition_by: &str) -> Result<Vec<Vec<usize>>> {
    let keys = column_keys(df, partition_by)?;
    let mut buckets: HashMap<KeyValue, Vec<usize>> = HashMap::new();
    for (idx, key) in keys.into_iter().enumerate() {
        buckets.entry(key).or_default().push(idx);
    }
    Ok(buckets.into_values().collect())
}

fn ordered_partitions(
    df: &DataFrame,
    partition_by: &str,
    order_keys: &[KeyValue],
) -> Result<Vec<Vec<usize>>> {
    let mut buckets = partitions(df, partition_by)?;
    for bucket in &mut buckets {
        bucket.sort_by(|&a, &b| compare_keys(&order_keys[a], &order_keys[b]));
    }
    Ok(buckets)
}

// Nulls order last in either direction.
fn compare_values(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ordering = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        }
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
    }
}
