use chrono::{DateTime, Datelike, Timelike, Utc};
use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::keys::numeric_values;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Year,
    Month,
    Quarter,
    /// "yyyy-MM" string.
    YearMonth,
    /// 1 = Sunday .. 7 = Saturday.
    DayOfWeek,
    Hour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// One branch of a numeric bucketing: `lower` inclusive, `upper` exclusive,
/// either bound optional.
#[derive(Debug, Clone)]
pub struct BucketBranch {
    pub label: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl BucketBranch {
    pub fn new(label: &str, lower: Option<f64>, upper: Option<f64>) -> Self {
        Self {
            label: label.to_string(),
            lower,
            upper,
        }
    }
}

/// A derived column: a pure function of existing columns, evaluated
/// row-independently, producing exactly one output column. Definitions are
/// applied in declaration order, so later ones may read earlier outputs.
#[derive(Debug, Clone)]
pub enum DerivedColumn {
    TimeBucket {
        source: String,
        bucket: TimeBucket,
        name: String,
    },
    Arithmetic {
        left: String,
        op: ArithmeticOp,
        right: String,
        name: String,
    },
    /// First matching branch wins, in declaration order; values outside every
    /// branch, and null inputs, take the default label.
    Bucket {
        source: String,
        branches: Vec<BucketBranch>,
        default_label: String,
        name: String,
    },
    /// Prefer the primary column's value, fall back when it is null.
    Coalesce {
        primary: String,
        fallback: String,
        name: String,
    },
}

impl DerivedColumn {
    pub fn time_bucket(source: &str, bucket: TimeBucket, name: &str) -> Self {
        DerivedColumn::TimeBucket {
            source: source.to_string(),
            bucket,
            name: name.to_string(),
        }
    }

    pub fn arithmetic(left: &str, op: ArithmeticOp, right: &str, name: &str) -> Self {
        DerivedColumn::Arithmetic {
            left: left.to_string(),
            op,
            right: right.to_string(),
            name: name.to_string(),
        }
    }

    pub fn bucket(
        source: &str,
        branches: Vec<BucketBranch>,
        default_label: &str,
        name: &str,
    ) -> Self {
        DerivedColumn::Bucket {
            source: source.to_string(),
            branches,
            default_label: default_label.to_string(),
            name: name.to_string(),
        }
    }

    pub fn coalesce(primary: &str, fallback: &str, name: &str) -> Self {
        DerivedColumn::Coalesce {
            primary: primary.to_string(),
            fallback: fallback.to_string(),
            name: name.to_string(),
        }
    }

    fn evaluate(&self, df: &DataFrame) -> Result<Series> {
        match self {
            DerivedColumn::TimeBucket {
                source,
                bucket,
                name,
            } => time_bucket_series(df, source, *bucket, name),
            DerivedColumn::Arithmetic {
                left,
                op,
                right,
                name,
            } => arithmetic_series(df, left, *op, right, name),
            DerivedColumn::Bucket {
                source,
                branches,
                default_label,
                name,
            } => bucket_series(df, source, branches, default_label, name),
            DerivedColumn::Coalesce {
                primary,
                fallback,
                name,
            } => coalesce_series(df, primary, fallback, name),
        }
    }
}

pub fn apply_derivations(df: &DataFrame, derivations: &[DerivedColumn]) -> Result<DataFrame> {
    let mut output = df.clone();
    for derivation in derivations {
        let column = derivation.evaluate(&output)?;
        output.hstack_mut(&[column.into()])?;
    }
    Ok(output)
}

fn time_bucket_series(
    df: &DataFrame,
    source: &str,
    bucket: TimeBucket,
    name: &str,
) -> Result<Series> {
    let column = df.column(source)?;
    if !matches!(column.dtype(), DataType::Datetime(_, _)) {
        return Err(PipelineError::SchemaMismatch(format!(
            "column '{source}' has dtype {} but a time bucket needs a datetime",
            column.dtype()
        )));
    }
    let values = column.datetime()?;
    let len = values.len();

    if bucket == TimeBucket::YearMonth {
        let mut out: Vec<Option<String>> = Vec::with_capacity(len);
        for idx in 0..len {
            out.push(
                values
                    .get(idx)
                    .and_then(DateTime::<Utc>::from_timestamp_micros)
                    .map(|dt| format!("{:04}-{:02}", dt.year(), dt.month())),
            );
        }
        return Ok(Series::new(name.into(), out));
    }

    let mut out: Vec<Option<i64>> = Vec::with_capacity(len);
    for idx in 0..len {
        let dt = values
            .get(idx)
            .and_then(DateTime::<Utc>::from_timestamp_micros);
        out.push(dt.map(|dt| match bucket {
            TimeBucket::Year => dt.year() as i64,
            TimeBucket::Month => dt.month() as i64,
            TimeBucket::Quarter => ((dt.month() - 1) / 3 + 1) as i64,
            TimeBucket::DayOfWeek => dt.weekday().num_days_from_sunday() as i64 + 1,
            TimeBucket::Hour => dt.hour() as i64,
            TimeBucket::YearMonth => unreachable!("handled above"),
        }));
    }
    Ok(Series::new(name.into(), out))
}

fn arithmetic_series(
    df: &DataFrame,
    left: &str,
    op: ArithmeticOp,
    right: &str,
    name: &str,
) -> Result<Series> {
    let lhs = numeric_values(df, left)?;
    let rhs = numeric_values(df, right)?;

    let mut out = Vec::with_capacity(lhs.len());
    for (a, b) in lhs.into_iter().zip(rhs) {
        out.push(match (a, b) {
            (Some(a), Some(b)) => match op {
                ArithmeticOp::Add => Some(a + b),
                ArithmeticOp::Subtract => Some(a - b),
                ArithmeticOp::Multiply => Some(a * b),
                // Division by zero resolves to null, never a crash.
                ArithmeticOp::Divide => {
                    if b == 0.0 {
                        None
                    } else {
                        Some(a / b)
                    }
                }
            },
            _ => None,
        });
    }
    Ok(Series::new(name.into(), out))
}

fn bucket_series(
    df: &DataFrame,
    source: &str,
    branches: &[BucketBranch],
    default_label: &str,
    name: &str,
) -> Result<Series> {
    let values = numeric_values(df, source)?;

    let mut out: Vec<&str> = Vec::with_capacity(values.len());
    for value in &values {
        let label = match value {
            Some(v) => branches
                .iter()
                .find(|branch| {
                    branch.lower.map_or(true, |lower| *v >= lower)
                        && branch.upper.map_or(true, |upper| *v < upper)
                })
                .map(|branch| branch.label.as_str())
                .unwrap_or(default_label),
            None => default_label,
        };
        out.push(label);
    }
    Ok(Series::new(name.into(), out))
}

fn coalesce_series(df: &DataFrame, primary: &str, fallback: &str, name: &str) -> Result<Series> {
    for column in [primary, fallback] {
        if !matches!(df.column(column)?.dtype(), DataType::String) {
            return Err(PipelineError::SchemaMismatch(format!(
                "coalesce needs string columns but '{column}' is {}",
                df.column(column)?.dtype()
            )));
        }
    }

    let first = df.column(primary)?.str()?;
    let second = df.column(fallback)?.str()?;

    let mut out: Vec<Option<&str>> = Vec::with_capacity(first.len());
    for idx in 0..first.len() {
        out.push(first.get(idx).or_else(|| second.get(idx)));
    }
    Ok(Series::new(name.into(), out))
}
