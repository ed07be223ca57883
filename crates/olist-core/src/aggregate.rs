use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use polars::prelude::*;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::keys::{
    column_keys, compare_keys, non_null_mask, numeric_values, series_from_keys, KeyValue,
};

/// `Count` counts non-null cells; `Sum`/`Mean`/`Min`/`Max` ignore nulls and are
/// null for an all-null group; `CountDistinct` counts distinct non-null keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Sum,
    Count,
    CountDistinct,
    Mean,
    Min,
    Max,
}

#[derive(Debug, Clone)]
pub struct AggregateColumn {
    pub source: String,
    pub function: AggregateFunction,
    pub name: String,
}

impl AggregateColumn {
    pub fn new(source: &str, function: AggregateFunction, name: &str) -> Self {
        Self {
            source: source.to_string(),
            function,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: false,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub group_by: Vec<String>,
    pub aggregates: Vec<AggregateColumn>,
    pub sort: Vec<SortKey>,
}

enum SourceValues {
    Numeric(Vec<Option<f64>>),
    Keys(Vec<KeyValue>),
    Mask(Vec<bool>),
}

#[derive(Clone, Default)]
struct Accumulator {
    sum: f64,
    observed: u64,
    count: u64,
    distinct: HashSet<KeyValue>,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.observed += 1;
        self.min = Some(self.min.map_or(value, |current| current.min(value)));
        self.max = Some(self.max.map_or(value, |current| current.max(value)));
    }

    fn finish(&self, function: AggregateFunction) -> Cell {
        match function {
            AggregateFunction::Sum => Cell::Float(if self.observed == 0 {
                None
            } else {
                Some(self.sum)
            }),
            AggregateFunction::Mean => Cell::Float(if self.observed == 0 {
                None
            } else {
                Some(self.sum / self.observed as f64)
            }),
            AggregateFunction::Min => Cell::Float(self.min),
            AggregateFunction::Max => Cell::Float(self.max),
            AggregateFunction::Count => Cell::Int(self.count as i64),
            AggregateFunction::CountDistinct => Cell::Int(self.distinct.len() as i64),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Cell {
    Float(Option<f64>),
    Int(i64),
}

impl Cell {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(value) => *value,
            Cell::Int(value) => Some(*value as f64),
        }
    }
}

struct OutputRow {
    keys: Vec<KeyValue>,
    cells: Vec<Cell>,
}

/// Full recomputation: one output row per distinct group-key combination,
/// sorted by the declared keys. An empty input yields zero rows with the full
/// output schema. Aggregation is order-independent by construction.
pub fn aggregate(df: &DataFrame, spec: &AggregateSpec) -> Result<DataFrame> {
    let key_columns: Vec<Vec<KeyValue>> = spec
        .group_by
        .iter()
        .map(|name| column_keys(df, name))
        .collect::<Result<_>>()?;
    let key_dtypes: Vec<DataType> = spec
        .group_by
        .iter()
        .map(|name| df.column(name).map(|column| column.dtype().clone()))
        .collect::<std::result::Result<_, _>>()?;

    let inputs: Vec<SourceValues> = spec
        .aggregates
        .iter()
        .map(|agg| match agg.function {
            AggregateFunction::Sum
            | AggregateFunction::Mean
            | AggregateFunction::Min
            | AggregateFunction::Max => numeric_values(df, &agg.source).map(SourceValues::Numeric),
            AggregateFunction::Count => non_null_mask(df, &agg.source).map(SourceValues::Mask),
            AggregateFunction::CountDistinct => {
                column_keys(df, &agg.source).map(SourceValues::Keys)
            }
        })
        .collect::<Result<_>>()?;

    let mut group_lookup: HashMap<Vec<KeyValue>, usize> = HashMap::new();
    let mut group_keys: Vec<Vec<KeyValue>> = Vec::new();
    let mut states: Vec<Vec<Accumulator>> = Vec::new();

    for row in 0..df.height() {
        let key: Vec<KeyValue> = key_columns.iter().map(|column| column[row].clone()).collect();
        let slot = match group_lookup.get(&key) {
            Some(&slot) => slot,
            None => {
                group_lookup.insert(key.clone(), states.len());
                group_keys.push(key);
                states.push(vec![Accumulator::default(); spec.aggregates.len()]);
                states.len() - 1
            }
        };

        for (accumulator, input) in states[slot].iter_mut().zip(&inputs) {
            match input {
                SourceValues::Numeric(values) => {
                    if let Some(value) = values[row] {
                        accumulator.observe(value);
                    }
                }
                SourceValues::Mask(mask) => {
                    if mask[row] {
                        accumulator.count += 1;
                    }
                }
                SourceValues::Keys(keys) => {
                    if keys[row] != KeyValue::Null {
                        accumulator.distinct.insert(keys[row].clone());
                    }
                }
            }
        }
    }

    let mut rows: Vec<OutputRow> = group_keys
        .into_iter()
        .zip(states)
        .map(|(keys, accumulators)| OutputRow {
            keys,
            cells: accumulators
                .iter()
                .zip(&spec.aggregates)
                .map(|(accumulator, agg)| accumulator.finish(agg.function))
                .collect(),
        })
        .collect();

    sort_rows(&mut rows, spec)?;

    let mut columns: Vec<Column> = Vec::with_capacity(spec.group_by.len() + spec.aggregates.len());
    for (pos, name) in spec.group_by.iter().enumerate() {
        let keys: Vec<KeyValue> = rows.iter().map(|row| row.keys[pos].clone()).collect();
        columns.push(series_from_keys(name, &key_dtypes[pos], &keys)?.into());
    }
    for (pos, agg) in spec.aggregates.iter().enumerate() {
        let series = match agg.function {
            AggregateFunction::Count | AggregateFunction::CountDistinct => {
                let values: Vec<i64> = rows
                    .iter()
                    .map(|row| match row.cells[pos] {
                        Cell::Int(value) => value,
                        Cell::Float(_) => unreachable!("count cells are integers"),
                    })
                    .collect();
                Series::new(agg.name.as_str().into(), values)
            }
            _ => {
                let values: Vec<Option<f64>> = rows
                    .iter()
                    .map(|row| match row.cells[pos] {
                        Cell::Float(value) => value,
                        Cell::Int(value) => Some(value as f64),
                    })
                    .collect();
                Series::new(agg.name.as_str().into(), values)
            }
        };
        columns.push(series.into());
    }

    let output = DataFrame::new(columns)?;
    info!(rows = df.height(), groups = output.height(), "aggregated record set");
    Ok(output)
}

fn sort_rows(rows: &mut [OutputRow], spec: &AggregateSpec) -> Result<()> {
    enum SortTarget {
        Key(usize),
        Cell(usize),
    }

    let mut targets = Vec::with_capacity(spec.sort.len());
    for sort_key in &spec.sort {
        let target = if let Some(pos) = spec.group_by.iter().position(|name| *name == sort_key.column)
        {
            SortTarget::Key(pos)
        } else if let Some(pos) = spec
            .aggregates
            .iter()
            .position(|agg| agg.name == sort_key.column)
        {
            SortTarget::Cell(pos)
        } else {
            return Err(PipelineError::SchemaMismatch(format!(
                "sort column '{}' is neither a group key nor an aggregate",
                sort_key.column
            )));
        };
        targets.push((target, sort_key.descending));
    }

    rows.sort_by(|a, b| {
        for (target, descending) in &targets {
            let ordering = match target {
                SortTarget::Key(pos) => {
                    let ordering = compare_keys(&a.keys[*pos], &b.keys[*pos]);
                    direct(ordering, *descending, &a.keys[*pos], &b.keys[*pos])
                }
                SortTarget::Cell(pos) => {
                    compare_cells(&a.cells[*pos], &b.cells[*pos], *descending)
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

// Nulls sort last regardless of direction; only the non-null ordering flips.
fn direct(ordering: Ordering, descending: bool, a: &KeyValue, b: &KeyValue) -> Ordering {
    if descending && *a != KeyValue::Null && *b != KeyValue::Null {
        ordering.reverse()
    } else {
        ordering
    }
}

fn compare_cells(a: &Cell, b: &Cell, descending: bool) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
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
