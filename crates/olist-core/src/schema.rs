use polars::prelude::{DataType, TimeUnit};

/// Column types a source may declare. Timestamps are parsed to microsecond
/// epoch values and carried as `Datetime(Microseconds)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Utf8,
    Int64,
    Float64,
    Datetime,
}

impl ColumnType {
    pub fn polars_dtype(&self) -> DataType {
        match self {
            ColumnType::Utf8 => DataType::String,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Datetime => DataType::Datetime(TimeUnit::Microseconds, None),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub dtype: ColumnType,
}

impl ColumnSpec {
    pub const fn new(name: &'static str, dtype: ColumnType) -> Self {
        Self { name, dtype }
    }
}

/// Declared schema for one tabular source. Columns are located by header name;
/// columns present in the file but not declared here are ignored.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: &'static str,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(table: &'static str, columns: Vec<ColumnSpec>) -> Self {
        Self { table, columns }
    }
}
