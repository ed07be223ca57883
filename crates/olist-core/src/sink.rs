use std::fmt;
use std::fs;
use std::path::PathBuf;

use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::DataFrame;
use tracing::info;

use crate::config::RunConfig;
use crate::error::{PipelineError, Result};

/// Fully-qualified destination table, addressed as `<project>.<dataset>.<table>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(project: &str, dataset: &str, table: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }

    pub fn parse(qualified: &str) -> Result<Self> {
        let parts: Vec<&str> = qualified.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
            return Err(PipelineError::Config(format!(
                "table name '{qualified}' is not fully qualified as <project>.<dataset>.<table>"
            )));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Warehouse session scoped to a single run. `open` validates the
/// configuration and claims the staging location; `close` releases it and is
/// expected on both success and failure exit paths.
#[derive(Debug)]
pub struct Warehouse {
    root: PathBuf,
    staging: PathBuf,
}

impl Warehouse {
    pub fn open(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.staging_location)?;
        fs::create_dir_all(&config.warehouse_root)?;
        info!(
            app = %config.app_name,
            root = %config.warehouse_root.display(),
            staging = %config.staging_location.display(),
            "warehouse session opened"
        );
        Ok(Self {
            root: config.warehouse_root.clone(),
            staging: config.staging_location.clone(),
        })
    }

    /// Replaces the full contents of `table` with `df` (never append). Each
    /// call is an independent write; tables already written are not rolled
    /// back when a later one fails.
    pub fn write_table(&self, df: &DataFrame, table: &TableRef) -> Result<()> {
        self.write_table_inner(df, table)
            .map_err(|err| PipelineError::SinkWriteFailure {
                table: table.to_string(),
                message: err.to_string(),
            })?;
        info!(table = %table, rows = df.height(), "wrote table");
        Ok(())
    }

    fn write_table_inner(&self, df: &DataFrame, table: &TableRef) -> Result<()> {
        let staged = self.staging.join(format!("{table}.parquet.tmp"));
        let file = fs::File::create(&staged)?;

        let mut clone = df.clone();
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .finish(&mut clone)?;

        let dest_dir = self.root.join(&table.project).join(&table.dataset);
        fs::create_dir_all(&dest_dir)?;
        let dest = dest_dir.join(format!("{}.parquet", table.table));
        fs::rename(&staged, &dest)?;
        Ok(())
    }

    pub fn table_path(&self, table: &TableRef) -> PathBuf {
        self.root
            .join(&table.project)
            .join(&table.dataset)
            .join(format!("{}.parquet", table.table))
    }

    pub fn close(self) -> Result<()> {
        if self.staging.exists() {
            fs::remove_dir_all(&self.staging)?;
        }
        info!("warehouse session closed");
        Ok(())
    }
}
