use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::sink::TableRef;

/// Explicit run configuration, validated once at startup. The staging location
/// is required by the sink mechanism and must be configured before any write.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub app_name: String,
    pub project: String,
    pub dataset: String,
    pub warehouse_root: PathBuf,
    pub staging_location: PathBuf,
    /// Logical source name -> location of the tabular extract.
    #[serde(default)]
    pub sources: HashMap<String, PathBuf>,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(PipelineError::Config("app_name must not be empty".into()));
        }
        if self.project.trim().is_empty() || self.dataset.trim().is_empty() {
            return Err(PipelineError::Config(
                "project and dataset must not be empty".into(),
            ));
        }
        if self.warehouse_root.as_os_str().is_empty() {
            return Err(PipelineError::Config("warehouse_root must be set".into()));
        }
        if self.staging_location.as_os_str().is_empty() {
            return Err(PipelineError::Config(
                "staging_location must be configured before any write".into(),
            ));
        }
        Ok(())
    }

    pub fn source_location(&self, name: &str) -> Result<&Path> {
        self.sources
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| PipelineError::SourceUnavailable {
                name: name.to_string(),
                location: "<unconfigured>".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "source not present in configuration",
                ),
            })
    }

    /// Fully-qualified destination for a table in the configured dataset.
    pub fn table(&self, name: &str) -> TableRef {
        TableRef::new(&self.project, &self.dataset, name)
    }
}
