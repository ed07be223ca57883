pub mod aggregate;
pub mod clean;
pub mod config;
pub mod derive;
pub mod error;
pub mod join;
pub mod keys;
pub mod load;
pub mod pipelines;
pub mod schema;
pub mod sink;
pub mod window;

pub use config::RunConfig;
pub use error::{PipelineError, Result};
pub use pipelines::{
    all_pipeline_descriptors, pipeline_by_code, publish_results, AnalyticsPipeline, NamedResult,
    PipelineDescriptor, RunContext,
};
pub use sink::{TableRef, Warehouse};
