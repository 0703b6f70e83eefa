pub mod config;
pub mod error;
pub mod history;
pub mod load;
pub mod pipeline;
pub mod process;
pub mod route;
pub mod schema;
pub mod staging;
pub mod storage;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{CleaningSummary, LoadingSummary, Pipeline};
