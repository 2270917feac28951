use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("schema mismatch in {}: {}", .path.display(), .reason)]
    SchemaMismatch { path: PathBuf, reason: String },

    #[error("aggregation script failed: {message}")]
    QueryScript { message: String },

    #[error("result table `{0}` does not exist after running the aggregation script")]
    MissingResultTable(String),

    #[error("failed to render {}: {}", .path.display(), .message)]
    Render { path: PathBuf, message: String },

    #[error("failed to export {}: {}", .path.display(), .source)]
    Export {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}
