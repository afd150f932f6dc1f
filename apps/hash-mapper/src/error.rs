use std::path::PathBuf;

use domain::pipeline::PipelineError;
use domain::CoreError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("reading charset file '{}': {source}", path.display())]
    Charset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("enumeration task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("encoding run report: {0}")]
    Report(#[from] serde_json::Error),
}
