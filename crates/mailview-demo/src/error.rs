use std::path::PathBuf;

use mailview_core::ConfigError;
use mailview_runtime::RouteError;
use mailview_runtime::logging::LogInitError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DemoError>;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("config error in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error("invalid config: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("invalid server address: {0}")]
    Route(#[from] RouteError),

    #[error("logging setup failed: {0}")]
    Log(#[from] LogInitError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no data received within {seconds}s")]
    NoData { seconds: u64 },
}

impl DemoError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::InvalidConfig(_) | Self::Route(_) => 2,
            Self::NoData { .. } => 3,
            Self::Log(_) | Self::Json(_) => 1,
        }
    }
}
