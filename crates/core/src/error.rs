use thiserror::Error;

/// Top-level error type shared by every collector crate.
#[derive(Debug, Error)]
pub enum PerfError {
    #[error("config error: {0}")]
    Config(String),

    #[error("sampler error: {0}")]
    Sampler(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("collector has been shut down")]
    ShutDown,

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type Result<T, E = PerfError> = std::result::Result<T, E>;
