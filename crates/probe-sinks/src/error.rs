//! Sink error taxonomy (spec §7): all sink failures are logged and
//! swallowed by callers, never fatal to a monitor.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sql store error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("sql migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("hot-state store error: {0}")]
    HotState(#[from] redis::RedisError),

    #[error("time-series write failed: {0}")]
    Tsdb(#[from] reqwest::Error),

    #[error("time-series endpoint returned {status}: {body}")]
    TsdbResponse {
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, SinkError>;
