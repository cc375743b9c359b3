//! Error types shared across the probe pipeline's non-I/O crates.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
