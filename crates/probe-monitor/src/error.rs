//! Errors surfaced by the channel monitor loop (spec §4.G/§7). None of
//! these are fatal to the monitor: every call site degrades per the
//! taxonomy in spec §7 rather than propagating `?` out of `run`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("udp socket bind failed: {0}")]
    SocketBind(#[source] std::io::Error),

    #[error("multicast join failed: {0}")]
    MulticastJoin(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
