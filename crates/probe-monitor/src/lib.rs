//! Per-channel ingest loop and state machine (spec §4.G): wires the TS
//! demux, periodic decode, video/audio analyzers, the status evaluator
//! and the alert manager together, publishing to the hot-state and TSDB
//! sinks on a one-second cadence.

pub mod config;
pub mod error;
pub mod monitor;
pub mod socket;
pub mod state;

pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use monitor::ChannelMonitor;
pub use state::MonitorState;
