//! External sink contracts (spec §4.I): hot-state KV, batched time-series
//! writer, and the alert/config SQL store. Each sink owns its own client;
//! there is no global singleton (spec design note) — the supervisor
//! constructs them once and hands clones/references to monitors.

pub mod error;
pub mod hotstate;
pub mod models;
pub mod sql;
pub mod tsdb;

pub use error::{Result, SinkError};
pub use hotstate::{HotStateSink, STATUS_TTL_SECS};
pub use models::{AlertUpdateEvent, MetricsUpdateEvent, StatusRecord};
pub use sql::{init_pool, run_migrations, SqlStore};
pub use tsdb::{MetricPoint, TsdbConfig, TsdbSink};
