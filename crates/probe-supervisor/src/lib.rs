//! Worker supervision (spec §4.J): shard enabled channels across OS
//! processes, poll liveness, restart dead workers with their original
//! shard. `shard`/`process` are used by the `probe-daemon` binary's
//! `supervisor` subcommand; `worker` is used by its `worker` subcommand.

pub mod process;
pub mod shard;
pub mod worker;

pub use process::{ProcessSupervisor, LIVENESS_POLL_INTERVAL, SHUTDOWN_JOIN_TIMEOUT};
pub use shard::{partition, resolve_chunk_size, DEFAULT_CHANNELS_PER_WORKER};
pub use worker::run_worker;
