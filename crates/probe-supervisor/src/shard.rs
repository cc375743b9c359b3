//! Channel sharding (spec §4.J): partition enabled channels into
//! disjoint chunks, one chunk per worker process.

use probe_core::model::ChannelConfig;

/// Default channels-per-worker chunk size (spec §6 `CHANNELS_PER_WORKER`).
pub const DEFAULT_CHANNELS_PER_WORKER: usize = 25;

/// Split `channels` into chunks of at most `channels_per_worker`,
/// preserving order (so `sort_order` groupings land on predictable
/// shards run to run).
pub fn partition(channels: Vec<ChannelConfig>, channels_per_worker: usize) -> Vec<Vec<ChannelConfig>> {
    if channels.is_empty() {
        return Vec::new();
    }
    let chunk_size = channels_per_worker.max(1);
    channels
        .chunks(chunk_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Resolve a chunk size from the `WORKER_COUNT` / `CHANNELS_PER_WORKER`
/// env knobs (spec §6): an explicit `WORKER_COUNT` takes precedence and
/// spreads channels evenly across that many workers; otherwise fall back
/// to `CHANNELS_PER_WORKER` (default [`DEFAULT_CHANNELS_PER_WORKER`]).
pub fn resolve_chunk_size(total_channels: usize, worker_count: Option<usize>, channels_per_worker: usize) -> usize {
    match worker_count {
        Some(n) if n > 0 && total_channels > 0 => total_channels.div_ceil(n),
        _ => channels_per_worker.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str) -> ChannelConfig {
        ChannelConfig {
            id: id.to_string(),
            display_name: id.to_string(),
            multicast_group: "239.1.1.1".parse().unwrap(),
            port: 1234,
            group_tag: "default".to_string(),
            sort_order: 0,
            enabled: true,
            expected_bitrate_kbps: 0.0,
        }
    }

    #[test]
    fn partitions_into_disjoint_chunks() {
        let channels: Vec<_> = (0..7).map(|i| channel(&i.to_string())).collect();
        let shards = partition(channels, 3);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0].len(), 3);
        assert_eq!(shards[2].len(), 1);
    }

    #[test]
    fn empty_channel_list_yields_no_shards() {
        assert!(partition(Vec::new(), 10).is_empty());
    }

    #[test]
    fn worker_count_overrides_chunk_size() {
        assert_eq!(resolve_chunk_size(100, Some(4), 25), 25);
        assert_eq!(resolve_chunk_size(10, Some(3), 25), 4);
        assert_eq!(resolve_chunk_size(10, None, 25), 25);
    }
}
