//! Hot-state KV sink (spec §4.I): `channel:<id>:status` hash with TTL plus
//! a `metrics_update` pub/sub notification, written atomically as
//! `HSET + EXPIRE + PUBLISH` via a Redis pipeline.

use probe_core::model::{ChannelMetrics, ChannelStatus};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{MetricsUpdateEvent, StatusRecord};

/// TTL applied to every status hash (spec §4.I).
pub const STATUS_TTL_SECS: u64 = 30;

const METRICS_UPDATE_CHANNEL: &str = "metrics_update";
const ALERT_UPDATE_CHANNEL: &str = "alert_update";

/// Hot-state sink backed by a Redis connection manager (handles its own
/// reconnects; safe to clone and share across monitor tasks).
#[derive(Clone)]
pub struct HotStateSink {
    conn: ConnectionManager,
}

impl HotStateSink {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    fn key(channel_id: &str) -> String {
        format!("channel:{channel_id}:status")
    }

    /// Write one channel's status record and publish the update.
    /// Sink failures are logged and swallowed (spec §7): the caller never
    /// blocks the monitor loop on a hot-state outage.
    pub async fn publish_metrics(&self, metrics: &ChannelMetrics, status: ChannelStatus) {
        let record = StatusRecord::from_metrics(metrics, status);
        if let Err(err) = self.write(&metrics.channel_id, &record).await {
            warn!(channel_id = %metrics.channel_id, error = %err, "hot-state write failed");
        }
    }

    async fn write(&self, channel_id: &str, record: &StatusRecord) -> Result<()> {
        let key = Self::key(channel_id);
        let fields = record.to_fields();
        let event = MetricsUpdateEvent {
            channel_id: channel_id.to_string(),
            record: record.clone(),
        };
        let payload = serde_json::to_string(&event).unwrap_or_default();

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, STATUS_TTL_SECS as i64)
            .ignore()
            .publish(METRICS_UPDATE_CHANNEL, payload)
            .ignore();
        pipe.query_async::<()>(&mut conn).await?;
        debug!(%channel_id, "hot-state updated");
        Ok(())
    }

    /// Read a channel's status record back, applying TTL semantics (spec
    /// §8 invariant 2): a record older than 30s reads as OFFLINE.
    pub async fn read_status(&self, channel_id: &str) -> Result<Option<StatusRecord>> {
        let key = Self::key(channel_id);
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(StatusRecord::from_fields(&fields)))
    }

    /// Publish an `alert_update` event (spec §6). Used by the alert
    /// manager on new-alert and resolve transitions; failures are logged
    /// and swallowed like every other sink write.
    pub async fn publish_alert_update(&self, event: &crate::models::AlertUpdateEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        let mut conn = self.conn.clone();
        if let Err(err) = conn
            .publish::<_, _, ()>(ALERT_UPDATE_CHANNEL, payload)
            .await
        {
            warn!(alert_id = event.alert_id, error = %err, "alert_update publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn key_format_matches_spec() {
        assert_eq!(HotStateSink::key("ch1"), "channel:ch1:status");
    }

    #[test]
    fn metrics_update_event_serializes_channel_id_and_fields() {
        let metrics = crate::models::tests_support::sample_metrics();
        let record = StatusRecord::from_metrics(&metrics, ChannelStatus::Normal);
        let event = MetricsUpdateEvent {
            channel_id: metrics.channel_id.clone(),
            record,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["channel_id"], "ch1");
        assert_eq!(json["status"], "NORMAL");
        let _ = Utc::now();
    }
}
