//! Per-channel alert manager (spec §4.H): deduplicates ACTIVE alerts
//! against an in-memory map, upserts/resolves against the SQL store, and
//! publishes `alert_new`/`alert_update` transitions to the hot-state
//! sink's pub/sub channel. One `AlertManager` belongs to exactly one
//! channel monitor — the dedup map is per-monitor, never shared (spec §5).

use std::collections::HashMap;

use chrono::Utc;
use probe_core::model::{Alert, AlertKind, ChannelMetrics};
use probe_sinks::models::AlertUpdateEvent;
use probe_sinks::{HotStateSink, SqlStore};
use tracing::{debug, warn};

/// The fixed set of kinds whose predicate can flip off and trigger a
/// resolve transition. OFFLINE is handled separately since it suppresses
/// every other kind while active (spec §4.F/§4.H).
const TRACKED_KINDS: [AlertKind; 10] = [
    AlertKind::BlackScreen,
    AlertKind::Frozen,
    AlertKind::Silent,
    AlertKind::Clipping,
    AlertKind::CcError,
    AlertKind::PcrJitter,
    AlertKind::BitrateAbnormal,
    AlertKind::Mosaic,
    AlertKind::AudioStutter,
    AlertKind::Offline,
];

/// Per-channel in-memory map `alert_type -> active_alert_id`, plus the
/// sinks a tick's upserts/resolves are dispatched to.
pub struct AlertManager {
    channel_id: String,
    sql: SqlStore,
    hot_state: HotStateSink,
    active: HashMap<AlertKind, i64>,
}

impl AlertManager {
    pub fn new(channel_id: impl Into<String>, sql: SqlStore, hot_state: HotStateSink) -> Self {
        Self {
            channel_id: channel_id.into(),
            sql,
            hot_state,
            active: HashMap::new(),
        }
    }

    /// Preload the dedup map from whatever is currently ACTIVE in the SQL
    /// store for this channel. Call once after construction, before the
    /// first tick: a worker restart otherwise forgets every id it had
    /// cached and would insert duplicate rows for conditions that never
    /// actually resolved (spec §9).
    pub async fn preload_active(&mut self) {
        match self.sql.list_active_alerts(&self.channel_id).await {
            Ok(alerts) => {
                for alert in alerts {
                    if let Some(id) = alert.id {
                        self.active.insert(alert.alert_type, id);
                    }
                }
            }
            Err(err) => {
                warn!(channel_id = %self.channel_id, error = %err, "failed to preload active alerts");
            }
        }
    }

    /// Run one tick's worth of alert transitions (spec §4.H contract).
    ///
    /// `active_kinds` is the set returned by `probe_analysis::evaluate` for
    /// this metrics snapshot; `thumbnail_path` is attached to newly
    /// inserted rows when present.
    pub async fn tick(&mut self, metrics: &ChannelMetrics, active_kinds: &[AlertKind]) {
        for &kind in &TRACKED_KINDS {
            let is_active = active_kinds.contains(&kind);
            if is_active {
                self.upsert(metrics, kind).await;
            } else if self.active.contains_key(&kind) {
                self.resolve(kind).await;
            }
        }
    }

    async fn upsert(&mut self, metrics: &ChannelMetrics, kind: AlertKind) {
        let mut alert = Alert::new_active(&self.channel_id, &metrics.channel_name, kind);
        alert.thumbnail_path = metrics.thumbnail_path.clone();

        let id = match self.sql.upsert_alert(&alert).await {
            Ok(id) => id,
            Err(err) => {
                warn!(channel_id = %self.channel_id, %kind, error = %err, "alert upsert failed");
                return;
            }
        };

        let previous = self.active.insert(kind, id);
        if previous != Some(id) {
            debug!(channel_id = %self.channel_id, %kind, alert_id = id, "alert_new");
            let event = AlertUpdateEvent {
                event_type: "alert_new",
                alert_id: id,
                channel_id: self.channel_id.clone(),
                channel_name: metrics.channel_name.clone(),
                alert_type: kind.as_str().to_string(),
                severity: kind.severity().to_string(),
                status: "ACTIVE".to_string(),
                ts: Utc::now(),
            };
            self.hot_state.publish_alert_update(&event).await;
        }
    }

    async fn resolve(&mut self, kind: AlertKind) {
        let Some(id) = self.active.remove(&kind) else {
            return;
        };
        if let Err(err) = self.sql.resolve_alert(&self.channel_id, kind).await {
            warn!(channel_id = %self.channel_id, %kind, error = %err, "alert resolve failed");
            // Leave the transition unrecorded; it is eventually consistent
            // on next flip (spec §4.H/§7) — re-insert so a future resolve
            // attempt is retried rather than silently forgotten.
            self.active.insert(kind, id);
            return;
        }

        debug!(channel_id = %self.channel_id, %kind, alert_id = id, "alert resolved");
        let event = AlertUpdateEvent {
            event_type: "alert_update",
            alert_id: id,
            channel_id: self.channel_id.clone(),
            channel_name: String::new(),
            alert_type: kind.as_str().to_string(),
            severity: kind.severity().to_string(),
            status: "RESOLVED".to_string(),
            ts: Utc::now(),
        };
        self.hot_state.publish_alert_update(&event).await;
    }

    /// Currently tracked ACTIVE alert ids, for tests/inspection.
    pub fn active_alerts(&self) -> &HashMap<AlertKind, i64> {
        &self.active
    }
}
