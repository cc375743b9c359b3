//! Config/alert SQL store (spec §4.I/§6): `channels`, `alerts`,
//! `alert_suppression` tables, backed by SQLite via sqlx, following the
//! teacher's `database::init_pool`/`run_migrations` idiom (WAL mode,
//! bounded pool, migrations embedded at compile time).

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use probe_core::model::{Alert, AlertKind, AlertSeverity, AlertStatus, ChannelConfig};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::error::{Result, SinkError};

const DEFAULT_POOL_SIZE: u32 = 10;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize the SQLite pool with WAL mode, mirroring the teacher's
/// `database::init_pool` tuning.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(SinkError::from)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    info!("sql store pool initialized (WAL mode, {DEFAULT_POOL_SIZE} max connections)");
    Ok(pool)
}

/// Run the embedded migrations (spec §7 fatal case: missing schema at
/// startup is resolved by creating the tables here).
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Config/alert SQL store handle, owned by the supervisor and handed to
/// monitors (spec design note: no global singleton).
#[derive(Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Load every enabled channel, ordered by `sort_order` (loaded once by
    /// the supervisor at startup, spec §3).
    pub async fn load_enabled_channels(&self) -> Result<Vec<ChannelConfig>> {
        let rows = sqlx::query(
            "SELECT id, name, multicast_ip, multicast_port, group_name, sort_order, \
             enabled, expected_bitrate_kbps FROM channels WHERE enabled = 1 ORDER BY sort_order",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut channels = Vec::with_capacity(rows.len());
        for row in rows {
            let multicast_ip: String = row.try_get("multicast_ip")?;
            let multicast_group = Ipv4Addr::from_str(&multicast_ip)
                .map_err(|e| SinkError::Sql(sqlx::Error::Decode(Box::new(e))))?;
            channels.push(ChannelConfig {
                id: row.try_get("id")?,
                display_name: row.try_get("name")?,
                multicast_group,
                port: row.try_get::<i64, _>("multicast_port")? as u16,
                group_tag: row.try_get("group_name")?,
                sort_order: row.try_get("sort_order")?,
                enabled: row.try_get("enabled")?,
                expected_bitrate_kbps: row.try_get("expected_bitrate_kbps")?,
            });
        }
        Ok(channels)
    }

    /// Find the id of the currently ACTIVE alert for `(channel_id,
    /// alert_type)`, if any (at most one by spec §3 invariant 1).
    pub async fn find_active_alert_id(
        &self,
        channel_id: &str,
        alert_type: AlertKind,
    ) -> Result<Option<i64>> {
        let row = sqlx::query(
            "SELECT id FROM alerts WHERE channel_id = ? AND alert_type = ? AND status = 'ACTIVE'",
        )
        .bind(channel_id)
        .bind(alert_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<i64, _>("id")))
    }

    /// Load every ACTIVE alert row for a channel, reconstructed as typed
    /// [`Alert`] values. Used to preload a freshly (re)started monitor's
    /// in-memory dedup map so a worker restart doesn't insert duplicate
    /// rows for conditions that are still active (spec §9: ACTIVE rows
    /// otherwise linger untracked until the condition flips off and on).
    pub async fn list_active_alerts(&self, channel_id: &str) -> Result<Vec<Alert>> {
        let rows = sqlx::query(
            "SELECT id, channel_id, channel_name, alert_type, severity, status, message, \
             started_at, resolved_at, ack_at, thumbnail_path FROM alerts \
             WHERE channel_id = ? AND status = 'ACTIVE'",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        let mut alerts = Vec::with_capacity(rows.len());
        for row in rows {
            let alert_type: String = row.try_get("alert_type")?;
            let severity: String = row.try_get("severity")?;
            let status: String = row.try_get("status")?;
            alerts.push(Alert {
                id: Some(row.try_get("id")?),
                channel_id: row.try_get("channel_id")?,
                channel_name: row.try_get("channel_name")?,
                alert_type: AlertKind::from_str(&alert_type)
                    .map_err(|e| SinkError::Sql(sqlx::Error::Decode(Box::new(e))))?,
                severity: severity_from_str(&severity),
                status: alert_status_from_str(&status),
                message: row.try_get("message")?,
                started_at: row.try_get("started_at")?,
                resolved_at: row.try_get("resolved_at")?,
                ack_at: row.try_get("ack_at")?,
                thumbnail_path: row.try_get("thumbnail_path")?,
            });
        }
        Ok(alerts)
    }

    /// Upsert contract (spec §4.H): if no ACTIVE row exists for `(channel_id,
    /// alert_type)`, insert one and return its new id; otherwise return the
    /// existing id unchanged. Idempotent under repeated calls (spec §8).
    pub async fn upsert_alert(&self, alert: &Alert) -> Result<i64> {
        if let Some(existing) = self
            .find_active_alert_id(&alert.channel_id, alert.alert_type)
            .await?
        {
            return Ok(existing);
        }

        let result = sqlx::query(
            "INSERT INTO alerts (channel_id, channel_name, alert_type, severity, status, \
             message, started_at, thumbnail_path) VALUES (?, ?, ?, ?, 'ACTIVE', ?, ?, ?)",
        )
        .bind(&alert.channel_id)
        .bind(&alert.channel_name)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.to_string())
        .bind(&alert.message)
        .bind(alert.started_at)
        .bind(&alert.thumbnail_path)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Resolve the ACTIVE alert for `(channel_id, alert_type)`, if any.
    /// Idempotent: a second call with nothing ACTIVE is a no-op.
    pub async fn resolve_alert(&self, channel_id: &str, alert_type: AlertKind) -> Result<()> {
        sqlx::query(
            "UPDATE alerts SET status = 'RESOLVED', resolved_at = ? \
             WHERE channel_id = ? AND alert_type = ? AND status = 'ACTIVE'",
        )
        .bind(Utc::now())
        .bind(channel_id)
        .bind(alert_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Acknowledge an ACTIVE alert (external human action, spec §7).
    pub async fn acknowledge_alert(&self, alert_id: i64) -> Result<()> {
        sqlx::query("UPDATE alerts SET status = 'ACKNOWLEDGED', ack_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(alert_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Startup sweep (spec §9 open question, resolved in SPEC_FULL.md):
    /// resolve every ACTIVE alert belonging to a channel that is disabled
    /// or no longer present, before the supervisor spawns workers.
    pub async fn sweep_alerts_for_disabled_channels(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE alerts SET status = 'RESOLVED', resolved_at = ? \
             WHERE status = 'ACTIVE' AND channel_id NOT IN \
             (SELECT id FROM channels WHERE enabled = 1)",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Current suppression deadline for `(channel_id, alert_type)`, a
    /// unix-seconds float, if a suppression row exists and hasn't expired.
    pub async fn suppressed_until(
        &self,
        channel_id: &str,
        alert_type: AlertKind,
    ) -> Result<Option<f64>> {
        let row = sqlx::query(
            "SELECT suppressed_until FROM alert_suppression WHERE channel_id = ? AND alert_type = ?",
        )
        .bind(channel_id)
        .bind(alert_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<f64, _>("suppressed_until")))
    }
}

pub(crate) fn alert_status_from_str(s: &str) -> AlertStatus {
    match s {
        "ACKNOWLEDGED" => AlertStatus::Acknowledged,
        "RESOLVED" => AlertStatus::Resolved,
        _ => AlertStatus::Active,
    }
}

pub(crate) fn severity_from_str(s: &str) -> AlertSeverity {
    match s {
        "CRITICAL" => AlertSeverity::Critical,
        _ => AlertSeverity::Warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_core::model::Alert;

    async fn memory_store() -> SqlStore {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlStore::new(pool)
    }

    #[tokio::test]
    async fn upsert_is_idempotent_for_same_active_alert() {
        let store = memory_store().await;
        let alert = Alert::new_active("ch1", "Channel 1", AlertKind::BlackScreen);

        let id1 = store.upsert_alert(&alert).await.unwrap();
        let id2 = store.upsert_alert(&alert).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn resolve_then_upsert_creates_a_new_row() {
        let store = memory_store().await;
        let alert = Alert::new_active("ch1", "Channel 1", AlertKind::Frozen);

        let id1 = store.upsert_alert(&alert).await.unwrap();
        store.resolve_alert("ch1", AlertKind::Frozen).await.unwrap();
        let id2 = store.upsert_alert(&alert).await.unwrap();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn sweep_resolves_only_disabled_channel_alerts() {
        let store = memory_store().await;
        sqlx::query(
            "INSERT INTO channels (id, name, multicast_ip, enabled) VALUES \
             ('on', 'On', '239.1.1.1', 1), ('off', 'Off', '239.1.1.2', 0)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        store
            .upsert_alert(&Alert::new_active("on", "On", AlertKind::CcError))
            .await
            .unwrap();
        store
            .upsert_alert(&Alert::new_active("off", "Off", AlertKind::CcError))
            .await
            .unwrap();

        let swept = store.sweep_alerts_for_disabled_channels().await.unwrap();
        assert_eq!(swept, 1);
        assert!(store
            .find_active_alert_id("on", AlertKind::CcError)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_active_alert_id("off", AlertKind::CcError)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn status_and_severity_parse_helpers_round_trip() {
        assert_eq!(alert_status_from_str("ACTIVE"), AlertStatus::Active);
        assert_eq!(severity_from_str("WARNING"), AlertSeverity::Warning);
    }

    #[tokio::test]
    async fn list_active_alerts_reconstructs_typed_rows_and_excludes_resolved() {
        let store = memory_store().await;
        store
            .upsert_alert(&Alert::new_active("ch1", "Channel 1", AlertKind::BlackScreen))
            .await
            .unwrap();
        store
            .upsert_alert(&Alert::new_active("ch1", "Channel 1", AlertKind::Frozen))
            .await
            .unwrap();
        store.resolve_alert("ch1", AlertKind::Frozen).await.unwrap();

        let active = store.list_active_alerts("ch1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].alert_type, AlertKind::BlackScreen);
        assert_eq!(active[0].severity, AlertSeverity::Critical);
        assert_eq!(active[0].status, AlertStatus::Active);
        assert!(active[0].id.is_some());
    }
}
