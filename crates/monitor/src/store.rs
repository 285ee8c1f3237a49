use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use common::{Alert, AlertKind, AlertPriority, Result};

/// Append-only SQLite store of alerts with a read/unread flag.
#[derive(Clone)]
pub struct AlertStore {
    db: SqlitePool,
}

/// Filters for `AlertStore::list`.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub symbol: Option<String>,
    pub kind: Option<AlertKind>,
    pub unread_only: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AlertStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn insert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (id, kind, symbol, timestamp, message, priority, data, read)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
            "#,
        )
        .bind(&alert.id)
        .bind(alert.kind.to_string())
        .bind(&alert.symbol)
        .bind(alert.timestamp.to_rfc3339())
        .bind(&alert.message)
        .bind(alert.priority.to_string())
        .bind(alert.data.to_string())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Alerts matching the filter, newest first. The unread flag rides along
    /// in the returned tuples.
    pub async fn list(&self, filter: &AlertFilter) -> Result<Vec<(Alert, bool)>> {
        let limit = if filter.limit > 0 { filter.limit.min(200) } else { 50 };
        let rows = sqlx::query(
            r#"
            SELECT id, kind, symbol, timestamp, message, priority, data, read
            FROM alerts
            WHERE (?1 IS NULL OR symbol = ?1)
              AND (?2 IS NULL OR kind = ?2)
              AND (?3 = 0 OR read = 0)
              AND (?4 IS NULL OR timestamp >= ?4)
              AND (?5 IS NULL OR timestamp <= ?5)
            ORDER BY timestamp DESC
            LIMIT ?6 OFFSET ?7
            "#,
        )
        .bind(&filter.symbol)
        .bind(filter.kind.map(|k| k.to_string()))
        .bind(filter.unread_only as i64)
        .bind(filter.since.map(|t| t.to_rfc3339()))
        .bind(filter.until.map(|t| t.to_rfc3339()))
        .bind(limit)
        .bind(filter.offset.max(0))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().filter_map(row_to_alert).collect())
    }

    /// Flip one alert to read. Returns false when the id is unknown.
    pub async fn mark_read(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE alerts SET read = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn unread_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM alerts WHERE read = 0")
            .fetch_one(&self.db)
            .await?;
        Ok(row.get("n"))
    }
}

fn row_to_alert(row: sqlx::sqlite::SqliteRow) -> Option<(Alert, bool)> {
    let kind = match row.get::<String, _>("kind").as_str() {
        "signal_change" => AlertKind::SignalChange,
        "trade_executed" => AlertKind::TradeExecuted,
        "stop_loss_hit" => AlertKind::StopLossHit,
        "take_profit_hit" => AlertKind::TakeProfitHit,
        "win_rate_warning" => AlertKind::WinRateWarning,
        "high_win_streak" => AlertKind::HighWinStreak,
        _ => return None,
    };
    let priority = match row.get::<String, _>("priority").as_str() {
        "info" => AlertPriority::Info,
        "warning" => AlertPriority::Warning,
        "critical" => AlertPriority::Critical,
        _ => return None,
    };
    let timestamp = DateTime::parse_from_rfc3339(&row.get::<String, _>("timestamp"))
        .ok()?
        .with_timezone(&Utc);
    let data = serde_json::from_str(&row.get::<String, _>("data")).unwrap_or_default();

    let alert = Alert {
        id: row.get("id"),
        kind,
        symbol: row.get("symbol"),
        timestamp,
        message: row.get("message"),
        priority,
        data,
    };
    let read = row.get::<i64, _>("read") != 0;
    Some((alert, read))
}
