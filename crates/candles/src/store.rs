use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use common::{Candle, Result, Timeframe};

/// Append-only SQLite store of closed candles, keyed by
/// `(symbol, timeframe, period_start)`. Duplicate writes are ignored.
#[derive(Clone)]
pub struct CandleStore {
    db: SqlitePool,
}

impl CandleStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a closed candle. Writing the same bucket twice is a no-op.
    pub async fn insert(&self, candle: &Candle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO candles (symbol, timeframe, period_start, open, high, low, close, volume)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(symbol, timeframe, period_start) DO NOTHING
            "#,
        )
        .bind(&candle.symbol)
        .bind(candle.timeframe.to_string())
        .bind(candle.period_start.to_rfc3339())
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// The most recent `limit` candles for a symbol/timeframe, oldest first.
    pub async fn recent(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: i64,
    ) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, period_start, open, high, low, close, volume
            FROM candles
            WHERE symbol = ?1 AND timeframe = ?2
            ORDER BY period_start DESC
            LIMIT ?3
            "#,
        )
        .bind(symbol)
        .bind(timeframe.to_string())
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let mut candles: Vec<Candle> = rows
            .into_iter()
            .filter_map(|row| {
                let raw: String = row.get("period_start");
                let period_start = DateTime::parse_from_rfc3339(&raw)
                    .ok()?
                    .with_timezone(&Utc);
                Some(Candle {
                    symbol: row.get("symbol"),
                    period_start,
                    open: row.get("open"),
                    high: row.get("high"),
                    low: row.get("low"),
                    close: row.get("close"),
                    volume: row.get("volume"),
                    timeframe,
                })
            })
            .collect();
        candles.reverse();
        Ok(candles)
    }
}
