use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use common::{ExitReason, OrderSide, Result, Trade};

/// Append-only SQLite store of executed trades, queryable by symbol and
/// time range for reporting.
#[derive(Clone)]
pub struct TradeStore {
    db: SqlitePool,
}

/// Filters for `TradeStore::list`.
#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    pub symbol: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl TradeStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn insert(&self, trade: &Trade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades
                (id, symbol, side, amount, price, timestamp, strategy_name, status, exit_reason, realized_pnl)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.symbol)
        .bind(trade.side.to_string())
        .bind(trade.amount)
        .bind(trade.price)
        .bind(trade.timestamp.to_rfc3339())
        .bind(&trade.strategy_name)
        .bind(&trade.status)
        .bind(trade.exit_reason.map(|r| r.to_string()))
        .bind(trade.realized_pnl)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Trades matching the filter, newest first.
    pub async fn list(&self, filter: &TradeFilter) -> Result<Vec<Trade>> {
        let limit = if filter.limit > 0 { filter.limit.min(200) } else { 50 };
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, side, amount, price, timestamp, strategy_name, status, exit_reason, realized_pnl
            FROM trades
            WHERE (?1 IS NULL OR symbol = ?1)
              AND (?2 IS NULL OR timestamp >= ?2)
              AND (?3 IS NULL OR timestamp <= ?3)
            ORDER BY timestamp DESC
            LIMIT ?4 OFFSET ?5
            "#,
        )
        .bind(&filter.symbol)
        .bind(filter.since.map(|t| t.to_rfc3339()))
        .bind(filter.until.map(|t| t.to_rfc3339()))
        .bind(limit)
        .bind(filter.offset.max(0))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().filter_map(row_to_trade).collect())
    }

    pub async fn count(&self, symbol: Option<&str>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM trades WHERE (?1 IS NULL OR symbol = ?1)",
        )
        .bind(symbol)
        .fetch_one(&self.db)
        .await?;
        Ok(row.get("n"))
    }

    /// Realized P&L per closing trade, oldest first — the input to the
    /// equity-curve fold in the performance endpoint.
    pub async fn realized_pnls(&self) -> Result<Vec<(String, f64)>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, realized_pnl FROM trades
            WHERE realized_pnl IS NOT NULL
            ORDER BY timestamp ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("timestamp"), row.get::<f64, _>("realized_pnl")))
            .collect())
    }
}

fn row_to_trade(row: sqlx::sqlite::SqliteRow) -> Option<Trade> {
    let side = match row.get::<String, _>("side").as_str() {
        "BUY" => OrderSide::Buy,
        "SELL" => OrderSide::Sell,
        _ => return None,
    };
    let exit_reason = row
        .get::<Option<String>, _>("exit_reason")
        .and_then(|s| match s.as_str() {
            "signal" => Some(ExitReason::Signal),
            "stop_loss" => Some(ExitReason::StopLoss),
            "take_profit" => Some(ExitReason::TakeProfit),
            _ => None,
        });
    let timestamp = DateTime::parse_from_rfc3339(&row.get::<String, _>("timestamp"))
        .ok()?
        .with_timezone(&Utc);

    Some(Trade {
        id: row.get("id"),
        symbol: row.get("symbol"),
        side,
        amount: row.get("amount"),
        price: row.get("price"),
        timestamp,
        strategy_name: row.get("strategy_name"),
        status: row.get("status"),
        exit_reason,
        realized_pnl: row.get("realized_pnl"),
    })
}
