use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::db::Db;
use crate::models::MarketBar;

/// Bar input; `(symbol_id, timestamp, interval)` must be unique, duplicate
/// inserts are ignored.
#[derive(Debug, Clone)]
pub struct NewBar {
    pub symbol_id: i64,
    pub timestamp: DateTime<Utc>,
    pub interval: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub vwap: Option<f64>,
    pub trade_count: Option<i64>,
}

impl NewBar {
    /// Collapse a single quote into a bar, the shape written by the
    /// market-data refresher (volume unknown).
    pub fn from_quote(symbol_id: i64, timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            symbol_id,
            timestamp,
            interval: "1min".to_string(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
            vwap: Some(price),
            trade_count: Some(1),
        }
    }
}

pub struct MarketDataRepo {
    db: Db,
}

const COLS: &str = "id, symbol_id, timestamp, interval, open, high, low, close, volume, vwap, trade_count";

fn row_to_bar(row: &Row) -> rusqlite::Result<MarketBar> {
    Ok(MarketBar {
        id: row.get(0)?,
        symbol_id: row.get(1)?,
        timestamp: row.get(2)?,
        interval: row.get(3)?,
        open: row.get(4)?,
        high: row.get(5)?,
        low: row.get(6)?,
        close: row.get(7)?,
        volume: row.get(8)?,
        vwap: row.get(9)?,
        trade_count: row.get(10)?,
    })
}

impl MarketDataRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn insert(&self, bar: &NewBar) -> Result<()> {
        let conn = self.db.lock().await;
        insert_one(&conn, bar)?;
        Ok(())
    }

    pub async fn insert_bulk(&self, bars: &[NewBar]) -> Result<usize> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;
        let mut written = 0;
        for bar in bars {
            written += insert_one(&tx, bar)?;
        }
        tx.commit()?;
        Ok(written)
    }

    /// Latest bars for one symbol/interval, newest first.
    pub async fn latest(&self, symbol_id: i64, interval: &str, limit: usize) -> Result<Vec<MarketBar>> {
        let limit = limit.clamp(1, 10_000) as i64;
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM market_data WHERE symbol_id = ?1 AND interval = ?2 \
             ORDER BY timestamp DESC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![symbol_id, interval, limit], row_to_bar)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn range(
        &self,
        symbol_id: i64,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketBar>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM market_data \
             WHERE symbol_id = ?1 AND interval = ?2 AND timestamp >= ?3 AND timestamp <= ?4 \
             ORDER BY timestamp ASC"
        ))?;
        let rows = stmt.query_map(params![symbol_id, interval, start, end], row_to_bar)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn insert_one(conn: &rusqlite::Connection, bar: &NewBar) -> Result<usize> {
    let written = conn.execute(
        "INSERT OR IGNORE INTO market_data \
            (symbol_id, timestamp, interval, open, high, low, close, volume, vwap, trade_count, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            bar.symbol_id,
            bar.timestamp,
            bar.interval,
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
            bar.vwap,
            bar.trade_count,
            Utc::now(),
        ],
    )?;
    Ok(written)
}
