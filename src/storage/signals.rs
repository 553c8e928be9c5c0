use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::db::Db;
use crate::models::{SignalAction, TradingSignal};

#[derive(Debug, Clone)]
pub struct NewSignal {
    pub symbol_id: i64,
    pub strategy_id: i64,
    pub timestamp: DateTime<Utc>,
    pub signal_type: SignalAction,
    pub strength: f64,
    pub price: f64,
    pub confidence: f64,
    /// Canonical JSON document of indicator -> value.
    pub indicators_used: String,
    pub reason: String,
}

pub struct SignalRepo {
    db: Db,
}

const COLS: &str = "id, symbol_id, strategy_id, timestamp, signal_type, strength, price, \
                    confidence, indicators_used, reason";

fn row_to_signal(row: &Row) -> rusqlite::Result<TradingSignal> {
    let signal_type: String = row.get(4)?;
    Ok(TradingSignal {
        id: row.get(0)?,
        symbol_id: row.get(1)?,
        strategy_id: row.get(2)?,
        timestamp: row.get(3)?,
        signal_type: match signal_type.as_str() {
            "BUY" => SignalAction::Buy,
            "SELL" => SignalAction::Sell,
            _ => SignalAction::Hold,
        },
        strength: row.get(5)?,
        price: row.get(6)?,
        confidence: row.get(7)?,
        indicators_used: row.get(8)?,
        reason: row.get(9)?,
    })
}

impl SignalRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(&self, signal: &NewSignal) -> Result<i64> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO trading_signals \
                (symbol_id, strategy_id, timestamp, signal_type, strength, price, confidence, indicators_used, reason, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                signal.symbol_id,
                signal.strategy_id,
                signal.timestamp,
                signal.signal_type.as_str(),
                signal.strength,
                signal.price,
                signal.confidence,
                signal.indicators_used,
                signal.reason,
                Utc::now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn recent(
        &self,
        symbol_id: Option<i64>,
        strategy_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<TradingSignal>> {
        let limit = limit.clamp(1, 1000) as i64;
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM trading_signals \
             WHERE (?1 IS NULL OR symbol_id = ?1) AND (?2 IS NULL OR strategy_id = ?2) \
             ORDER BY timestamp DESC, id DESC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![symbol_id, strategy_id, limit], row_to_signal)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}
