use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::db::Db;
use crate::models::{OrderSide, Trade};

/// Realized round-trip record appended when a sell fills.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub account_id: String,
    pub symbol_id: i64,
    pub strategy_id: Option<i64>,
    pub side: OrderSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub commission: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
}

pub struct TradeRepo {
    db: Db,
}

const COLS: &str = "id, account_id, symbol_id, strategy_id, side, quantity, entry_price, \
                    exit_price, gross_pnl, commission, net_pnl, pnl_percentage, entry_time, \
                    exit_time, holding_period_days";

fn row_to_trade(row: &Row) -> rusqlite::Result<Trade> {
    let side: String = row.get(4)?;
    Ok(Trade {
        id: row.get(0)?,
        account_id: row.get(1)?,
        symbol_id: row.get(2)?,
        strategy_id: row.get(3)?,
        side: OrderSide::parse(&side).unwrap_or(OrderSide::Sell),
        quantity: row.get(5)?,
        entry_price: row.get(6)?,
        exit_price: row.get(7)?,
        gross_pnl: row.get(8)?,
        commission: row.get(9)?,
        net_pnl: row.get(10)?,
        pnl_percentage: row.get(11)?,
        entry_time: row.get(12)?,
        exit_time: row.get(13)?,
        holding_period_days: row.get(14)?,
    })
}

impl TradeRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: &NewTrade) -> Result<i64> {
        let gross_pnl = (new.exit_price - new.entry_price) * new.quantity;
        let net_pnl = gross_pnl - new.commission;
        let pnl_percentage = if new.entry_price > 0.0 {
            Some((new.exit_price - new.entry_price) / new.entry_price * 100.0)
        } else {
            None
        };
        let holding_period_days = (new.exit_time - new.entry_time).num_days().max(0);

        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO trades \
                (account_id, symbol_id, strategy_id, side, quantity, entry_price, exit_price, \
                 gross_pnl, commission, net_pnl, pnl_percentage, entry_time, exit_time, \
                 holding_period_days, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                new.account_id,
                new.symbol_id,
                new.strategy_id,
                new.side.as_str(),
                new.quantity,
                new.entry_price,
                new.exit_price,
                gross_pnl,
                new.commission,
                net_pnl,
                pnl_percentage,
                new.entry_time,
                new.exit_time,
                holding_period_days,
                Utc::now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<Trade>> {
        let limit = limit.clamp(1, 1000) as i64;
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM trades ORDER BY exit_time DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], row_to_trade)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn by_strategy(&self, strategy_id: i64) -> Result<Vec<Trade>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM trades WHERE strategy_id = ?1 ORDER BY exit_time DESC"
        ))?;
        let rows = stmt.query_map(params![strategy_id], row_to_trade)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}
