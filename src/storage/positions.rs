use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Row};

use super::db::Db;
use crate::models::Position;

pub struct PositionRepo {
    db: Db,
}

pub(crate) const COLS: &str = "id, account_id, symbol_id, quantity, average_entry_price, \
                               current_price, unrealized_pnl, realized_pnl, created_at, updated_at";

pub(crate) fn row_to_position(row: &Row) -> rusqlite::Result<Position> {
    Ok(Position {
        id: row.get(0)?,
        account_id: row.get(1)?,
        symbol_id: row.get(2)?,
        quantity: row.get(3)?,
        average_entry_price: row.get(4)?,
        current_price: row.get(5)?,
        unrealized_pnl: row.get(6)?,
        realized_pnl: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl PositionRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_all(&self) -> Result<Vec<Position>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!("SELECT {COLS} FROM positions ORDER BY id ASC"))?;
        let rows = stmt.query_map([], row_to_position)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn get(&self, account_id: &str, symbol_id: i64) -> Result<Option<Position>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM positions WHERE account_id = ?1 AND symbol_id = ?2"
        ))?;
        let mut rows = stmt.query_map(params![account_id, symbol_id], row_to_position)?;
        Ok(rows.next().transpose()?)
    }

    /// Open (non-zero) positions for one account.
    pub async fn open_for_account(&self, account_id: &str) -> Result<Vec<Position>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM positions WHERE account_id = ?1 AND quantity > 0 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![account_id], row_to_position)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Mark-to-market update from the position revaluer.
    pub async fn update_mark(
        &self,
        id: i64,
        current_price: f64,
        unrealized_pnl: f64,
    ) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "UPDATE positions SET current_price = ?2, unrealized_pnl = ?3, updated_at = ?4 \
             WHERE id = ?1",
            params![id, current_price, unrealized_pnl, Utc::now()],
        )?;
        Ok(())
    }
}
