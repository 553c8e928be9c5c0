use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Row};

use super::db::Db;
use crate::models::Strategy;

pub struct StrategyRepo {
    db: Db,
}

const COLS: &str = "id, name, description, category, strategy_type, stock_list_mode, \
                    stock_list, stock_list_ai_prompt, parameters, is_active, created_at";

fn row_to_strategy(row: &Row) -> rusqlite::Result<Strategy> {
    Ok(Strategy {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        strategy_type: row.get(4)?,
        stock_list_mode: row.get(5)?,
        stock_list: row.get(6)?,
        stock_list_ai_prompt: row.get(7)?,
        parameters: row.get(8)?,
        is_active: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl StrategyRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_all(&self, active_only: bool) -> Result<Vec<Strategy>> {
        let conn = self.db.lock().await;
        let sql = if active_only {
            format!("SELECT {COLS} FROM strategies WHERE is_active = 1 ORDER BY name ASC")
        } else {
            format!("SELECT {COLS} FROM strategies ORDER BY name ASC")
        };
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], row_to_strategy)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Strategy>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!("SELECT {COLS} FROM strategies WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], row_to_strategy)?;
        Ok(rows.next().transpose()?)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Strategy>> {
        let conn = self.db.lock().await;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {COLS} FROM strategies WHERE name = ?1"))?;
        let mut rows = stmt.query_map(params![name], row_to_strategy)?;
        Ok(rows.next().transpose()?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        category: Option<&str>,
        strategy_type: Option<&str>,
        stock_list_mode: Option<&str>,
        stock_list: Option<&str>,
        stock_list_ai_prompt: Option<&str>,
        parameters: Option<&str>,
    ) -> Result<Strategy> {
        {
            let conn = self.db.lock().await;
            conn.execute(
                "INSERT INTO strategies \
                    (name, description, category, strategy_type, stock_list_mode, stock_list, stock_list_ai_prompt, parameters, is_active, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)",
                params![
                    name,
                    description,
                    category,
                    strategy_type,
                    stock_list_mode,
                    stock_list,
                    stock_list_ai_prompt,
                    parameters,
                    Utc::now(),
                ],
            )?;
        }
        Ok(self
            .get_by_name(name)
            .await?
            .expect("strategy just inserted"))
    }

    /// Persist a freshly generated stock list so Manual mode can fall back
    /// to it when AI generation is unavailable.
    pub async fn update_stock_list(&self, id: i64, stock_list: &str) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "UPDATE strategies SET stock_list = ?2 WHERE id = ?1",
            params![id, stock_list],
        )?;
        Ok(())
    }

    pub async fn deactivate(&self, id: i64) -> Result<bool> {
        let conn = self.db.lock().await;
        let changed = conn.execute("UPDATE strategies SET is_active = 0 WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
