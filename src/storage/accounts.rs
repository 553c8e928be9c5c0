use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Row};

use super::db::Db;
use crate::models::{round_cash, Account};

pub struct AccountRepo {
    db: Db,
}

const COLS: &str = "account_id, account_name, account_type, cash_balance, currency, status, \
                    description, strategy_id, is_active, created_at, updated_at";

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        account_id: row.get(0)?,
        account_name: row.get(1)?,
        account_type: row.get(2)?,
        cash_balance: row.get(3)?,
        currency: row.get(4)?,
        status: row.get(5)?,
        description: row.get(6)?,
        strategy_id: row.get(7)?,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl AccountRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_all(&self) -> Result<Vec<Account>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM accounts ORDER BY account_id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_account)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn get_by_id(&self, account_id: &str) -> Result<Option<Account>> {
        let conn = self.db.lock().await;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {COLS} FROM accounts WHERE account_id = ?1"))?;
        let mut rows = stmt.query_map(params![account_id], row_to_account)?;
        Ok(rows.next().transpose()?)
    }

    /// Accounts the trading bot should process: soft-delete flag clear,
    /// status 'active', and a bound strategy.
    pub async fn tradable(&self) -> Result<Vec<Account>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM accounts \
             WHERE is_active = 1 AND status = 'active' AND strategy_id IS NOT NULL \
             ORDER BY account_id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_account)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn create(
        &self,
        account_id: &str,
        account_name: &str,
        cash_balance: f64,
        strategy_id: Option<i64>,
    ) -> Result<Account> {
        let now = Utc::now();
        {
            let conn = self.db.lock().await;
            conn.execute(
                "INSERT INTO accounts \
                    (account_id, account_name, account_type, cash_balance, currency, status, strategy_id, is_active, created_at, updated_at) \
                 VALUES (?1, ?2, 'virtual', ?3, 'USD', 'active', ?4, 1, ?5, ?5)",
                params![account_id, account_name, round_cash(cash_balance), strategy_id, now],
            )?;
        }
        Ok(self
            .get_by_id(account_id)
            .await?
            .expect("account just inserted"))
    }

    pub async fn update_cash_balance(&self, account_id: &str, cash_balance: f64) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "UPDATE accounts SET cash_balance = ?2, updated_at = ?3 WHERE account_id = ?1",
            params![account_id, round_cash(cash_balance), Utc::now()],
        )?;
        Ok(())
    }

    pub async fn set_strategy(&self, account_id: &str, strategy_id: Option<i64>) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "UPDATE accounts SET strategy_id = ?2, updated_at = ?3 WHERE account_id = ?1",
            params![account_id, strategy_id, Utc::now()],
        )?;
        Ok(())
    }
}
