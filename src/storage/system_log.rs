use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Row};

use super::db::Db;
use crate::models::{LogLevel, SystemLogEntry};

/// Durable, append-only log. Workers write here in addition to tracing so
/// operators can inspect failures through the store.
pub struct SystemLogRepo {
    db: Db,
}

const COLS: &str = "id, timestamp, account_id, level, module, message, details";

fn row_to_entry(row: &Row) -> rusqlite::Result<SystemLogEntry> {
    Ok(SystemLogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        account_id: row.get(2)?,
        level: row.get(3)?,
        module: row.get(4)?,
        message: row.get(5)?,
        details: row.get(6)?,
    })
}

impl SystemLogRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn log(
        &self,
        level: LogLevel,
        module: &str,
        message: &str,
        details: Option<&str>,
        account_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO system_logs (timestamp, account_id, level, module, message, details) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![Utc::now(), account_id, level.as_str(), module, message, details],
        )?;
        Ok(())
    }

    pub async fn info(&self, module: &str, message: &str) -> Result<()> {
        self.log(LogLevel::Info, module, message, None, None).await
    }

    pub async fn warning(&self, module: &str, message: &str, details: Option<&str>) -> Result<()> {
        self.log(LogLevel::Warning, module, message, details, None).await
    }

    pub async fn error(&self, module: &str, message: &str, details: Option<&str>) -> Result<()> {
        self.log(LogLevel::Error, module, message, details, None).await
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<SystemLogEntry>> {
        let limit = limit.clamp(1, 1000) as i64;
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM system_logs ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], row_to_entry)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}
