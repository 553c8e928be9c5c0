use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Row};

use super::db::Db;
use crate::models::Setting;

#[derive(Clone)]
pub struct SettingsRepo {
    db: Db,
}

const COLS: &str = "id, category, name, parameters, is_active, created_at, updated_at";

fn row_to_setting(row: &Row) -> rusqlite::Result<Setting> {
    Ok(Setting {
        id: row.get(0)?,
        category: row.get(1)?,
        name: row.get(2)?,
        parameters: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl SettingsRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Setting>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!("SELECT {COLS} FROM settings WHERE name = ?1"))?;
        let mut rows = stmt.query_map(params![name], row_to_setting)?;
        Ok(rows.next().transpose()?)
    }

    pub async fn get_by_category(&self, category: &str, active_only: bool) -> Result<Vec<Setting>> {
        let conn = self.db.lock().await;
        let sql = if active_only {
            format!("SELECT {COLS} FROM settings WHERE category = ?1 AND is_active = 1 ORDER BY name ASC")
        } else {
            format!("SELECT {COLS} FROM settings WHERE category = ?1 ORDER BY name ASC")
        };
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![category], row_to_setting)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Concurrency-safe create-or-update; the primitive behind the AI list
    /// cache and vendor credential rows.
    pub async fn upsert(
        &self,
        name: &str,
        parameters: &str,
        category: &str,
        is_active: bool,
    ) -> Result<Setting> {
        {
            let conn = self.db.lock().await;
            conn.execute(
                "INSERT INTO settings (category, name, parameters, is_active, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
                 ON CONFLICT(name) DO UPDATE SET \
                    category = excluded.category, \
                    parameters = excluded.parameters, \
                    is_active = excluded.is_active, \
                    updated_at = excluded.updated_at",
                params![category, name, parameters, is_active, Utc::now()],
            )?;
        }
        Ok(self.get_by_name(name).await?.expect("setting just upserted"))
    }

    pub async fn deactivate(&self, name: &str) -> Result<bool> {
        let conn = self.db.lock().await;
        let changed = conn.execute(
            "UPDATE settings SET is_active = 0, updated_at = ?2 WHERE name = ?1",
            params![name, Utc::now()],
        )?;
        Ok(changed > 0)
    }

    /// Vendor API key lookup: Setting values are JSON documents holding a
    /// `key` field. Absent row or malformed document yields None.
    pub async fn api_key(&self, name: &str) -> Result<Option<String>> {
        let Some(setting) = self.get_by_name(name).await? else {
            return Ok(None);
        };
        let Some(raw) = setting.parameters else {
            return Ok(None);
        };
        let key = serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|doc| doc.get("key").and_then(|k| k.as_str()).map(str::to_string))
            .filter(|k| !k.trim().is_empty());
        Ok(key)
    }
}
