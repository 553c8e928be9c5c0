use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Row};
use tracing::warn;

use super::db::Db;
use crate::models::Instrument;

/// Basic descriptive fields a vendor can supply for a freshly created row.
#[derive(Debug, Clone)]
pub struct InstrumentProfile {
    pub name: String,
    pub exchange: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct InstrumentScores {
    pub overall_score: i64,
    pub risk_score: i64,
    pub sector: String,
}

/// Optional collaborator for `add_to_watchlist`: fetches display data and
/// scores without making the storage layer depend on the provider stack.
#[async_trait]
pub trait InstrumentEnricher: Send + Sync {
    async fn describe(&self, symbol: &str) -> Option<InstrumentProfile>;
    async fn score(&self, symbol: &str) -> Option<InstrumentScores>;
}

pub struct InstrumentRepo {
    db: Db,
}

const COLS: &str = "id, symbol, name, exchange, currency, is_active, watch_list, \
                    overall_score, risk_score, sector, created_at, updated_at";

fn row_to_instrument(row: &Row) -> rusqlite::Result<Instrument> {
    Ok(Instrument {
        id: row.get(0)?,
        symbol: row.get(1)?,
        name: row.get(2)?,
        exchange: row.get(3)?,
        currency: row.get(4)?,
        is_active: row.get(5)?,
        watch_list: row.get(6)?,
        overall_score: row.get(7)?,
        risk_score: row.get(8)?,
        sector: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl InstrumentRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_all(&self, active_only: bool) -> Result<Vec<Instrument>> {
        let conn = self.db.lock().await;
        let sql = if active_only {
            format!("SELECT {COLS} FROM instruments WHERE is_active = 1 ORDER BY symbol ASC")
        } else {
            format!("SELECT {COLS} FROM instruments ORDER BY symbol ASC")
        };
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], row_to_instrument)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Instrument>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!("SELECT {COLS} FROM instruments WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], row_to_instrument)?;
        Ok(rows.next().transpose()?)
    }

    pub async fn get_by_symbol(&self, symbol: &str) -> Result<Option<Instrument>> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let conn = self.db.lock().await;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {COLS} FROM instruments WHERE symbol = ?1"))?;
        let mut rows = stmt.query_map(params![symbol], row_to_instrument)?;
        Ok(rows.next().transpose()?)
    }

    pub async fn create(
        &self,
        symbol: &str,
        name: &str,
        exchange: &str,
        currency: &str,
    ) -> Result<Instrument> {
        let symbol = symbol.trim().to_ascii_uppercase();
        {
            let conn = self.db.lock().await;
            conn.execute(
                "INSERT INTO instruments (symbol, name, exchange, currency, is_active, watch_list, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, 1, 0, ?5, ?5)",
                params![symbol, name, exchange, currency, Utc::now()],
            )?;
        }
        Ok(self
            .get_by_symbol(&symbol)
            .await?
            .expect("instrument just inserted"))
    }

    /// Get-or-create used by the trading bot and order ingestion: instruments
    /// are created lazily on first reference with a USD default.
    pub async fn ensure(&self, symbol: &str) -> Result<Instrument> {
        if let Some(existing) = self.get_by_symbol(symbol).await? {
            return Ok(existing);
        }
        let symbol = symbol.trim().to_ascii_uppercase();
        self.create(&symbol, &symbol, "Unknown", "USD").await
    }

    pub async fn set_scores(
        &self,
        id: i64,
        overall_score: Option<i64>,
        risk_score: Option<i64>,
        sector: Option<&str>,
    ) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "UPDATE instruments SET overall_score = ?2, risk_score = ?3, sector = ?4, updated_at = ?5 \
             WHERE id = ?1",
            params![id, overall_score, risk_score, sector, Utc::now()],
        )?;
        Ok(())
    }

    pub async fn watchlist(&self) -> Result<Vec<Instrument>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM instruments WHERE watch_list = 1 ORDER BY symbol ASC"
        ))?;
        let rows = stmt.query_map([], row_to_instrument)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Idempotent create-or-flag. Creates the row (enriched when the vendor
    /// answers), sets the watchlist flag, then attempts scoring. A scoring
    /// failure leaves the flag set.
    pub async fn add_to_watchlist(
        &self,
        symbol: &str,
        enricher: Option<&dyn InstrumentEnricher>,
    ) -> Result<Instrument> {
        let symbol = symbol.trim().to_ascii_uppercase();

        let instrument = match self.get_by_symbol(&symbol).await? {
            Some(existing) => existing,
            None => {
                let profile = match enricher {
                    Some(e) => e.describe(&symbol).await,
                    None => None,
                };
                let profile = profile.unwrap_or_else(|| InstrumentProfile {
                    name: symbol.clone(),
                    exchange: "Unknown".to_string(),
                    currency: "USD".to_string(),
                });
                self.create(&symbol, &profile.name, &profile.exchange, &profile.currency)
                    .await?
            }
        };

        {
            let conn = self.db.lock().await;
            conn.execute(
                "UPDATE instruments SET watch_list = 1, updated_at = ?2 WHERE id = ?1",
                params![instrument.id, Utc::now()],
            )?;
        }

        if let Some(enricher) = enricher {
            match enricher.score(&symbol).await {
                Some(scores) => {
                    self.set_scores(
                        instrument.id,
                        Some(scores.overall_score),
                        Some(scores.risk_score),
                        Some(&scores.sector),
                    )
                    .await?;
                }
                None => {
                    warn!(symbol = %symbol, "could not compute scores for watchlist entry");
                    self.set_scores(instrument.id, None, None, Some("Unknown")).await?;
                }
            }
        }

        Ok(self
            .get_by_symbol(&symbol)
            .await?
            .expect("watchlist instrument exists"))
    }

    pub async fn remove_from_watchlist(&self, symbol: &str) -> Result<Option<Instrument>> {
        let Some(instrument) = self.get_by_symbol(symbol).await? else {
            return Ok(None);
        };
        let conn = self.db.lock().await;
        conn.execute(
            "UPDATE instruments SET watch_list = 0, updated_at = ?2 WHERE id = ?1",
            params![instrument.id, Utc::now()],
        )?;
        drop(conn);
        self.get_by_symbol(symbol).await
    }
}
