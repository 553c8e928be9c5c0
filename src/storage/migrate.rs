//! Schema management. Every statement is idempotent: tables and indexes are
//! guarded with IF NOT EXISTS, column additions check `pragma table_info`
//! first, so `init`/`migrate` are safe to re-run on a live database.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::info;

use super::db::Db;

pub const TABLES: &[&str] = &[
    "accounts",
    "instruments",
    "strategies",
    "market_data",
    "trading_signals",
    "orders",
    "positions",
    "trades",
    "system_logs",
    "settings",
];

/// Create the full schema.
pub async fn init(db: &Db) -> Result<()> {
    let conn = db.lock().await;
    create_schema(&conn)?;
    info!("database schema initialized");
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accounts (
            account_id TEXT PRIMARY KEY,
            account_name TEXT NOT NULL,
            account_type TEXT NOT NULL DEFAULT 'virtual',
            cash_balance REAL NOT NULL,
            currency TEXT NOT NULL DEFAULT 'USD',
            status TEXT NOT NULL DEFAULT 'active',
            description TEXT,
            strategy_id INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS instruments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            exchange TEXT NOT NULL DEFAULT 'Unknown',
            currency TEXT NOT NULL DEFAULT 'USD',
            is_active INTEGER NOT NULL DEFAULT 1,
            watch_list INTEGER NOT NULL DEFAULT 0,
            overall_score INTEGER,
            risk_score INTEGER,
            sector TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS strategies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            category TEXT,
            strategy_type TEXT,
            stock_list_mode TEXT,
            stock_list TEXT,
            stock_list_ai_prompt TEXT,
            parameters TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS market_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol_id INTEGER NOT NULL REFERENCES instruments(id),
            timestamp TEXT NOT NULL,
            interval TEXT NOT NULL,
            open REAL NOT NULL,
            high REAL NOT NULL,
            low REAL NOT NULL,
            close REAL NOT NULL,
            volume INTEGER NOT NULL,
            vwap REAL,
            trade_count INTEGER,
            created_at TEXT NOT NULL,
            UNIQUE(symbol_id, timestamp, interval)
        );
        CREATE INDEX IF NOT EXISTS idx_market_data_symbol_interval_ts
            ON market_data(symbol_id, interval, timestamp DESC);

        CREATE TABLE IF NOT EXISTS trading_signals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol_id INTEGER NOT NULL REFERENCES instruments(id),
            strategy_id INTEGER NOT NULL REFERENCES strategies(id),
            timestamp TEXT NOT NULL,
            signal_type TEXT NOT NULL,
            strength REAL NOT NULL DEFAULT 0,
            price REAL NOT NULL DEFAULT 0,
            confidence REAL NOT NULL DEFAULT 0.5,
            indicators_used TEXT NOT NULL DEFAULT '{}',
            reason TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_trading_signals_symbol_ts
            ON trading_signals(symbol_id, timestamp DESC);

        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL REFERENCES accounts(account_id),
            symbol_id INTEGER NOT NULL REFERENCES instruments(id),
            strategy_id INTEGER,
            order_id TEXT NOT NULL UNIQUE,
            order_type TEXT NOT NULL,
            side TEXT NOT NULL,
            quantity REAL NOT NULL,
            price REAL,
            stop_price REAL,
            status TEXT NOT NULL,
            filled_quantity REAL NOT NULL DEFAULT 0,
            average_fill_price REAL,
            commission REAL NOT NULL DEFAULT 0,
            submitted_at TEXT NOT NULL,
            filled_at TEXT,
            cancelled_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_status_submitted
            ON orders(status, submitted_at ASC);
        CREATE INDEX IF NOT EXISTS idx_orders_account_submitted
            ON orders(account_id, submitted_at DESC);

        CREATE TABLE IF NOT EXISTS positions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL REFERENCES accounts(account_id),
            symbol_id INTEGER NOT NULL REFERENCES instruments(id),
            quantity REAL NOT NULL DEFAULT 0,
            average_entry_price REAL NOT NULL,
            current_price REAL,
            unrealized_pnl REAL NOT NULL DEFAULT 0,
            realized_pnl REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(account_id, symbol_id)
        );

        CREATE TABLE IF NOT EXISTS trades (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL REFERENCES accounts(account_id),
            symbol_id INTEGER NOT NULL REFERENCES instruments(id),
            strategy_id INTEGER,
            side TEXT NOT NULL,
            quantity REAL NOT NULL,
            entry_price REAL NOT NULL,
            exit_price REAL NOT NULL,
            gross_pnl REAL NOT NULL,
            commission REAL NOT NULL DEFAULT 0,
            net_pnl REAL NOT NULL,
            pnl_percentage REAL,
            entry_time TEXT NOT NULL,
            exit_time TEXT NOT NULL,
            holding_period_days INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS system_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            account_id TEXT,
            level TEXT NOT NULL,
            module TEXT NOT NULL,
            message TEXT NOT NULL,
            details TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_system_logs_ts ON system_logs(timestamp DESC);

        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL DEFAULT 'general',
            name TEXT NOT NULL UNIQUE,
            parameters TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
    .context("create schema")?;
    Ok(())
}

/// Report which expected tables exist.
pub async fn status(db: &Db) -> Result<Vec<(String, bool)>> {
    let conn = db.lock().await;
    let mut out = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        let present: bool = conn
            .prepare_cached("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?
            .exists(params![table])?;
        out.push((table.to_string(), present));
    }
    Ok(out)
}

/// Apply additive migrations on top of an existing schema. Column adds are
/// skipped when the column is already present.
pub async fn migrate(db: &Db) -> Result<usize> {
    let conn = db.lock().await;
    let mut applied = 0;

    // Columns that arrived after the first schema revision.
    let column_adds: &[(&str, &str, &str)] = &[
        ("accounts", "strategy_id", "INTEGER"),
        ("instruments", "watch_list", "INTEGER NOT NULL DEFAULT 0"),
        ("instruments", "overall_score", "INTEGER"),
        ("instruments", "risk_score", "INTEGER"),
        ("instruments", "sector", "TEXT"),
        ("strategies", "stock_list_ai_prompt", "TEXT"),
    ];

    for (table, column, decl) in column_adds {
        if !column_exists(&conn, table, column)? {
            conn.execute(
                &format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"),
                [],
            )?;
            info!(table, column, "added column");
            applied += 1;
        }
    }

    Ok(applied)
}

/// `init` followed by `migrate`.
pub async fn migrate_all(db: &Db) -> Result<usize> {
    init(db).await?;
    migrate(db).await
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Seed a demo account, strategy, and a handful of instruments. Safe to
/// re-run; existing rows are left untouched.
pub async fn sample(db: &Db) -> Result<()> {
    init(db).await?;

    let conn = db.lock().await;
    let now = Utc::now();

    conn.execute(
        "INSERT OR IGNORE INTO strategies
            (name, description, category, strategy_type, stock_list_mode, stock_list, parameters, is_active, created_at)
         VALUES (?1, ?2, 'Long', 'Swing Trade', 'Manual', ?3, ?4, 1, ?5)",
        params![
            "demo-momentum",
            "Sample swing-trade strategy over large-cap tech",
            "AAPL,MSFT,GOOGL,AMZN,NVDA",
            r#"{"max_position_size_percent": 10, "rsi_oversold": 30, "rsi_overbought": 70}"#,
            now,
        ],
    )?;

    let strategy_id: i64 = conn.query_row(
        "SELECT id FROM strategies WHERE name = 'demo-momentum'",
        [],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO accounts
            (account_id, account_name, account_type, cash_balance, currency, status, strategy_id, is_active, created_at, updated_at)
         VALUES (?1, ?2, 'virtual', ?3, 'USD', 'active', ?4, 1, ?5, ?5)",
        params!["demo-account", "Demo Paper Account", 100_000.0, strategy_id, now],
    )?;

    for (symbol, name, exchange) in [
        ("AAPL", "Apple Inc.", "NASDAQ"),
        ("MSFT", "Microsoft Corporation", "NASDAQ"),
        ("GOOGL", "Alphabet Inc.", "NASDAQ"),
        ("AMZN", "Amazon.com, Inc.", "NASDAQ"),
        ("NVDA", "NVIDIA Corporation", "NASDAQ"),
    ] {
        conn.execute(
            "INSERT OR IGNORE INTO instruments
                (symbol, name, exchange, currency, is_active, watch_list, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'USD', 1, 0, ?4, ?4)",
            params![symbol, name, exchange, now],
        )?;
    }

    info!("sample data seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Db::open(path.to_str().unwrap()).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let (_dir, db) = temp_db().await;
        init(&db).await.unwrap();
        init(&db).await.unwrap();
        let status = status(&db).await.unwrap();
        assert!(status.iter().all(|(_, present)| *present));
    }

    #[tokio::test]
    async fn migrate_skips_existing_columns() {
        let (_dir, db) = temp_db().await;
        init(&db).await.unwrap();
        // Fresh schema already has every column; nothing to apply.
        assert_eq!(migrate(&db).await.unwrap(), 0);
        assert_eq!(migrate_all(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sample_seeds_once() {
        let (_dir, db) = temp_db().await;
        sample(&db).await.unwrap();
        sample(&db).await.unwrap();

        let conn = db.lock().await;
        let accounts: i64 = conn
            .query_row("SELECT COUNT(*) FROM accounts", [], |r| r.get(0))
            .unwrap();
        let instruments: i64 = conn
            .query_row("SELECT COUNT(*) FROM instruments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(accounts, 1);
        assert_eq!(instruments, 5);
    }
}
