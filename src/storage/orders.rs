use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use super::db::Db;
use crate::error::StoreError;
use crate::models::{Order, OrderSide, OrderStatus, OrderType};

/// Input for order creation; the repository stamps ids and timestamps.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub account_id: String,
    pub symbol_id: i64,
    pub strategy_id: Option<i64>,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
}

pub struct OrderRepo {
    db: Db,
}

pub(crate) const COLS: &str =
    "id, account_id, symbol_id, strategy_id, order_id, order_type, side, quantity, price, \
     stop_price, status, filled_quantity, average_fill_price, commission, submitted_at, \
     filled_at, cancelled_at";

pub(crate) fn row_to_order(row: &Row) -> rusqlite::Result<Order> {
    let order_type: String = row.get(5)?;
    let side: String = row.get(6)?;
    let status: String = row.get(10)?;
    Ok(Order {
        id: row.get(0)?,
        account_id: row.get(1)?,
        symbol_id: row.get(2)?,
        strategy_id: row.get(3)?,
        order_id: row.get(4)?,
        order_type: OrderType::parse(&order_type).unwrap_or(OrderType::Market),
        side: OrderSide::parse(&side).unwrap_or(OrderSide::Buy),
        quantity: row.get(7)?,
        price: row.get(8)?,
        stop_price: row.get(9)?,
        status: OrderStatus::parse(&status).unwrap_or(OrderStatus::Pending),
        filled_quantity: row.get(11)?,
        average_fill_price: row.get(12)?,
        commission: row.get(13)?,
        submitted_at: row.get(14)?,
        filled_at: row.get(15)?,
        cancelled_at: row.get(16)?,
    })
}

impl OrderRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewOrder) -> Result<Order> {
        if new.quantity <= 0.0 {
            return Err(StoreError::Validation(format!(
                "order quantity must be positive, got {}",
                new.quantity
            ))
            .into());
        }

        let order_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let id = {
            let conn = self.db.lock().await;
            conn.execute(
                "INSERT INTO orders \
                    (account_id, symbol_id, strategy_id, order_id, order_type, side, quantity, price, stop_price, \
                     status, filled_quantity, commission, submitted_at, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'PENDING', 0, 0, ?10, ?10, ?10)",
                params![
                    new.account_id,
                    new.symbol_id,
                    new.strategy_id,
                    order_id,
                    new.order_type.as_str(),
                    new.side.as_str(),
                    new.quantity,
                    new.price,
                    new.stop_price,
                    now,
                ],
            )?;
            conn.last_insert_rowid()
        };

        Ok(self.get_by_id(id).await?.expect("order just inserted"))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!("SELECT {COLS} FROM orders WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], row_to_order)?;
        Ok(rows.next().transpose()?)
    }

    /// PENDING orders, FIFO by submission time.
    pub async fn pending(&self) -> Result<Vec<Order>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM orders WHERE status = 'PENDING' ORDER BY submitted_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_order)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn get_by_account(&self, account_id: &str, limit: usize) -> Result<Vec<Order>> {
        let limit = limit.clamp(1, 1000) as i64;
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLS} FROM orders WHERE account_id = ?1 \
             ORDER BY submitted_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![account_id, limit], row_to_order)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Transition an order. Out-of-order transitions (terminal -> anything
    /// else) are rejected; FILLED stamps `filled_at`, CANCELLED stamps
    /// `cancelled_at`.
    pub async fn update_status(
        &self,
        id: i64,
        status: OrderStatus,
        filled_quantity: Option<f64>,
        average_fill_price: Option<f64>,
    ) -> Result<Order> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;

        if !current.status.can_transition_to(status) {
            return Err(StoreError::Conflict(format!(
                "order {id}: cannot transition {} -> {}",
                current.status.as_str(),
                status.as_str()
            ))
            .into());
        }

        let now = Utc::now();
        let filled_at: Option<DateTime<Utc>> = (status == OrderStatus::Filled).then_some(now);
        let cancelled_at: Option<DateTime<Utc>> = (status == OrderStatus::Cancelled).then_some(now);

        {
            let conn = self.db.lock().await;
            conn.execute(
                "UPDATE orders SET \
                    status = ?2, \
                    filled_quantity = COALESCE(?3, filled_quantity), \
                    average_fill_price = COALESCE(?4, average_fill_price), \
                    filled_at = COALESCE(?5, filled_at), \
                    cancelled_at = COALESCE(?6, cancelled_at), \
                    updated_at = ?7 \
                 WHERE id = ?1",
                params![
                    id,
                    status.as_str(),
                    filled_quantity,
                    average_fill_price,
                    filled_at,
                    cancelled_at,
                    now,
                ],
            )?;
        }

        Ok(self.get_by_id(id).await?.expect("order exists"))
    }
}
