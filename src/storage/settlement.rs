//! Order settlement. The cash movement, position mutation, order status
//! change, and trade record commit as one SQLite transaction; any failure
//! rolls back all of them and the order stays PENDING for retry.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};

use super::db::Db;
use crate::models::{round_cash, Order, OrderSide, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Filled,
    /// BUY with insufficient cash: terminal rejection.
    Rejected,
    /// SELL without enough shares: left PENDING for operator intervention.
    InsufficientShares,
    /// Another worker settled the order first.
    AlreadySettled,
}

pub struct SettlementRepo {
    db: Db,
}

impl SettlementRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn settle_order(&self, order: &Order, fill_price: f64) -> Result<SettleOutcome> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction().context("begin settlement")?;

        // Re-check under the transaction; the FIFO scan may be stale.
        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM orders WHERE id = ?1",
                params![order.id],
                |row| row.get(0),
            )
            .optional()?;
        if status.as_deref() != Some(OrderStatus::Pending.as_str()) {
            return Ok(SettleOutcome::AlreadySettled);
        }

        let now = Utc::now();
        let outcome = match order.side {
            OrderSide::Buy => settle_buy(&tx, order, fill_price, now)?,
            OrderSide::Sell => settle_sell(&tx, order, fill_price, now)?,
        };

        match outcome {
            SettleOutcome::InsufficientShares => {
                // No mutation to persist.
                Ok(outcome)
            }
            _ => {
                tx.commit().context("commit settlement")?;
                Ok(outcome)
            }
        }
    }
}

fn settle_buy(
    tx: &Transaction,
    order: &Order,
    fill_price: f64,
    now: DateTime<Utc>,
) -> Result<SettleOutcome> {
    let cost = order.quantity * fill_price;

    let cash: f64 = tx.query_row(
        "SELECT cash_balance FROM accounts WHERE account_id = ?1",
        params![order.account_id],
        |row| row.get(0),
    )?;

    if cash < cost {
        mark_order(tx, order.id, OrderStatus::Rejected, None, None, now)?;
        return Ok(SettleOutcome::Rejected);
    }

    tx.execute(
        "UPDATE accounts SET cash_balance = ?2, updated_at = ?3 WHERE account_id = ?1",
        params![order.account_id, round_cash(cash - cost), now],
    )?;

    let existing: Option<(i64, f64, f64)> = tx
        .query_row(
            "SELECT id, quantity, average_entry_price FROM positions \
             WHERE account_id = ?1 AND symbol_id = ?2",
            params![order.account_id, order.symbol_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match existing {
        Some((position_id, old_qty, old_avg)) => {
            let new_qty = old_qty + order.quantity;
            let new_avg = (old_qty * old_avg + order.quantity * fill_price) / new_qty;
            tx.execute(
                "UPDATE positions SET quantity = ?2, average_entry_price = ?3, updated_at = ?4 \
                 WHERE id = ?1",
                params![position_id, new_qty, new_avg, now],
            )?;
        }
        None => {
            tx.execute(
                "INSERT INTO positions \
                    (account_id, symbol_id, quantity, average_entry_price, unrealized_pnl, realized_pnl, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?5)",
                params![order.account_id, order.symbol_id, order.quantity, fill_price, now],
            )?;
        }
    }

    mark_order(
        tx,
        order.id,
        OrderStatus::Filled,
        Some(order.quantity),
        Some(fill_price),
        now,
    )?;
    Ok(SettleOutcome::Filled)
}

fn settle_sell(
    tx: &Transaction,
    order: &Order,
    fill_price: f64,
    now: DateTime<Utc>,
) -> Result<SettleOutcome> {
    let position: Option<(i64, f64, f64, f64, DateTime<Utc>)> = tx
        .query_row(
            "SELECT id, quantity, average_entry_price, realized_pnl, created_at FROM positions \
             WHERE account_id = ?1 AND symbol_id = ?2",
            params![order.account_id, order.symbol_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .optional()?;

    let Some((position_id, quantity, entry_price, realized_pnl, opened_at)) = position else {
        return Ok(SettleOutcome::InsufficientShares);
    };
    if quantity < order.quantity {
        return Ok(SettleOutcome::InsufficientShares);
    }

    let proceeds = order.quantity * fill_price;
    let realized = (fill_price - entry_price) * order.quantity;

    // Quantity shrinks; the entry price survives a full exit so a retained
    // zero-quantity row keeps its history until the next buy rewrites it.
    tx.execute(
        "UPDATE positions SET quantity = ?2, realized_pnl = ?3, updated_at = ?4 WHERE id = ?1",
        params![position_id, quantity - order.quantity, realized_pnl + realized, now],
    )?;

    let cash: f64 = tx.query_row(
        "SELECT cash_balance FROM accounts WHERE account_id = ?1",
        params![order.account_id],
        |row| row.get(0),
    )?;
    tx.execute(
        "UPDATE accounts SET cash_balance = ?2, updated_at = ?3 WHERE account_id = ?1",
        params![order.account_id, round_cash(cash + proceeds), now],
    )?;

    mark_order(
        tx,
        order.id,
        OrderStatus::Filled,
        Some(order.quantity),
        Some(fill_price),
        now,
    )?;

    // Realized round-trip record. Commission is structurally present but
    // not charged on simulated fills.
    let gross_pnl = realized;
    let pnl_percentage = if entry_price > 0.0 {
        Some((fill_price - entry_price) / entry_price * 100.0)
    } else {
        None
    };
    tx.execute(
        "INSERT INTO trades \
            (account_id, symbol_id, strategy_id, side, quantity, entry_price, exit_price, \
             gross_pnl, commission, net_pnl, pnl_percentage, entry_time, exit_time, \
             holding_period_days, created_at) \
         VALUES (?1, ?2, ?3, 'SELL', ?4, ?5, ?6, ?7, 0, ?7, ?8, ?9, ?10, ?11, ?10)",
        params![
            order.account_id,
            order.symbol_id,
            order.strategy_id,
            order.quantity,
            entry_price,
            fill_price,
            gross_pnl,
            pnl_percentage,
            opened_at,
            now,
            (now - opened_at).num_days().max(0),
        ],
    )?;

    Ok(SettleOutcome::Filled)
}

fn mark_order(
    tx: &Transaction,
    order_id: i64,
    status: OrderStatus,
    filled_quantity: Option<f64>,
    average_fill_price: Option<f64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let filled_at: Option<DateTime<Utc>> = (status == OrderStatus::Filled).then_some(now);
    let cancelled_at: Option<DateTime<Utc>> = (status == OrderStatus::Cancelled).then_some(now);
    tx.execute(
        "UPDATE orders SET \
            status = ?2, \
            filled_quantity = COALESCE(?3, filled_quantity), \
            average_fill_price = COALESCE(?4, average_fill_price), \
            filled_at = COALESCE(?5, filled_at), \
            cancelled_at = COALESCE(?6, cancelled_at), \
            updated_at = ?7 \
         WHERE id = ?1",
        params![
            order_id,
            status.as_str(),
            filled_quantity,
            average_fill_price,
            filled_at,
            cancelled_at,
            now,
        ],
    )?;
    Ok(())
}
