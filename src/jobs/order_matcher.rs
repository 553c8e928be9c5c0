//! Order matcher: drains PENDING orders FIFO and simulates fills. The fill
//! price is the order's limit price when present, otherwise the live quote;
//! without either the order stays PENDING and a warning is logged.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info, warn};

use super::Job;
use crate::models::Order;
use crate::providers::ProviderStack;
use crate::storage::settlement::SettleOutcome;
use crate::storage::Store;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
const MODULE: &str = "order_matcher";

pub struct OrderMatcher {
    store: Store,
    providers: ProviderStack,
}

impl OrderMatcher {
    pub fn new(store: Store, providers: ProviderStack) -> Self {
        Self { store, providers }
    }

    async fn fill_price(&self, order: &Order) -> Option<f64> {
        if let Some(price) = order.price.filter(|p| *p > 0.0) {
            return Some(price);
        }
        let instrument = self
            .store
            .instruments()
            .get_by_id(order.symbol_id)
            .await
            .ok()
            .flatten()?;
        self.providers
            .current_price(&instrument.symbol)
            .await
            .map(|q| q.price)
    }

    async fn process_order(&self, order: &Order) -> anyhow::Result<()> {
        let Some(fill_price) = self.fill_price(order).await else {
            warn!(order_id = order.id, "no fill price available, order stays pending");
            self.store
                .system_log()
                .warning(
                    MODULE,
                    &format!("no fill price for order {}", order.id),
                    None,
                )
                .await?;
            return Ok(());
        };

        let outcome = self
            .store
            .settlement()
            .settle_order(order, fill_price)
            .await?;

        match outcome {
            SettleOutcome::Filled => {
                info!(
                    order_id = order.id,
                    side = order.side.as_str(),
                    quantity = order.quantity,
                    fill_price,
                    "order filled"
                );
            }
            SettleOutcome::Rejected => {
                error!(
                    order_id = order.id,
                    quantity = order.quantity,
                    fill_price,
                    "insufficient cash, order rejected"
                );
                self.store
                    .system_log()
                    .error(
                        MODULE,
                        &format!("insufficient cash balance for BUY order {}", order.id),
                        Some(&format!(
                            "required {:.2}",
                            order.quantity * fill_price
                        )),
                    )
                    .await?;
            }
            SettleOutcome::InsufficientShares => {
                // Deliberately not auto-rejected; see the sell-side policy.
                error!(
                    order_id = order.id,
                    quantity = order.quantity,
                    "insufficient position quantity for SELL order"
                );
                self.store
                    .system_log()
                    .error(
                        MODULE,
                        &format!("insufficient position quantity for SELL order {}", order.id),
                        None,
                    )
                    .await?;
            }
            SettleOutcome::AlreadySettled => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Job for OrderMatcher {
    async fn run(&self) -> anyhow::Result<()> {
        let pending = self.store.orders().pending().await?;
        if pending.is_empty() {
            return Ok(());
        }
        info!(count = pending.len(), "processing pending orders");

        for order in &pending {
            if let Err(e) = self.process_order(order).await {
                // The transaction rolled back; the order stays PENDING for
                // the next tick.
                error!(order_id = order.id, error = %e, "error processing order");
                let _ = self
                    .store
                    .system_log()
                    .error(
                        MODULE,
                        &format!("error processing order {}", order.id),
                        Some(&format!("{e:#}")),
                    )
                    .await;
            }
        }
        Ok(())
    }
}
