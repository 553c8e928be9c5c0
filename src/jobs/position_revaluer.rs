//! Position revaluer: refreshes mark-to-market prices and unrealized P&L
//! for every position. A failure on one instrument never aborts the batch.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use super::Job;
use crate::providers::ProviderStack;
use crate::storage::Store;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

pub struct PositionRevaluer {
    store: Store,
    providers: ProviderStack,
}

impl PositionRevaluer {
    pub fn new(store: Store, providers: ProviderStack) -> Self {
        Self { store, providers }
    }
}

#[async_trait]
impl Job for PositionRevaluer {
    async fn run(&self) -> anyhow::Result<()> {
        let positions = self.store.positions().get_all().await?;
        if positions.is_empty() {
            return Ok(());
        }

        let mut updated = 0usize;
        let mut failed = 0usize;

        for position in &positions {
            let Some(instrument) = self
                .store
                .instruments()
                .get_by_id(position.symbol_id)
                .await?
            else {
                warn!(position_id = position.id, "instrument missing for position");
                failed += 1;
                continue;
            };

            let Some(quote) = self.providers.current_price(&instrument.symbol).await else {
                warn!(symbol = %instrument.symbol, "no current price for revaluation");
                failed += 1;
                continue;
            };

            let unrealized = (quote.price - position.average_entry_price) * position.quantity;
            if let Err(e) = self
                .store
                .positions()
                .update_mark(position.id, quote.price, unrealized)
                .await
            {
                warn!(symbol = %instrument.symbol, error = %e, "failed to update mark");
                failed += 1;
                continue;
            }
            updated += 1;
        }

        info!(updated, failed, "position revaluation completed");
        Ok(())
    }
}
