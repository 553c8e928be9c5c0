//! Market-data refresher: during market hours, writes one 1-minute bar per
//! active instrument per tick, OHLC collapsed to the fetched quote.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::Job;
use crate::market_hours;
use crate::providers::ProviderStack;
use crate::storage::market_data::NewBar;
use crate::storage::Store;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

pub struct MarketDataRefresher {
    store: Store,
    providers: ProviderStack,
}

impl MarketDataRefresher {
    pub fn new(store: Store, providers: ProviderStack) -> Self {
        Self { store, providers }
    }
}

#[async_trait]
impl Job for MarketDataRefresher {
    async fn run(&self) -> anyhow::Result<()> {
        if !market_hours::is_market_open_now() {
            debug!("market closed, skipping market data update");
            return Ok(());
        }

        let instruments = self.store.instruments().get_all(true).await?;
        if instruments.is_empty() {
            return Ok(());
        }

        let mut updated = 0usize;
        let mut failed = 0usize;

        for instrument in &instruments {
            let Some(quote) = self.providers.current_price(&instrument.symbol).await else {
                warn!(symbol = %instrument.symbol, "could not fetch current price");
                failed += 1;
                continue;
            };

            let bar = NewBar::from_quote(instrument.id, Utc::now(), quote.price);
            if let Err(e) = self.store.market_data().insert(&bar).await {
                warn!(symbol = %instrument.symbol, error = %e, "failed to store bar");
                failed += 1;
                continue;
            }
            updated += 1;
        }

        info!(updated, failed, "market data update completed");
        Ok(())
    }
}
