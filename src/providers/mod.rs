//! Market-data vendor abstraction. Each vendor implements the capability
//! set (info, quote, history, indicators); the stack fans out across
//! vendors in a per-capability preferred order and takes the first answer
//! whose sentinel field is populated. Vendor failures never propagate:
//! they degrade to `Empty` and the next vendor is tried.

pub mod alpha_vantage;
pub mod fmp;
pub mod yahoo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::storage::settings::SettingsRepo;

pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Normalized fundamental info payload. A missing field means the vendor
/// did not report it, which is distinct from zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfoRecord {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub forward_pe: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub profit_margins: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub eps_growth: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Vendor-computed technical indicators; RSI is the sentinel field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorIndicators {
    pub rsi: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPeriod {
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
}

impl HistoryPeriod {
    pub fn days(&self) -> i64 {
        match self {
            Self::OneMonth => 30,
            Self::ThreeMonths => 90,
            Self::SixMonths => 182,
            Self::OneYear => 365,
        }
    }

    pub fn yahoo_range(&self) -> &'static str {
        match self {
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
        }
    }
}

/// Outcome of a single vendor call. `Empty` covers "answered but has no
/// data" as well as missing credentials; `Failed` covers transport and
/// decode errors. The fan-out loop treats both as "try the next vendor".
#[derive(Debug, Clone)]
pub enum Fetch<T> {
    Found(T),
    Empty,
    Failed(String),
}

impl<T> Fetch<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            _ => None,
        }
    }

    pub fn failed_from(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Yahoo,
    AlphaVantage,
    Fmp,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::AlphaVantage => "alpha_vantage",
            Self::Fmp => "fmp",
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn fetch_info(&self, symbol: &str) -> Fetch<InfoRecord>;
    async fn fetch_current_price(&self, symbol: &str) -> Fetch<Quote>;
    async fn fetch_historical(&self, symbol: &str, period: HistoryPeriod) -> Fetch<Vec<HistoricalBar>>;
    async fn fetch_indicators(&self, symbol: &str) -> Fetch<VendorIndicators>;
}

/// Ordered failover across vendors, one preferred order per capability.
#[derive(Clone)]
pub struct ProviderStack {
    info_order: Vec<Arc<dyn Provider>>,
    quote_order: Vec<Arc<dyn Provider>>,
    indicator_order: Vec<Arc<dyn Provider>>,
    history_order: Vec<Arc<dyn Provider>>,
}

impl ProviderStack {
    /// Production wiring: FMP -> Alpha Vantage -> Yahoo for fundamentals,
    /// Yahoo -> Alpha Vantage -> FMP for quotes and history,
    /// Alpha Vantage -> Yahoo -> FMP for indicators.
    pub fn live(http: reqwest::Client, settings: SettingsRepo) -> Self {
        let yahoo: Arc<dyn Provider> = Arc::new(yahoo::YahooProvider::new(http.clone()));
        let alpha: Arc<dyn Provider> = Arc::new(alpha_vantage::AlphaVantageProvider::new(
            http.clone(),
            settings.clone(),
        ));
        let fmp: Arc<dyn Provider> = Arc::new(fmp::FmpProvider::new(http, settings));

        Self {
            info_order: vec![fmp.clone(), alpha.clone(), yahoo.clone()],
            quote_order: vec![yahoo.clone(), alpha.clone(), fmp.clone()],
            indicator_order: vec![alpha.clone(), yahoo.clone(), fmp.clone()],
            history_order: vec![yahoo, alpha, fmp],
        }
    }

    /// Custom vendor ordering; one shared order for every capability.
    /// Used by tests to inject fakes.
    pub fn with_providers(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            info_order: providers.clone(),
            quote_order: providers.clone(),
            indicator_order: providers.clone(),
            history_order: providers,
        }
    }

    pub async fn info(&self, symbol: &str) -> Option<InfoRecord> {
        for provider in &self.info_order {
            match provider.fetch_info(symbol).await {
                // pe_ratio is the info sentinel; a payload without it is
                // treated as empty and the next vendor consulted.
                Fetch::Found(record) if record.pe_ratio.is_some() => {
                    debug!(symbol, provider = provider.kind().as_str(), "info hit");
                    return Some(record);
                }
                Fetch::Found(_) | Fetch::Empty => continue,
                Fetch::Failed(reason) => {
                    debug!(symbol, provider = provider.kind().as_str(), %reason, "info failed");
                }
            }
        }
        None
    }

    pub async fn current_price(&self, symbol: &str) -> Option<Quote> {
        for provider in &self.quote_order {
            match provider.fetch_current_price(symbol).await {
                Fetch::Found(quote) if quote.price > 0.0 => {
                    debug!(symbol, provider = provider.kind().as_str(), price = quote.price, "quote hit");
                    return Some(quote);
                }
                Fetch::Found(_) | Fetch::Empty => continue,
                Fetch::Failed(reason) => {
                    debug!(symbol, provider = provider.kind().as_str(), %reason, "quote failed");
                }
            }
        }
        None
    }

    pub async fn historical(&self, symbol: &str, period: HistoryPeriod) -> Option<Vec<HistoricalBar>> {
        for provider in &self.history_order {
            match provider.fetch_historical(symbol, period).await {
                Fetch::Found(bars) if !bars.is_empty() => {
                    debug!(symbol, provider = provider.kind().as_str(), bars = bars.len(), "history hit");
                    return Some(bars);
                }
                Fetch::Found(_) | Fetch::Empty => continue,
                Fetch::Failed(reason) => {
                    debug!(symbol, provider = provider.kind().as_str(), %reason, "history failed");
                }
            }
        }
        None
    }

    pub async fn indicators(&self, symbol: &str) -> Option<VendorIndicators> {
        for provider in &self.indicator_order {
            match provider.fetch_indicators(symbol).await {
                Fetch::Found(ind) if ind.rsi.is_some() => {
                    debug!(symbol, provider = provider.kind().as_str(), "indicators hit");
                    return Some(ind);
                }
                Fetch::Found(_) | Fetch::Empty => continue,
                Fetch::Failed(reason) => {
                    debug!(symbol, provider = provider.kind().as_str(), %reason, "indicators failed");
                }
            }
        }
        None
    }

    /// Close-price series (oldest first) for indicator computation.
    pub async fn close_series(&self, symbol: &str, period: HistoryPeriod) -> Option<Vec<f64>> {
        let bars = self.historical(symbol, period).await?;
        Some(bars.iter().map(|b| b.close).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        kind: ProviderKind,
        info: Fetch<InfoRecord>,
        quote: Fetch<Quote>,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn fetch_info(&self, _symbol: &str) -> Fetch<InfoRecord> {
            self.info.clone()
        }

        async fn fetch_current_price(&self, _symbol: &str) -> Fetch<Quote> {
            self.quote.clone()
        }

        async fn fetch_historical(&self, _symbol: &str, _period: HistoryPeriod) -> Fetch<Vec<HistoricalBar>> {
            Fetch::Empty
        }

        async fn fetch_indicators(&self, _symbol: &str) -> Fetch<VendorIndicators> {
            Fetch::Empty
        }
    }

    fn quote(price: f64) -> Quote {
        Quote {
            symbol: "AAPL".into(),
            price,
            name: None,
            exchange: None,
            currency: None,
        }
    }

    #[tokio::test]
    async fn failover_skips_failed_and_sentinel_less_vendors() {
        let first = Arc::new(StubProvider {
            kind: ProviderKind::Fmp,
            info: Fetch::Failed("503".into()),
            quote: Fetch::Failed("503".into()),
        });
        let second = Arc::new(StubProvider {
            kind: ProviderKind::AlphaVantage,
            info: Fetch::Found(InfoRecord {
                symbol: "AAPL".into(),
                ..Default::default()
            }),
            quote: Fetch::Found(quote(0.0)),
        });
        let third = Arc::new(StubProvider {
            kind: ProviderKind::Yahoo,
            info: Fetch::Found(InfoRecord {
                symbol: "AAPL".into(),
                pe_ratio: Some(21.5),
                ..Default::default()
            }),
            quote: Fetch::Found(quote(187.3)),
        });

        let stack = ProviderStack::with_providers(vec![first, second, third]);

        let info = stack.info("AAPL").await.unwrap();
        assert_eq!(info.pe_ratio, Some(21.5));

        let q = stack.current_price("AAPL").await.unwrap();
        assert_eq!(q.price, 187.3);
    }

    #[tokio::test]
    async fn total_failure_is_no_data_not_an_error() {
        let only = Arc::new(StubProvider {
            kind: ProviderKind::Yahoo,
            info: Fetch::Empty,
            quote: Fetch::Failed("timeout".into()),
        });
        let stack = ProviderStack::with_providers(vec![only]);
        assert!(stack.info("ZZZZ").await.is_none());
        assert!(stack.current_price("ZZZZ").await.is_none());
        assert!(stack.historical("ZZZZ", HistoryPeriod::SixMonths).await.is_none());
    }
}
