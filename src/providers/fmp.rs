//! Financial Modeling Prep. Preferred vendor for fundamentals; profile and
//! ratio endpoints are merged into one info record. The API key lives in
//! the `Financial_modeling_prep` setting row.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    Fetch, HistoricalBar, HistoryPeriod, InfoRecord, Provider, ProviderKind, Quote,
    VendorIndicators, PROVIDER_TIMEOUT,
};
use crate::storage::settings::SettingsRepo;

const BASE_URL: &str = "https://financialmodelingprep.com/stable";
const KEY_SETTING: &str = "Financial_modeling_prep";

pub struct FmpProvider {
    http: reqwest::Client,
    settings: SettingsRepo,
}

impl FmpProvider {
    pub fn new(http: reqwest::Client, settings: SettingsRepo) -> Self {
        Self { http, settings }
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &str) -> Fetch<T> {
        let Some(key) = self.settings.api_key(KEY_SETTING).await.ok().flatten() else {
            return Fetch::Empty;
        };
        let url = format!("{BASE_URL}/{endpoint}?{query}&apikey={key}");
        let resp = match self.http.get(&url).timeout(PROVIDER_TIMEOUT).send().await {
            Ok(resp) => resp,
            Err(e) => return Fetch::failed_from(e),
        };
        let status = resp.status();
        if status.as_u16() == 429 {
            // Vendor rate limit: no data, not an error.
            return Fetch::Empty;
        }
        if !status.is_success() {
            return Fetch::Failed(format!("fmp {}", status.as_u16()));
        }
        match resp.json().await {
            Ok(body) => Fetch::Found(body),
            Err(e) => Fetch::failed_from(e),
        }
    }
}

#[async_trait]
impl Provider for FmpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fmp
    }

    async fn fetch_info(&self, symbol: &str) -> Fetch<InfoRecord> {
        let profiles: Vec<FmpProfile> =
            match self.get("profile", &format!("symbol={symbol}")).await {
                Fetch::Found(p) => p,
                Fetch::Empty => return Fetch::Empty,
                Fetch::Failed(reason) => return Fetch::Failed(reason),
            };
        let Some(profile) = profiles.into_iter().next() else {
            return Fetch::Empty;
        };

        // Ratios are best-effort enrichment; the profile alone is a valid
        // record.
        let ratios: Option<FmpRatios> = match self.get::<Vec<FmpRatios>>("ratios", &format!("symbol={symbol}")).await
        {
            Fetch::Found(r) => r.into_iter().next(),
            _ => None,
        };
        let ratios = ratios.unwrap_or_default();

        Fetch::Found(InfoRecord {
            symbol: symbol.to_ascii_uppercase(),
            name: profile.company_name,
            sector: profile.sector,
            industry: profile.industry,
            description: profile.description,
            exchange: profile.exchange,
            currency: profile.currency,
            market_cap: profile.market_cap,
            pe_ratio: ratios.price_earnings_ratio,
            forward_pe: None,
            pb_ratio: ratios.price_to_book_ratio,
            peg_ratio: ratios.peg_ratio,
            dividend_yield: ratios.dividend_yield,
            beta: profile.beta,
            debt_to_equity: ratios.debt_equity_ratio,
            profit_margins: ratios.net_profit_margin,
            return_on_equity: ratios.return_on_equity,
            revenue_growth: None,
            eps_growth: None,
            fifty_two_week_high: None,
            fifty_two_week_low: None,
        })
    }

    async fn fetch_current_price(&self, symbol: &str) -> Fetch<Quote> {
        let quotes: Vec<FmpQuote> = match self.get("quote", &format!("symbol={symbol}")).await {
            Fetch::Found(q) => q,
            Fetch::Empty => return Fetch::Empty,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };
        let Some(quote) = quotes.into_iter().next() else {
            return Fetch::Empty;
        };
        let Some(price) = quote.price else {
            return Fetch::Empty;
        };
        Fetch::Found(Quote {
            symbol: symbol.to_ascii_uppercase(),
            price,
            name: quote.name,
            exchange: quote.exchange,
            currency: None,
        })
    }

    async fn fetch_historical(&self, symbol: &str, period: HistoryPeriod) -> Fetch<Vec<HistoricalBar>> {
        let bars: Vec<FmpBar> = match self
            .get("historical-price-eod/full", &format!("symbol={symbol}"))
            .await
        {
            Fetch::Found(b) => b,
            Fetch::Empty => return Fetch::Empty,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };

        let cutoff = Utc::now().date_naive() - chrono::Duration::days(period.days());
        let mut out = Vec::new();
        for bar in bars {
            let Ok(date) = NaiveDate::parse_from_str(&bar.date, "%Y-%m-%d") else {
                continue;
            };
            if date < cutoff {
                continue;
            }
            let Some(close) = bar.close else { continue };
            let Some(timestamp) = Utc
                .from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
                .single()
            else {
                continue;
            };
            out.push(HistoricalBar {
                timestamp,
                open: bar.open.unwrap_or(close),
                high: bar.high.unwrap_or(close),
                low: bar.low.unwrap_or(close),
                close,
                volume: bar.volume.unwrap_or(0),
            });
        }

        // The feed is newest-first; callers expect oldest-first.
        out.sort_by_key(|b| b.timestamp);
        if out.is_empty() {
            Fetch::Empty
        } else {
            Fetch::Found(out)
        }
    }

    async fn fetch_indicators(&self, symbol: &str) -> Fetch<VendorIndicators> {
        let points: Vec<FmpRsiPoint> = match self
            .get(
                "technical-indicators/rsi",
                &format!("symbol={symbol}&periodLength=14&timeframe=1day"),
            )
            .await
        {
            Fetch::Found(p) => p,
            Fetch::Empty => return Fetch::Empty,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };
        match points.into_iter().find_map(|p| p.rsi) {
            Some(rsi) => Fetch::Found(VendorIndicators {
                rsi: Some(rsi),
                sma_50: None,
                sma_200: None,
            }),
            None => Fetch::Empty,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpProfile {
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, alias = "mktCap")]
    market_cap: Option<f64>,
    #[serde(default)]
    beta: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpRatios {
    #[serde(default)]
    price_earnings_ratio: Option<f64>,
    #[serde(default)]
    price_to_book_ratio: Option<f64>,
    #[serde(default, alias = "priceEarningsToGrowthRatio")]
    peg_ratio: Option<f64>,
    #[serde(default)]
    dividend_yield: Option<f64>,
    #[serde(default)]
    debt_equity_ratio: Option<f64>,
    #[serde(default)]
    net_profit_margin: Option<f64>,
    #[serde(default)]
    return_on_equity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FmpQuote {
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    exchange: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FmpBar {
    date: String,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    close: Option<f64>,
    #[serde(default)]
    volume: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FmpRsiPoint {
    #[serde(default)]
    rsi: Option<f64>,
}
