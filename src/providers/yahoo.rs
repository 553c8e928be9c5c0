//! Yahoo Finance. Keyless; quotes and history come from the chart API,
//! fundamentals from quoteSummary. Preferred vendor for quotes and
//! historical bars.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;

use super::{
    Fetch, HistoricalBar, HistoryPeriod, InfoRecord, Provider, ProviderKind, Quote,
    VendorIndicators, PROVIDER_TIMEOUT,
};
use crate::analysis::technical;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SUMMARY_URL: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";

pub struct YahooProvider {
    http: reqwest::Client,
}

impl YahooProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn get_chart(&self, symbol: &str, range: &str) -> Fetch<ChartResult> {
        let url = format!("{CHART_URL}/{symbol}?range={range}&interval=1d");
        let resp = match self.http.get(&url).timeout(PROVIDER_TIMEOUT).send().await {
            Ok(resp) => resp,
            Err(e) => return Fetch::failed_from(e),
        };
        if !resp.status().is_success() {
            return Fetch::Failed(format!("yahoo chart {}", resp.status().as_u16()));
        }
        let body: ChartResponse = match resp.json().await {
            Ok(body) => body,
            Err(e) => return Fetch::failed_from(e),
        };
        match body.chart.result.into_iter().flatten().next() {
            Some(result) => Fetch::Found(result),
            None => Fetch::Empty,
        }
    }
}

#[async_trait]
impl Provider for YahooProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Yahoo
    }

    async fn fetch_info(&self, symbol: &str) -> Fetch<InfoRecord> {
        let url = format!(
            "{SUMMARY_URL}/{symbol}?modules=summaryDetail,defaultKeyStatistics,assetProfile,financialData,price"
        );
        let resp = match self.http.get(&url).timeout(PROVIDER_TIMEOUT).send().await {
            Ok(resp) => resp,
            Err(e) => return Fetch::failed_from(e),
        };
        if !resp.status().is_success() {
            return Fetch::Failed(format!("yahoo quoteSummary {}", resp.status().as_u16()));
        }
        let body: SummaryResponse = match resp.json().await {
            Ok(body) => body,
            Err(e) => return Fetch::failed_from(e),
        };
        let Some(result) = body.quote_summary.result.into_iter().flatten().next() else {
            return Fetch::Empty;
        };

        let summary = result.summary_detail.unwrap_or_default();
        let stats = result.default_key_statistics.unwrap_or_default();
        let profile = result.asset_profile.unwrap_or_default();
        let financial = result.financial_data.unwrap_or_default();
        let price = result.price.unwrap_or_default();

        Fetch::Found(InfoRecord {
            symbol: symbol.to_ascii_uppercase(),
            name: price.long_name.or(price.short_name),
            sector: profile.sector,
            industry: profile.industry,
            description: profile.long_business_summary,
            exchange: price.exchange_name,
            currency: price.currency,
            market_cap: summary.market_cap.and_then(|v| v.raw),
            pe_ratio: summary.trailing_pe.and_then(|v| v.raw),
            forward_pe: summary.forward_pe.and_then(|v| v.raw),
            pb_ratio: stats.price_to_book.and_then(|v| v.raw),
            peg_ratio: stats.peg_ratio.and_then(|v| v.raw),
            dividend_yield: summary.dividend_yield.and_then(|v| v.raw),
            beta: summary.beta.and_then(|v| v.raw),
            debt_to_equity: financial.debt_to_equity.and_then(|v| v.raw),
            profit_margins: financial.profit_margins.and_then(|v| v.raw),
            return_on_equity: financial.return_on_equity.and_then(|v| v.raw),
            revenue_growth: financial.revenue_growth.and_then(|v| v.raw),
            eps_growth: None,
            fifty_two_week_high: summary.fifty_two_week_high.and_then(|v| v.raw),
            fifty_two_week_low: summary.fifty_two_week_low.and_then(|v| v.raw),
        })
    }

    async fn fetch_current_price(&self, symbol: &str) -> Fetch<Quote> {
        let result = match self.get_chart(symbol, "1d").await {
            Fetch::Found(result) => result,
            Fetch::Empty => return Fetch::Empty,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };
        let Some(price) = result.meta.regular_market_price else {
            return Fetch::Empty;
        };
        Fetch::Found(Quote {
            symbol: symbol.to_ascii_uppercase(),
            price,
            name: result.meta.short_name,
            exchange: result.meta.exchange_name,
            currency: result.meta.currency,
        })
    }

    async fn fetch_historical(&self, symbol: &str, period: HistoryPeriod) -> Fetch<Vec<HistoricalBar>> {
        let result = match self.get_chart(symbol, period.yahoo_range()).await {
            Fetch::Found(result) => result,
            Fetch::Empty => return Fetch::Empty,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };

        let timestamps = result.timestamp.unwrap_or_default();
        let Some(quote) = result
            .indicators
            .and_then(|ind| ind.quote.into_iter().flatten().next())
        else {
            return Fetch::Empty;
        };

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, ts) in timestamps.iter().enumerate() {
            let close = quote.close.get(i).copied().flatten();
            let Some(close) = close else { continue };
            let Some(timestamp) = Utc.timestamp_opt(*ts, 0).single() else {
                continue;
            };
            bars.push(HistoricalBar {
                timestamp,
                open: quote.open.get(i).copied().flatten().unwrap_or(close),
                high: quote.high.get(i).copied().flatten().unwrap_or(close),
                low: quote.low.get(i).copied().flatten().unwrap_or(close),
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
            });
        }

        if bars.is_empty() {
            Fetch::Empty
        } else {
            Fetch::Found(bars)
        }
    }

    /// Yahoo has no indicator endpoint; derive RSI and the moving averages
    /// from six months of daily closes.
    async fn fetch_indicators(&self, symbol: &str) -> Fetch<VendorIndicators> {
        let bars = match self.fetch_historical(symbol, HistoryPeriod::SixMonths).await {
            Fetch::Found(bars) => bars,
            Fetch::Empty => return Fetch::Empty,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        Fetch::Found(VendorIndicators {
            rsi: technical::rsi(&closes, technical::RSI_PERIOD),
            sma_50: technical::sma(&closes, 50),
            sma_200: technical::sma(&closes, 200),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Vec<Option<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    exchange_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<Option<ChartQuote>>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummary,
}

#[derive(Debug, Deserialize)]
struct QuoteSummary {
    #[serde(default)]
    result: Vec<Option<SummaryResult>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    #[serde(default)]
    summary_detail: Option<SummaryDetail>,
    #[serde(default)]
    default_key_statistics: Option<KeyStatistics>,
    #[serde(default)]
    asset_profile: Option<AssetProfile>,
    #[serde(default)]
    financial_data: Option<FinancialData>,
    #[serde(default)]
    price: Option<PriceModule>,
}

/// Yahoo wraps numerics as `{"raw": 1.23, "fmt": "1.23"}`.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    #[serde(default)]
    market_cap: Option<RawValue>,
    #[serde(default)]
    trailing_pe: Option<RawValue>,
    #[serde(default)]
    forward_pe: Option<RawValue>,
    #[serde(default)]
    dividend_yield: Option<RawValue>,
    #[serde(default)]
    beta: Option<RawValue>,
    #[serde(default)]
    fifty_two_week_high: Option<RawValue>,
    #[serde(default)]
    fifty_two_week_low: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatistics {
    #[serde(default)]
    price_to_book: Option<RawValue>,
    #[serde(default)]
    peg_ratio: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetProfile {
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    long_business_summary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    #[serde(default)]
    debt_to_equity: Option<RawValue>,
    #[serde(default)]
    profit_margins: Option<RawValue>,
    #[serde(default)]
    return_on_equity: Option<RawValue>,
    #[serde(default)]
    revenue_growth: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    exchange_name: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}
