//! Alpha Vantage. Numeric fields arrive as strings ("None" / "-" for
//! absent); rate-limit notes are treated as empty payloads. The API key
//! lives in the `Alpha_vantage` setting row.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{
    Fetch, HistoricalBar, HistoryPeriod, InfoRecord, Provider, ProviderKind, Quote,
    VendorIndicators, PROVIDER_TIMEOUT,
};
use crate::storage::settings::SettingsRepo;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const KEY_SETTING: &str = "Alpha_vantage";

pub struct AlphaVantageProvider {
    http: reqwest::Client,
    settings: SettingsRepo,
}

impl AlphaVantageProvider {
    pub fn new(http: reqwest::Client, settings: SettingsRepo) -> Self {
        Self { http, settings }
    }

    async fn api_key(&self) -> Option<String> {
        self.settings.api_key(KEY_SETTING).await.ok().flatten()
    }

    async fn get(&self, query: &str) -> Fetch<serde_json::Value> {
        let Some(key) = self.api_key().await else {
            return Fetch::Empty;
        };
        let url = format!("{BASE_URL}?{query}&apikey={key}");
        let resp = match self.http.get(&url).timeout(PROVIDER_TIMEOUT).send().await {
            Ok(resp) => resp,
            Err(e) => return Fetch::failed_from(e),
        };
        if !resp.status().is_success() {
            return Fetch::Failed(format!("alpha vantage {}", resp.status().as_u16()));
        }
        let body: serde_json::Value = match resp.json().await {
            Ok(body) => body,
            Err(e) => return Fetch::failed_from(e),
        };
        // Rate-limit and error payloads come back 200 with a Note/Information
        // field; both count as no data.
        if body.get("Note").is_some()
            || body.get("Information").is_some()
            || body.get("Error Message").is_some()
        {
            return Fetch::Empty;
        }
        Fetch::Found(body)
    }
}

fn parse_num(value: Option<&serde_json::Value>) -> Option<f64> {
    let s = value?.as_str()?;
    match s.trim() {
        "" | "None" | "-" | "N/A" => None,
        s => s.parse().ok(),
    }
}

fn parse_str(value: Option<&serde_json::Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    if s.is_empty() || s == "None" || s == "N/A" {
        None
    } else {
        Some(s.to_string())
    }
}

#[async_trait]
impl Provider for AlphaVantageProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AlphaVantage
    }

    async fn fetch_info(&self, symbol: &str) -> Fetch<InfoRecord> {
        let body = match self.get(&format!("function=OVERVIEW&symbol={symbol}")).await {
            Fetch::Found(body) => body,
            Fetch::Empty => return Fetch::Empty,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };
        if body.get("Symbol").is_none() {
            return Fetch::Empty;
        }

        Fetch::Found(InfoRecord {
            symbol: symbol.to_ascii_uppercase(),
            name: parse_str(body.get("Name")),
            sector: parse_str(body.get("Sector")),
            industry: parse_str(body.get("Industry")),
            description: parse_str(body.get("Description")),
            exchange: parse_str(body.get("Exchange")),
            currency: parse_str(body.get("Currency")),
            market_cap: parse_num(body.get("MarketCapitalization")),
            pe_ratio: parse_num(body.get("PERatio")),
            forward_pe: parse_num(body.get("ForwardPE")),
            pb_ratio: parse_num(body.get("PriceToBookRatio")),
            peg_ratio: parse_num(body.get("PEGRatio")),
            dividend_yield: parse_num(body.get("DividendYield")),
            beta: parse_num(body.get("Beta")),
            debt_to_equity: None,
            profit_margins: parse_num(body.get("ProfitMargin")),
            return_on_equity: parse_num(body.get("ReturnOnEquityTTM")),
            revenue_growth: parse_num(body.get("QuarterlyRevenueGrowthYOY")),
            eps_growth: parse_num(body.get("QuarterlyEarningsGrowthYOY")),
            fifty_two_week_high: parse_num(body.get("52WeekHigh")),
            fifty_two_week_low: parse_num(body.get("52WeekLow")),
        })
    }

    async fn fetch_current_price(&self, symbol: &str) -> Fetch<Quote> {
        let body = match self.get(&format!("function=GLOBAL_QUOTE&symbol={symbol}")).await {
            Fetch::Found(body) => body,
            Fetch::Empty => return Fetch::Empty,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };
        let Some(quote) = body.get("Global Quote") else {
            return Fetch::Empty;
        };
        let Some(price) = parse_num(quote.get("05. price")) else {
            return Fetch::Empty;
        };
        Fetch::Found(Quote {
            symbol: symbol.to_ascii_uppercase(),
            price,
            name: None,
            exchange: None,
            currency: None,
        })
    }

    async fn fetch_historical(&self, symbol: &str, period: HistoryPeriod) -> Fetch<Vec<HistoricalBar>> {
        let output_size = if period.days() > 100 { "full" } else { "compact" };
        let body = match self
            .get(&format!(
                "function=TIME_SERIES_DAILY&symbol={symbol}&outputsize={output_size}"
            ))
            .await
        {
            Fetch::Found(body) => body,
            Fetch::Empty => return Fetch::Empty,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };
        let Some(series) = body.get("Time Series (Daily)") else {
            return Fetch::Empty;
        };
        let Ok(series) = serde_json::from_value::<BTreeMap<String, DailyBar>>(series.clone()) else {
            return Fetch::Empty;
        };

        let cutoff = Utc::now().date_naive() - chrono::Duration::days(period.days());
        let mut bars = Vec::new();
        // BTreeMap iteration is date-ascending, which is the order callers
        // expect.
        for (date, bar) in &series {
            let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
                continue;
            };
            if date < cutoff {
                continue;
            }
            let Some(close) = bar.close.parse::<f64>().ok() else {
                continue;
            };
            let Some(timestamp) = Utc
                .from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
                .single()
            else {
                continue;
            };
            bars.push(HistoricalBar {
                timestamp,
                open: bar.open.parse().unwrap_or(close),
                high: bar.high.parse().unwrap_or(close),
                low: bar.low.parse().unwrap_or(close),
                close,
                volume: bar.volume.parse().unwrap_or(0),
            });
        }

        if bars.is_empty() {
            Fetch::Empty
        } else {
            Fetch::Found(bars)
        }
    }

    async fn fetch_indicators(&self, symbol: &str) -> Fetch<VendorIndicators> {
        let body = match self
            .get(&format!(
                "function=RSI&symbol={symbol}&interval=daily&time_period=14&series_type=close"
            ))
            .await
        {
            Fetch::Found(body) => body,
            Fetch::Empty => return Fetch::Empty,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };
        let Some(series) = body.get("Technical Analysis: RSI") else {
            return Fetch::Empty;
        };
        let Some(map) = series.as_object() else {
            return Fetch::Empty;
        };
        // Keys are dates; the lexicographic maximum is the newest sample.
        let rsi = map
            .iter()
            .max_by(|a, b| a.0.cmp(b.0))
            .and_then(|(_, v)| parse_num(v.get("RSI")));

        match rsi {
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
struct DailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_fields_treat_sentinels_as_absent() {
        let doc: serde_json::Value = serde_json::json!({
            "PERatio": "24.5",
            "Beta": "None",
            "DividendYield": "-",
            "Sector": "Technology",
        });
        assert_eq!(parse_num(doc.get("PERatio")), Some(24.5));
        assert_eq!(parse_num(doc.get("Beta")), None);
        assert_eq!(parse_num(doc.get("DividendYield")), None);
        assert_eq!(parse_num(doc.get("Missing")), None);
        assert_eq!(parse_str(doc.get("Sector")).as_deref(), Some("Technology"));
    }
}
