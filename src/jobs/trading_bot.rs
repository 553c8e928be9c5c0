//! Trading bot: per-account strategy resolution, universe resolution (with
//! the AI list cache), composite signal scoring, and order emission. Every
//! decision, HOLD included, is persisted as a signal before any order is
//! created for it.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::Job;
use crate::ai::{
    self, AiPlatform, CachedStockList, StockListGenerator, AI_CACHE_CATEGORY, AI_CACHE_TTL_HOURS,
};
use crate::analysis::fundamental::FundamentalSnapshot;
use crate::analysis::technical::TechnicalSnapshot;
use crate::models::{
    Account, OrderSide, OrderType, Position, SignalAction, Strategy, Trend,
};
use crate::providers::{HistoryPeriod, ProviderStack};
use crate::storage::orders::NewOrder;
use crate::storage::signals::NewSignal;
use crate::storage::Store;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);
const MODULE: &str = "trading_bot";

/// Parameter keys whose presence switches fundamental analysis on.
const FUNDAMENTAL_PARAM_KEYS: &[&str] = &[
    "min_quality_score",
    "max_pe",
    "max_pb",
    "min_dividend_yield",
    "max_pe_ratio",
    "minimum_roe_percent",
    "conviction_score_minimum",
    "preferred_industry_moat",
    "sell_on_fundamental_shift",
    "underlying_quality_required",
    "narrative_match_required",
    "min_revenue_growth",
    "min_eps_growth",
    "max_peg",
    "discount_to_intrinsic_value",
    "required_margin_of_safety_percent",
];

const VALUATION_PARAM_KEYS: &[&str] = &[
    "max_pe",
    "max_pb",
    "max_pe_ratio",
    "max_peg",
    "discount_to_intrinsic_value",
    "required_margin_of_safety_percent",
];

/// A strategy's parameter bag merged over the engine defaults. Accepts a
/// structured JSON object or a doubly serialized one.
#[derive(Debug, Clone, Default)]
pub struct StrategyParams {
    map: Map<String, Value>,
}

impl StrategyParams {
    pub fn parse(raw: Option<&str>) -> Self {
        let map = raw.and_then(parse_object).unwrap_or_default();
        Self { map }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    fn number(&self, key: &str) -> Option<f64> {
        match self.map.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Truthy flags: true, non-zero numbers, "true"/"yes"/"1".
    pub fn flag(&self, key: &str) -> bool {
        match self.map.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1")
            }
            _ => false,
        }
    }

    pub fn max_position_size_percent(&self) -> f64 {
        self.number("max_position_size_percent").unwrap_or(10.0)
    }

    pub fn max_portfolio_risk_percent(&self) -> f64 {
        self.number("max_portfolio_risk_percent").unwrap_or(25.0)
    }

    pub fn stop_loss_percent(&self) -> f64 {
        self.number("stop_loss_percent").unwrap_or(5.0)
    }

    pub fn take_profit_percent(&self) -> f64 {
        self.number("take_profit_percent").unwrap_or(15.0)
    }

    pub fn rsi_oversold(&self) -> f64 {
        self.number("rsi_oversold").unwrap_or(30.0)
    }

    pub fn rsi_overbought(&self) -> f64 {
        self.number("rsi_overbought").unwrap_or(70.0)
    }

    pub fn min_volume(&self) -> i64 {
        self.number("min_volume").unwrap_or(1_000_000.0) as i64
    }

    pub fn max_positions(&self) -> usize {
        self.number("max_positions").unwrap_or(10.0) as usize
    }

    pub fn min_quality_score(&self) -> i64 {
        self.number("min_quality_score").unwrap_or(70.0) as i64
    }

    pub fn ai_platform(&self) -> AiPlatform {
        match self.map.get("ai_platform").and_then(|v| v.as_str()) {
            Some(name) => AiPlatform::parse(name),
            None => AiPlatform::DeepSeek,
        }
    }

    pub fn has_fundamental_params(&self) -> bool {
        FUNDAMENTAL_PARAM_KEYS.iter().any(|key| self.contains(key))
    }

    pub fn has_valuation_params(&self) -> bool {
        VALUATION_PARAM_KEYS.iter().any(|key| self.contains(key))
    }
}

fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw.trim()).ok()? {
        Value::Object(map) => Some(map),
        // Doubly serialized: a JSON string whose content is the document.
        Value::String(inner) => match serde_json::from_str::<Value>(&inner).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// Manual stock lists arrive as a JSON array, comma-separated, or
/// newline-separated text; symbols are trimmed and uppercased.
pub fn parse_stock_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
        return items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    let separator = if raw.contains(',') { ',' } else { '\n' };
    raw.split(separator)
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub action: SignalAction,
    pub score: i64,
    pub confidence: f64,
    pub reason: String,
}

/// Composite signal score: score >= 3 buys, <= -3 sells, anything between
/// holds. Confidence scales with |score| and caps at 0.9; HOLD keeps the
/// neutral 0.5.
pub fn compose_signal(
    tech: &TechnicalSnapshot,
    funda: Option<&FundamentalSnapshot>,
    params: &StrategyParams,
) -> Decision {
    let mut score = 0i64;
    let mut reasons: Vec<String> = Vec::new();

    if let Some(rsi) = tech.rsi {
        if rsi < params.rsi_oversold() {
            score += 2;
            reasons.push(format!("RSI oversold ({rsi:.2})"));
        } else if rsi > params.rsi_overbought() {
            score -= 2;
            reasons.push(format!("RSI overbought ({rsi:.2})"));
        }
    }

    match tech.trend {
        Some(Trend::Bullish) => {
            score += 1;
            reasons.push("Bullish price trend".to_string());
        }
        Some(Trend::Bearish) => {
            score -= 1;
            reasons.push("Bearish price trend".to_string());
        }
        _ => {}
    }

    if tech.is_oversold == Some(true) {
        score += 1;
        reasons.push("Oversold condition".to_string());
    }
    if tech.is_overbought == Some(true) {
        score -= 1;
        reasons.push("Overbought condition".to_string());
    }

    if let Some(funda) = funda {
        if funda.quality_score > params.min_quality_score() {
            score += 1;
            reasons.push(format!("High quality score ({})", funda.quality_score));
        }
        if params.flag("underlying_quality_required") && funda.meets_quality {
            score += 1;
            reasons.push("Meets quality requirements".to_string());
        }
        if params.has_valuation_params() && funda.meets_valuation == Some(true) {
            score += 1;
            reasons.push("Good valuation".to_string());
        }
    }

    if tech.is_price_near_support == Some(true) {
        score += 1;
        reasons.push("Price near support level".to_string());
    }
    if tech.is_price_near_resistance == Some(true) {
        score -= 1;
        reasons.push("Price near resistance level".to_string());
    }

    let (action, confidence) = if score >= 3 {
        (SignalAction::Buy, (score as f64 / 10.0 + 0.5).min(0.9))
    } else if score <= -3 {
        (SignalAction::Sell, (score.unsigned_abs() as f64 / 10.0 + 0.5).min(0.9))
    } else {
        (SignalAction::Hold, 0.5)
    };

    let reason = match action {
        SignalAction::Hold if reasons.is_empty() => "No clear signal".to_string(),
        SignalAction::Hold => format!("Mixed signals: {}", reasons.join(", ")),
        _ => reasons.join(", "),
    };

    Decision {
        action,
        score,
        confidence,
        reason,
    }
}

/// Canonical `indicators_used` document. Only primitives go in: numbers,
/// booleans, and labels; anything richer is flattened to a string first.
pub fn indicators_used_doc(
    decision: &Decision,
    tech: &TechnicalSnapshot,
    funda: Option<&FundamentalSnapshot>,
) -> Value {
    let mut doc = Map::new();
    doc.insert("signal_score".to_string(), json!(decision.score));
    doc.insert("confidence".to_string(), json!(decision.confidence));

    if let Some(rsi) = tech.rsi {
        doc.insert("rsi".to_string(), json!(rsi));
    }
    if let Some(trend) = tech.trend {
        doc.insert("price_trend".to_string(), json!(trend.as_str()));
    }
    if let Some(v) = tech.is_overbought {
        doc.insert("is_overbought".to_string(), json!(v));
    }
    if let Some(v) = tech.is_oversold {
        doc.insert("is_oversold".to_string(), json!(v));
    }
    if let Some(v) = tech.is_price_near_support {
        doc.insert("is_price_near_support".to_string(), json!(v));
    }
    if let Some(v) = tech.is_price_near_resistance {
        doc.insert("is_price_near_resistance".to_string(), json!(v));
    }
    if let Some(macd) = &tech.macd {
        doc.insert("macd".to_string(), json!(macd.line));
        doc.insert("macd_histogram".to_string(), json!(macd.histogram));
    }
    if let Some(funda) = funda {
        doc.insert("quality_score".to_string(), json!(funda.quality_score));
        if let Some(pe) = funda.pe_ratio {
            doc.insert("pe_ratio".to_string(), json!(pe));
        }
        doc.insert(
            "industry_moat_strength".to_string(),
            json!(funda.industry_moat_strength.as_str()),
        );
    }

    Value::Object(doc)
}

pub struct TradingBot {
    store: Store,
    providers: ProviderStack,
    generator: Arc<dyn StockListGenerator>,
}

impl TradingBot {
    pub fn new(
        store: Store,
        providers: ProviderStack,
        generator: Arc<dyn StockListGenerator>,
    ) -> Self {
        Self {
            store,
            providers,
            generator,
        }
    }

    async fn process_account(&self, account: &Account) -> anyhow::Result<()> {
        let Some(strategy_id) = account.strategy_id else {
            return Ok(());
        };
        let Some(strategy) = self.store.strategies().get_by_id(strategy_id).await? else {
            warn!(account = %account.account_id, strategy_id, "strategy not found");
            return Ok(());
        };
        if !strategy.is_active {
            warn!(account = %account.account_id, strategy = %strategy.name, "strategy inactive");
            return Ok(());
        }

        let params = StrategyParams::parse(strategy.parameters.as_deref());
        let universe = self.resolve_universe(&strategy, &params).await;
        if universe.is_empty() {
            warn!(strategy = %strategy.name, "no stock list for strategy");
            return Ok(());
        }

        info!(
            account = %account.account_id,
            strategy = %strategy.name,
            symbols = universe.len(),
            "processing account"
        );

        let positions = self.positions_by_symbol(&account.account_id).await?;

        for symbol in &universe {
            if let Err(e) = self
                .process_symbol(account, &strategy, symbol, &params, &positions)
                .await
            {
                error!(account = %account.account_id, symbol = %symbol, error = %e, "error processing symbol");
            }
        }
        Ok(())
    }

    async fn positions_by_symbol(&self, account_id: &str) -> anyhow::Result<HashMap<String, Position>> {
        let mut by_symbol = HashMap::new();
        for position in self.store.positions().open_for_account(account_id).await? {
            if let Some(instrument) = self
                .store
                .instruments()
                .get_by_id(position.symbol_id)
                .await?
            {
                by_symbol.insert(instrument.symbol, position);
            }
        }
        Ok(by_symbol)
    }

    /// Universe resolution. AI mode consults the 24h settings-store cache
    /// before calling the platform; a generated list is written back to the
    /// strategy so Manual mode can fall back to it later.
    async fn resolve_universe(&self, strategy: &Strategy, params: &StrategyParams) -> Vec<String> {
        let ai_prompt = strategy
            .stock_list_ai_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        if strategy.stock_list_mode.as_deref() == Some("AI") {
            if let Some(prompt) = ai_prompt {
                if let Some(list) = self.resolve_ai_universe(strategy, params, prompt).await {
                    return list;
                }
                // AI path exhausted: stored list, then keyword buckets.
                if let Some(stored) = strategy.stock_list.as_deref() {
                    let parsed = parse_stock_list(stored);
                    if !parsed.is_empty() {
                        info!(strategy = %strategy.name, "using stored stock list as fallback");
                        return parsed;
                    }
                }
                return ai::fallback_stock_list(prompt);
            }
        }

        strategy
            .stock_list
            .as_deref()
            .map(parse_stock_list)
            .unwrap_or_default()
    }

    async fn resolve_ai_universe(
        &self,
        strategy: &Strategy,
        params: &StrategyParams,
        prompt: &str,
    ) -> Option<Vec<String>> {
        let platform = params.ai_platform();
        let key = ai::cache_key(prompt, platform);

        if let Some(cached) = self.cached_stock_list(&key).await {
            info!(strategy = %strategy.name, "using cached AI stock list");
            return Some(cached);
        }

        let response = self.generator.generate(platform, prompt).await?;
        let symbols = ai::parse_stock_symbols(&response);
        if symbols.is_empty() {
            warn!(strategy = %strategy.name, "AI response contained no symbols");
            return None;
        }

        self.cache_stock_list(&key, &symbols).await;
        if let Err(e) = self
            .store
            .strategies()
            .update_stock_list(strategy.id, &symbols.join(","))
            .await
        {
            warn!(strategy = %strategy.name, error = %e, "failed to store generated list");
        }

        info!(strategy = %strategy.name, symbols = symbols.len(), "generated AI stock list");
        Some(symbols)
    }

    async fn cached_stock_list(&self, key: &str) -> Option<Vec<String>> {
        let setting = self.store.settings().get_by_name(key).await.ok()??;
        let cached: CachedStockList = serde_json::from_str(setting.parameters.as_deref()?).ok()?;
        if cached.stock_list.is_empty() {
            return None;
        }
        let fresh = Utc::now() - cached.cached_at < ChronoDuration::hours(AI_CACHE_TTL_HOURS);
        if fresh {
            debug!(key, "AI cache hit");
            Some(cached.stock_list)
        } else {
            debug!(key, "AI cache expired");
            None
        }
    }

    async fn cache_stock_list(&self, key: &str, symbols: &[String]) {
        let payload = CachedStockList {
            stock_list: symbols.to_vec(),
            cached_at: Utc::now(),
            cache_key: key.to_string(),
        };
        let Ok(doc) = serde_json::to_string(&payload) else {
            return;
        };
        if let Err(e) = self
            .store
            .settings()
            .upsert(key, &doc, AI_CACHE_CATEGORY, true)
            .await
        {
            warn!(key, error = %e, "failed to cache AI stock list");
        }
    }

    /// Latest daily bar, synthesized from a live quote when the store has
    /// no history for the symbol yet.
    async fn latest_bar(&self, symbol: &str, symbol_id: i64) -> anyhow::Result<Option<(f64, i64)>> {
        let bars = self
            .store
            .market_data()
            .latest(symbol_id, "1day", 1)
            .await?;
        if let Some(bar) = bars.first() {
            return Ok(Some((bar.close, bar.volume)));
        }

        if let Some(quote) = self.providers.current_price(symbol).await {
            // Volume is unknown on a synthesized bar; use a neutral default
            // that clears the liquidity gate.
            return Ok(Some((quote.price, 1_000_000)));
        }
        Ok(None)
    }

    async fn technical_snapshot(&self, symbol: &str, current_price: f64) -> TechnicalSnapshot {
        let closes = self
            .providers
            .close_series(symbol, HistoryPeriod::SixMonths)
            .await
            .unwrap_or_default();
        let mut snapshot = TechnicalSnapshot::compute(&closes, current_price);

        // Prefer a vendor-computed RSI when one is available.
        if let Some(vendor) = self.providers.indicators(symbol).await {
            if let Some(rsi) = vendor.rsi {
                snapshot.rsi = Some(rsi);
                snapshot.is_overbought = Some(rsi >= 70.0);
                snapshot.is_oversold = Some(rsi <= 30.0);
            }
        }
        snapshot
    }

    async fn process_symbol(
        &self,
        account: &Account,
        strategy: &Strategy,
        symbol: &str,
        params: &StrategyParams,
        positions: &HashMap<String, Position>,
    ) -> anyhow::Result<()> {
        let instrument = self.store.instruments().ensure(symbol).await?;

        let Some((close, volume)) = self.latest_bar(symbol, instrument.id).await? else {
            warn!(symbol, "no market data available");
            return Ok(());
        };

        if volume < params.min_volume() {
            let decision = Decision {
                action: SignalAction::Hold,
                score: 0,
                confidence: 0.5,
                reason: "Low volume".to_string(),
            };
            let tech = TechnicalSnapshot {
                current_price: close,
                ..Default::default()
            };
            self.persist_signal(instrument.id, strategy.id, close, &decision, &tech, None)
                .await?;
            return Ok(());
        }

        let tech = self.technical_snapshot(symbol, close).await;
        let funda = if params.has_fundamental_params() {
            match self.providers.info(symbol).await {
                Some(info) => Some(FundamentalSnapshot::compute(&info)),
                None => None,
            }
        } else {
            None
        };

        let decision = compose_signal(&tech, funda.as_ref(), params);
        self.persist_signal(
            instrument.id,
            strategy.id,
            close,
            &decision,
            &tech,
            funda.as_ref(),
        )
        .await?;

        match decision.action {
            SignalAction::Buy => {
                self.execute_buy(account, strategy, instrument.id, symbol, close, params, positions)
                    .await?;
            }
            SignalAction::Sell => {
                self.execute_sell(account, strategy, instrument.id, symbol, close, positions)
                    .await?;
            }
            SignalAction::Hold => {
                debug!(symbol, reason = %decision.reason, "holding");
            }
        }
        Ok(())
    }

    async fn persist_signal(
        &self,
        symbol_id: i64,
        strategy_id: i64,
        price: f64,
        decision: &Decision,
        tech: &TechnicalSnapshot,
        funda: Option<&FundamentalSnapshot>,
    ) -> anyhow::Result<()> {
        let doc = indicators_used_doc(decision, tech, funda);
        self.store
            .signals()
            .create(&NewSignal {
                symbol_id,
                strategy_id,
                timestamp: Utc::now(),
                signal_type: decision.action,
                strength: decision.score as f64,
                price,
                confidence: decision.confidence,
                indicators_used: doc.to_string(),
                reason: decision.reason.clone(),
            })
            .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_buy(
        &self,
        account: &Account,
        strategy: &Strategy,
        symbol_id: i64,
        symbol: &str,
        price: f64,
        params: &StrategyParams,
        positions: &HashMap<String, Position>,
    ) -> anyhow::Result<()> {
        if positions.get(symbol).is_some_and(|p| p.quantity > 0.0) {
            info!(symbol, "already holding, skipping BUY");
            return Ok(());
        }
        if positions.len() >= params.max_positions() {
            info!(account = %account.account_id, "maximum positions limit reached");
            return Ok(());
        }

        let quantity = position_size(account.cash_balance, price, params.max_position_size_percent());
        if quantity <= 0.0 {
            info!(symbol, "insufficient funds for BUY order");
            return Ok(());
        }

        let order = self
            .store
            .orders()
            .create(NewOrder {
                account_id: account.account_id.clone(),
                symbol_id,
                strategy_id: Some(strategy.id),
                order_type: OrderType::Market,
                side: OrderSide::Buy,
                quantity,
                price: Some(price),
                stop_price: None,
            })
            .await?;

        info!(symbol, order_id = order.id, quantity, price, "created BUY order");
        Ok(())
    }

    async fn execute_sell(
        &self,
        account: &Account,
        strategy: &Strategy,
        symbol_id: i64,
        symbol: &str,
        price: f64,
        positions: &HashMap<String, Position>,
    ) -> anyhow::Result<()> {
        let Some(position) = positions.get(symbol).filter(|p| p.quantity > 0.0) else {
            info!(symbol, "no position to sell");
            return Ok(());
        };

        let order = self
            .store
            .orders()
            .create(NewOrder {
                account_id: account.account_id.clone(),
                symbol_id,
                strategy_id: Some(strategy.id),
                order_type: OrderType::Market,
                side: OrderSide::Sell,
                quantity: position.quantity,
                price: Some(price),
                stop_price: None,
            })
            .await?;

        info!(symbol, order_id = order.id, quantity = position.quantity, price, "created SELL order");
        Ok(())
    }
}

/// Risk-managed position sizing: the cash slice for one position capped at
/// `max_position_size_percent`, floored to whole shares.
pub fn position_size(cash_balance: f64, price: f64, max_position_size_percent: f64) -> f64 {
    if price <= 0.0 || cash_balance <= 0.0 {
        return 0.0;
    }
    let max_value = cash_balance * max_position_size_percent / 100.0;
    (max_value.min(cash_balance) / price).floor()
}

#[async_trait]
impl Job for TradingBot {
    async fn run(&self) -> anyhow::Result<()> {
        let accounts = self.store.accounts().tradable().await?;
        if accounts.is_empty() {
            debug!("no active accounts with strategies");
            return Ok(());
        }
        info!(accounts = accounts.len(), "trading bot cycle starting");

        for account in &accounts {
            if let Err(e) = self.process_account(account).await {
                error!(account = %account.account_id, error = %e, "error processing account");
                let _ = self
                    .store
                    .system_log()
                    .log(
                        crate::models::LogLevel::Error,
                        MODULE,
                        &format!("error processing account {}", account.account_id),
                        Some(&format!("{e:#}")),
                        Some(&account.account_id),
                    )
                    .await;
            }
        }

        info!("trading bot cycle completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fundamental::MoatStrength;

    fn snapshot() -> TechnicalSnapshot {
        TechnicalSnapshot {
            current_price: 100.0,
            ..Default::default()
        }
    }

    fn funda(quality: i64) -> FundamentalSnapshot {
        FundamentalSnapshot {
            quality_score: quality,
            conviction_score: 0,
            pe_ratio: Some(12.0),
            pb_ratio: None,
            dividend_yield: None,
            beta: None,
            market_cap: None,
            sector: None,
            roe: None,
            revenue_growth: None,
            eps_growth: None,
            industry_moat_strength: MoatStrength::Moderate,
            has_fundamental_shift: false,
            meets_quality: true,
            meets_roe: None,
            meets_growth: None,
            meets_valuation: Some(true),
        }
    }

    #[test]
    fn params_accept_structured_and_serialized_documents() {
        let structured = StrategyParams::parse(Some(r#"{"rsi_oversold": 25, "max_positions": 5}"#));
        assert_eq!(structured.rsi_oversold(), 25.0);
        assert_eq!(structured.max_positions(), 5);

        let doubly = StrategyParams::parse(Some(
            r#""{\"rsi_oversold\": 20, \"min_volume\": \"500000\"}""#,
        ));
        assert_eq!(doubly.rsi_oversold(), 20.0);
        assert_eq!(doubly.min_volume(), 500_000);

        let garbage = StrategyParams::parse(Some("not json"));
        assert_eq!(garbage.rsi_oversold(), 30.0);
        assert_eq!(garbage.max_position_size_percent(), 10.0);
        assert_eq!(garbage.min_volume(), 1_000_000);
    }

    #[test]
    fn fundamental_gate_detects_recognized_keys() {
        let none = StrategyParams::parse(Some(r#"{"rsi_oversold": 25}"#));
        assert!(!none.has_fundamental_params());

        let some = StrategyParams::parse(Some(r#"{"max_pe": 18}"#));
        assert!(some.has_fundamental_params());
        assert!(some.has_valuation_params());
    }

    #[test]
    fn manual_list_accepts_three_formats() {
        assert_eq!(
            parse_stock_list(r#"["aapl", "msft"]"#),
            vec!["AAPL", "MSFT"]
        );
        assert_eq!(parse_stock_list("aapl, msft ,googl"), vec!["AAPL", "MSFT", "GOOGL"]);
        assert_eq!(parse_stock_list("aapl\nmsft\n"), vec!["AAPL", "MSFT"]);
        assert!(parse_stock_list("  ").is_empty());
    }

    #[test]
    fn score_three_buys_minus_three_sells_between_holds() {
        let params = StrategyParams::default();

        // RSI oversold (+2) + bullish trend (+1) = 3 -> BUY.
        let mut tech = snapshot();
        tech.rsi = Some(25.0);
        tech.trend = Some(Trend::Bullish);
        let d = compose_signal(&tech, None, &params);
        assert_eq!(d.action, SignalAction::Buy);
        assert_eq!(d.score, 3);
        assert!((d.confidence - 0.8).abs() < 1e-9);

        // RSI overbought (-2) + bearish (-1) = -3 -> SELL.
        let mut tech = snapshot();
        tech.rsi = Some(80.0);
        tech.trend = Some(Trend::Bearish);
        let d = compose_signal(&tech, None, &params);
        assert_eq!(d.action, SignalAction::Sell);
        assert_eq!(d.score, -3);

        // +2 alone holds.
        let mut tech = snapshot();
        tech.rsi = Some(25.0);
        let d = compose_signal(&tech, None, &params);
        assert_eq!(d.action, SignalAction::Hold);
        assert_eq!(d.score, 2);
        assert_eq!(d.confidence, 0.5);
        assert!(d.reason.starts_with("Mixed signals:"));
    }

    #[test]
    fn confidence_caps_at_point_nine() {
        let params = StrategyParams::parse(Some(r#"{"underlying_quality_required": true, "max_pe": 30}"#));
        let mut tech = snapshot();
        tech.rsi = Some(20.0);
        tech.trend = Some(Trend::Bullish);
        tech.is_oversold = Some(true);
        tech.is_price_near_support = Some(true);
        let f = funda(90);
        // 2 + 1 + 1 + 1 (quality>70) + 1 (meets quality) + 1 (valuation) + 1 (support) = 8.
        let d = compose_signal(&tech, Some(&f), &params);
        assert_eq!(d.score, 8);
        assert_eq!(d.confidence, 0.9);
    }

    #[test]
    fn fundamental_factors_only_count_when_gated() {
        // No valuation params: meets_valuation must not contribute.
        let params = StrategyParams::parse(Some(r#"{"min_quality_score": 60}"#));
        let tech = snapshot();
        let f = funda(80);
        let d = compose_signal(&tech, Some(&f), &params);
        // Only quality > 60 contributes (+1); underlying_quality_required is
        // unset, valuation params absent.
        assert_eq!(d.score, 1);
    }

    #[test]
    fn position_sizing_floors_whole_shares() {
        // cash 1000, 10% cap, price 50 -> floor(min(100, 1000)/50) = 2.
        assert_eq!(position_size(1000.0, 50.0, 10.0), 2.0);
        // Cap above cash: min() keeps it affordable.
        assert_eq!(position_size(1000.0, 300.0, 200.0), 3.0);
        assert_eq!(position_size(1000.0, 0.0, 10.0), 0.0);
        assert_eq!(position_size(40.0, 50.0, 10.0), 0.0);
    }

    #[test]
    fn hold_document_carries_score_and_confidence() {
        let decision = Decision {
            action: SignalAction::Hold,
            score: 0,
            confidence: 0.5,
            reason: "No clear signal".to_string(),
        };
        let doc = indicators_used_doc(&decision, &snapshot(), None);
        assert_eq!(doc["signal_score"], json!(0));
        assert_eq!(doc["confidence"], json!(0.5));
        // Document stays primitive-only for stable assertions downstream.
        assert!(doc.as_object().unwrap().values().all(|v| !v.is_object() && !v.is_array()));
    }
}
