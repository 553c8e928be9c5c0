//! Stock scoring and sector classification. Thresholds, per-symbol sector
//! overrides, and keyword tables live in `ScoringConfig`; a TOML file can
//! override any of them and every field falls back to the built-in default.
//!
//! Metrics are optional throughout: an absent input drops out of the blend
//! instead of contributing a zero.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::providers::{InfoRecord, ProviderStack};
use crate::storage::instruments::{InstrumentEnricher, InstrumentProfile, InstrumentScores};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub beta_baseline: f64,
    pub beta_sensitivity: f64,
    pub div_yield_target: f64,
    pub debt_to_equity_healthy: f64,
    pub debt_sensitivity: f64,
    pub margin_sensitivity: f64,
    pub pe_fair_value: f64,
    pub pe_sensitivity: f64,
    pub growth_sensitivity: f64,
    pub roe_sensitivity: f64,
    pub risk_safe_threshold: i64,
    pub risk_moderate_threshold: i64,
    pub grade_a_plus: i64,
    pub grade_a: i64,
    pub grade_b_plus: i64,
    pub grade_b: i64,
    pub grade_c: i64,
    pub mega_cap_threshold: f64,
    pub sector_overrides: HashMap<String, String>,
    pub sector_keywords: HashMap<String, Vec<String>>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut sector_keywords = HashMap::new();
        sector_keywords.insert(
            "NEW ECONOMY".to_string(),
            vec!["software", "cloud", "semiconductor", "internet", "fintech"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        sector_keywords.insert(
            "MATERIALS & MINING".to_string(),
            vec!["mining", "gold", "copper", "lithium", "steel"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        sector_keywords.insert(
            "HEALTHCARE".to_string(),
            vec!["pharmaceutical", "biotech", "medical", "therapeutics"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        sector_keywords.insert(
            "INFRASTRUCTURE".to_string(),
            vec!["pipeline", "utility", "telecom", "railroad"]
                .into_iter()
                .map(String::from)
                .collect(),
        );

        Self {
            beta_baseline: 1.0,
            beta_sensitivity: 50.0,
            div_yield_target: 4.0,
            debt_to_equity_healthy: 1.0,
            debt_sensitivity: 25.0,
            margin_sensitivity: 5.0,
            pe_fair_value: 20.0,
            pe_sensitivity: 2.5,
            growth_sensitivity: 5.0,
            roe_sensitivity: 5.0,
            risk_safe_threshold: 70,
            risk_moderate_threshold: 50,
            grade_a_plus: 90,
            grade_a: 80,
            grade_b_plus: 70,
            grade_b: 60,
            grade_c: 50,
            mega_cap_threshold: 1_000_000_000_000.0,
            sector_overrides: HashMap::new(),
            sector_keywords,
        }
    }
}

impl ScoringConfig {
    /// Load from a TOML file; any read or parse failure falls back to the
    /// defaults so scoring never becomes unavailable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "bad scoring config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

/// The raw metrics scoring consumes. Every field may be absent.
#[derive(Debug, Clone, Default)]
pub struct MetricBundle {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub market_cap: Option<f64>,
    pub beta: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub profit_margins: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub return_on_equity: Option<f64>,
}

impl MetricBundle {
    pub fn from_info(info: &InfoRecord) -> Self {
        Self {
            name: info.name.clone(),
            sector: info.sector.clone(),
            industry: info.industry.clone(),
            description: info.description.clone(),
            market_cap: info.market_cap,
            beta: info.beta,
            dividend_yield: info.dividend_yield,
            debt_to_equity: info.debt_to_equity,
            profit_margins: info.profit_margins,
            trailing_pe: info.pe_ratio,
            forward_pe: info.forward_pe,
            revenue_growth: info.revenue_growth,
            return_on_equity: info.return_on_equity,
        }
    }
}

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Risk score (0-100, higher = safer): weighted average of the clamped
/// beta/dividend/debt/margin sub-scores. Sub-scores with no input drop out
/// and the remaining weights renormalize; with no inputs at all the score
/// is a neutral 50.
pub fn risk_score(data: &MetricBundle, cfg: &ScoringConfig) -> i64 {
    let mut parts: Vec<(f64, f64)> = Vec::with_capacity(4);

    if let Some(beta) = data.beta {
        parts.push((0.3, clamp(100.0 - (beta - cfg.beta_baseline).abs() * cfg.beta_sensitivity)));
    }
    if let Some(div) = data.dividend_yield {
        parts.push((0.2, clamp(div * (100.0 / cfg.div_yield_target))));
    }
    if let Some(debt) = data.debt_to_equity {
        let penalty = ((debt - cfg.debt_to_equity_healthy) * cfg.debt_sensitivity).max(0.0);
        parts.push((0.3, clamp(100.0 - penalty)));
    }
    if let Some(margins) = data.profit_margins {
        parts.push((0.2, clamp(margins * cfg.margin_sensitivity)));
    }

    let weight_sum: f64 = parts.iter().map(|(w, _)| w).sum();
    if weight_sum == 0.0 {
        return 50;
    }
    let score: f64 = parts.iter().map(|(w, s)| w * s).sum::<f64>() / weight_sum;
    score.round() as i64
}

pub fn risk_style(risk_score: i64, cfg: &ScoringConfig) -> &'static str {
    if risk_score >= cfg.risk_safe_threshold {
        "STEADY & SAFE"
    } else if risk_score >= cfg.risk_moderate_threshold {
        "MODERATE & BALANCED"
    } else {
        "RISKY & WILD"
    }
}

/// Overall score (0-100): equal-weight blend of valuation, growth, quality,
/// and risk; missing growth/quality components drop out of the blend.
pub fn overall_score(data: &MetricBundle, risk: i64, cfg: &ScoringConfig) -> i64 {
    let pe = data.forward_pe.or(data.trailing_pe);
    let val_score = match pe {
        Some(pe) if pe > 0.0 => clamp(100.0 - (pe - cfg.pe_fair_value).abs() * cfg.pe_sensitivity),
        _ => 40.0,
    };

    let growth_score = data
        .revenue_growth
        .map(|g| clamp(50.0 + g * cfg.growth_sensitivity));

    let roe_score = data.return_on_equity.map(|r| clamp(r * cfg.roe_sensitivity));
    let margin_score = data.profit_margins.map(|m| clamp(m * cfg.margin_sensitivity));
    let quality_score = match (roe_score, margin_score) {
        (Some(r), Some(m)) => Some((r + m) / 2.0),
        (Some(r), None) => Some(r),
        (None, Some(m)) => Some(m),
        (None, None) => None,
    };

    let mut parts = vec![(0.25, val_score), (0.25, risk as f64)];
    if let Some(g) = growth_score {
        parts.push((0.25, g));
    }
    if let Some(q) = quality_score {
        parts.push((0.25, q));
    }

    let weight_sum: f64 = parts.iter().map(|(w, _)| w).sum();
    let score: f64 = parts.iter().map(|(w, s)| w * s).sum::<f64>() / weight_sum;
    score.round() as i64
}

pub fn letter_grade(score: i64, cfg: &ScoringConfig) -> &'static str {
    if score >= cfg.grade_a_plus {
        "A+"
    } else if score >= cfg.grade_a {
        "A"
    } else if score >= cfg.grade_b_plus {
        "B+"
    } else if score >= cfg.grade_b {
        "B"
    } else if score >= cfg.grade_c {
        "C"
    } else {
        "D"
    }
}

/// Sector bucket. Priority: explicit per-symbol override, then sector
/// rules, then keyword counting over description/industry.
pub fn sector_bucket(ticker: &str, data: &MetricBundle, cfg: &ScoringConfig) -> String {
    let ticker = ticker.to_ascii_uppercase();
    if let Some(bucket) = cfg.sector_overrides.get(&ticker) {
        return bucket.clone();
    }

    let sector = data.sector.as_deref().unwrap_or("").to_lowercase();
    let industry = data.industry.as_deref().unwrap_or("").to_lowercase();
    let desc = data.description.as_deref().unwrap_or("").to_lowercase();

    if sector.contains("technology") || industry.contains("software") {
        let mega = data.market_cap.is_some_and(|cap| cap > cfg.mega_cap_threshold);
        return if mega { "MEGA TECH" } else { "NEW ECONOMY" }.to_string();
    }
    if sector.contains("energy") {
        return "OLD ECONOMY".to_string();
    }
    if sector.contains("industrials") {
        let new_economy = ["electric vehicle", "renewable", "solar"]
            .iter()
            .any(|kw| desc.contains(kw));
        return if new_economy { "NEW ECONOMY" } else { "OLD ECONOMY" }.to_string();
    }
    if sector.contains("materials") {
        return "MATERIALS & MINING".to_string();
    }
    if sector.contains("consumer") {
        let new_economy = ["electric", "ride", "delivery", "fintech", "app", "platform"]
            .iter()
            .any(|kw| desc.contains(kw));
        return if new_economy {
            "NEW ECONOMY"
        } else {
            "CONSUMER FAVORITES"
        }
        .to_string();
    }
    if sector.contains("health") {
        return "HEALTHCARE".to_string();
    }
    if sector.contains("financial") {
        return "FINANCIAL GIANTS".to_string();
    }
    if sector.contains("utilit") {
        return "INFRASTRUCTURE".to_string();
    }
    if sector.contains("real estate") {
        return "REAL ESTATE".to_string();
    }
    if sector.contains("communication") {
        let infra = ["telecom", "tower", "wireless", "broadband"]
            .iter()
            .any(|kw| desc.contains(kw));
        return if infra {
            "INFRASTRUCTURE"
        } else {
            "ENTERTAINMENT & MEDIA"
        }
        .to_string();
    }

    // Keyword-count fallback.
    let mut best = ("OLD ECONOMY".to_string(), 0usize);
    for (bucket, keywords) in &cfg.sector_keywords {
        let count = keywords
            .iter()
            .filter(|kw| desc.contains(kw.as_str()) || industry.contains(kw.as_str()))
            .count();
        if count > best.1 {
            best = (bucket.clone(), count);
        }
    }
    best.0
}

#[derive(Debug, Clone)]
pub struct StockScores {
    pub overall_score: i64,
    pub risk_score: i64,
    pub risk_style: &'static str,
    pub letter_grade: &'static str,
    pub sector_bucket: String,
}

pub fn score_and_classify(ticker: &str, data: &MetricBundle, cfg: &ScoringConfig) -> StockScores {
    let risk = risk_score(data, cfg);
    let overall = overall_score(data, risk, cfg);
    StockScores {
        overall_score: overall,
        risk_score: risk,
        risk_style: risk_style(risk, cfg),
        letter_grade: letter_grade(overall, cfg),
        sector_bucket: sector_bucket(ticker, data, cfg),
    }
}

/// Provider-backed enrichment used by `add_to_watchlist`: fills in display
/// fields for new instruments and computes scores on demand.
pub struct ScoringService {
    providers: ProviderStack,
    config: ScoringConfig,
}

impl ScoringService {
    pub fn new(providers: ProviderStack, config: ScoringConfig) -> Self {
        Self { providers, config }
    }
}

#[async_trait]
impl InstrumentEnricher for ScoringService {
    async fn describe(&self, symbol: &str) -> Option<InstrumentProfile> {
        let quote = self.providers.current_price(symbol).await?;
        Some(InstrumentProfile {
            name: quote.name.unwrap_or_else(|| symbol.to_ascii_uppercase()),
            exchange: quote.exchange.unwrap_or_else(|| "Unknown".to_string()),
            currency: quote.currency.unwrap_or_else(|| "USD".to_string()),
        })
    }

    async fn score(&self, symbol: &str) -> Option<InstrumentScores> {
        let info = self.providers.info(symbol).await?;
        let bundle = MetricBundle::from_info(&info);
        let scores = score_and_classify(symbol, &bundle, &self.config);
        Some(InstrumentScores {
            overall_score: scores.overall_score,
            risk_score: scores.risk_score,
            sector: scores.sector_bucket,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn risk_score_weighted_average() {
        let data = MetricBundle {
            beta: Some(1.0),
            dividend_yield: Some(4.0),
            debt_to_equity: Some(1.0),
            profit_margins: Some(20.0),
            ..Default::default()
        };
        // beta 100 * 0.3 + div 100 * 0.2 + debt 100 * 0.3 + margins 100 * 0.2.
        assert_eq!(risk_score(&data, &cfg()), 100);
    }

    #[test]
    fn risk_score_renormalizes_over_missing_inputs() {
        let data = MetricBundle {
            beta: Some(1.0),
            debt_to_equity: Some(1.0),
            ..Default::default()
        };
        // Both present sub-scores are 100; absent div/margins do not drag
        // the average to zero.
        assert_eq!(risk_score(&data, &cfg()), 100);
        assert_eq!(risk_score(&MetricBundle::default(), &cfg()), 50);
    }

    #[test]
    fn overall_score_defaults_valuation_when_pe_unusable() {
        let data = MetricBundle {
            trailing_pe: Some(-3.0),
            ..Default::default()
        };
        // val 40 and risk 50 are the only components.
        assert_eq!(overall_score(&data, 50, &cfg()), 45);

        let fair = MetricBundle {
            forward_pe: Some(20.0),
            ..Default::default()
        };
        // Fair-value PE scores 100.
        assert_eq!(overall_score(&fair, 50, &cfg()), 75);
    }

    #[test]
    fn forward_pe_takes_precedence() {
        let data = MetricBundle {
            forward_pe: Some(20.0),
            trailing_pe: Some(60.0),
            ..Default::default()
        };
        assert_eq!(overall_score(&data, 50, &cfg()), 75);
    }

    #[test]
    fn letter_grades_at_boundaries() {
        let c = cfg();
        assert_eq!(letter_grade(90, &c), "A+");
        assert_eq!(letter_grade(89, &c), "A");
        assert_eq!(letter_grade(70, &c), "B+");
        assert_eq!(letter_grade(60, &c), "B");
        assert_eq!(letter_grade(50, &c), "C");
        assert_eq!(letter_grade(49, &c), "D");
    }

    #[test]
    fn risk_styles() {
        let c = cfg();
        assert_eq!(risk_style(70, &c), "STEADY & SAFE");
        assert_eq!(risk_style(69, &c), "MODERATE & BALANCED");
        assert_eq!(risk_style(49, &c), "RISKY & WILD");
    }

    #[test]
    fn sector_override_wins() {
        let mut c = cfg();
        c.sector_overrides.insert("TSLA".into(), "NEW ECONOMY".into());
        let data = MetricBundle {
            sector: Some("Consumer Cyclical".into()),
            ..Default::default()
        };
        assert_eq!(sector_bucket("tsla", &data, &c), "NEW ECONOMY");
    }

    #[test]
    fn technology_mega_cap_promotion() {
        let c = cfg();
        let mut data = MetricBundle {
            sector: Some("Technology".into()),
            market_cap: Some(3.0e12),
            ..Default::default()
        };
        assert_eq!(sector_bucket("AAPL", &data, &c), "MEGA TECH");

        data.market_cap = Some(5.0e10);
        assert_eq!(sector_bucket("AAPL", &data, &c), "NEW ECONOMY");
    }

    #[test]
    fn sector_rules_and_keyword_fallback() {
        let c = cfg();
        let energy = MetricBundle {
            sector: Some("Energy".into()),
            ..Default::default()
        };
        assert_eq!(sector_bucket("XOM", &energy, &c), "OLD ECONOMY");

        let health = MetricBundle {
            sector: Some("Healthcare".into()),
            ..Default::default()
        };
        assert_eq!(sector_bucket("JNJ", &health, &c), "HEALTHCARE");

        let unknown = MetricBundle {
            description: Some("A gold and copper mining operator".into()),
            ..Default::default()
        };
        assert_eq!(sector_bucket("ZZZ", &unknown, &c), "MATERIALS & MINING");

        assert_eq!(sector_bucket("ZZZ", &MetricBundle::default(), &c), "OLD ECONOMY");
    }
}
