//! Fundamental parameter derivation over a normalized info payload. Absent
//! inputs never contribute to a score; predicates return `None` when the
//! underlying metric is unknown.

use serde::Serialize;

use crate::providers::InfoRecord;

pub const DEFAULT_MIN_QUALITY: i64 = 70;
pub const DEFAULT_MIN_ROE: f64 = 0.1;
pub const DEFAULT_MIN_GROWTH: f64 = 0.1;
pub const DEFAULT_MAX_PE: f64 = 20.0;
pub const DEFAULT_MAX_PB: f64 = 2.0;
pub const DEFAULT_SHIFT_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MoatStrength {
    Strong,
    Moderate,
    Weak,
}

impl MoatStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Moderate => "moderate",
            Self::Weak => "weak",
        }
    }
}

/// Normalize a dividend yield: vendors disagree on units, so anything above
/// 1 is treated as a percentage.
pub fn normalize_dividend_yield(raw: f64) -> f64 {
    if raw > 1.0 {
        raw / 100.0
    } else {
        raw
    }
}

/// Bucketed additive quality score, capped at 100.
pub fn quality_score(info: &InfoRecord) -> i64 {
    let mut score = 0;

    if let Some(pe) = info.pe_ratio.filter(|pe| *pe > 0.0) {
        if pe < 15.0 {
            score += 25;
        } else if pe < 25.0 {
            score += 15;
        } else if pe < 40.0 {
            score += 5;
        }
    }

    if let Some(cap) = info.market_cap {
        if cap > 10_000_000_000.0 {
            score += 25;
        } else if cap > 2_000_000_000.0 {
            score += 15;
        } else if cap > 300_000_000.0 {
            score += 10;
        }
    }

    if let Some(beta) = info.beta {
        if beta < 0.8 {
            score += 20;
        } else if beta < 1.2 {
            score += 15;
        } else if beta < 1.5 {
            score += 10;
        }
    }

    if info.dividend_yield.is_some_and(|y| y > 0.0) {
        score += 10;
    }

    if info.sector.as_deref().is_some_and(|s| s != "N/A") {
        score += 10;
    }

    score.min(100)
}

/// Conviction: 40% quality plus growth, valuation, and profitability
/// buckets, capped at 100.
pub fn conviction_score(info: &InfoRecord) -> i64 {
    let mut score = quality_score(info) as f64 * 0.4;

    if let Some(growth) = info.revenue_growth {
        if growth > 0.2 {
            score += 20.0;
        } else if growth > 0.1 {
            score += 15.0;
        } else if growth > 0.05 {
            score += 10.0;
        }
    }

    if let Some(pe) = info.pe_ratio.filter(|pe| *pe > 0.0) {
        if pe < 15.0 {
            score += 20.0;
        } else if pe < 25.0 {
            score += 15.0;
        } else if pe < 35.0 {
            score += 10.0;
        }
    }

    if let Some(roe) = info.return_on_equity {
        if roe > 0.2 {
            score += 20.0;
        } else if roe > 0.15 {
            score += 15.0;
        } else if roe > 0.1 {
            score += 10.0;
        }
    }

    (score.round() as i64).min(100)
}

/// Sector -> base moat tier, promoted one tier for companies above $50B.
pub fn industry_moat_strength(info: &InfoRecord) -> MoatStrength {
    let Some(sector) = info.sector.as_deref().filter(|s| *s != "N/A") else {
        return MoatStrength::Weak;
    };

    let base = match sector {
        "Technology" | "Healthcare" | "Consumer Defensive" | "Utilities"
        | "Communication Services" => MoatStrength::Strong,
        "Industrials" | "Consumer Cyclical" | "Financial Services" => MoatStrength::Moderate,
        _ => MoatStrength::Weak,
    };

    if info.market_cap.is_some_and(|cap| cap > 50_000_000_000.0) {
        return match base {
            MoatStrength::Moderate => MoatStrength::Strong,
            MoatStrength::Weak => MoatStrength::Moderate,
            strong => strong,
        };
    }
    base
}

pub fn meets_quality(info: &InfoRecord, min_quality: i64) -> bool {
    quality_score(info) >= min_quality
}

pub fn meets_roe(info: &InfoRecord, min_roe: f64) -> Option<bool> {
    info.return_on_equity.map(|roe| roe >= min_roe)
}

/// The better of revenue and EPS growth against the floor; `None` when
/// neither is reported.
pub fn meets_growth(info: &InfoRecord, min_growth: f64) -> Option<bool> {
    match (info.revenue_growth, info.eps_growth) {
        (Some(r), Some(e)) => Some(r.max(e) >= min_growth),
        (Some(r), None) => Some(r >= min_growth),
        (None, Some(e)) => Some(e >= min_growth),
        (None, None) => None,
    }
}

/// Valuation gate; a missing ratio is lenient, both missing is unknown.
pub fn meets_valuation(info: &InfoRecord, max_pe: f64, max_pb: f64) -> Option<bool> {
    if info.pe_ratio.is_none() && info.pb_ratio.is_none() {
        return None;
    }
    let pe_ok = info.pe_ratio.map_or(true, |pe| pe <= max_pe);
    let pb_ok = info.pb_ratio.map_or(true, |pb| pb <= max_pb);
    Some(pe_ok && pb_ok)
}

/// Deterioration check: a sharp growth contraction or a quality collapse.
pub fn has_fundamental_shift(info: &InfoRecord, threshold: f64) -> bool {
    if info.revenue_growth.is_some_and(|g| g < -threshold) {
        return true;
    }
    if info.eps_growth.is_some_and(|g| g < -threshold) {
        return true;
    }
    quality_score(info) < 50
}

/// Everything the decision pipeline reads when a strategy carries
/// fundamental parameters.
#[derive(Debug, Clone, Serialize)]
pub struct FundamentalSnapshot {
    pub quality_score: i64,
    pub conviction_score: i64,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: Option<f64>,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
    pub roe: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub eps_growth: Option<f64>,
    pub industry_moat_strength: MoatStrength,
    pub has_fundamental_shift: bool,
    pub meets_quality: bool,
    pub meets_roe: Option<bool>,
    pub meets_growth: Option<bool>,
    pub meets_valuation: Option<bool>,
}

impl FundamentalSnapshot {
    pub fn compute(info: &InfoRecord) -> Self {
        Self {
            quality_score: quality_score(info),
            conviction_score: conviction_score(info),
            pe_ratio: info.pe_ratio,
            pb_ratio: info.pb_ratio,
            dividend_yield: info.dividend_yield.map(normalize_dividend_yield),
            beta: info.beta,
            market_cap: info.market_cap,
            sector: info.sector.clone(),
            roe: info.return_on_equity,
            revenue_growth: info.revenue_growth,
            eps_growth: info.eps_growth,
            industry_moat_strength: industry_moat_strength(info),
            has_fundamental_shift: has_fundamental_shift(info, DEFAULT_SHIFT_THRESHOLD),
            meets_quality: meets_quality(info, DEFAULT_MIN_QUALITY),
            meets_roe: meets_roe(info, DEFAULT_MIN_ROE),
            meets_growth: meets_growth(info, DEFAULT_MIN_GROWTH),
            meets_valuation: meets_valuation(info, DEFAULT_MAX_PE, DEFAULT_MAX_PB),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blue_chip() -> InfoRecord {
        InfoRecord {
            symbol: "JNJ".into(),
            sector: Some("Healthcare".into()),
            market_cap: Some(380_000_000_000.0),
            pe_ratio: Some(14.0),
            dividend_yield: Some(0.03),
            beta: Some(0.6),
            return_on_equity: Some(0.25),
            revenue_growth: Some(0.06),
            ..Default::default()
        }
    }

    #[test]
    fn quality_score_adds_buckets_and_caps() {
        // 25 (pe) + 25 (cap) + 20 (beta) + 10 (div) + 10 (sector) = 90.
        assert_eq!(quality_score(&blue_chip()), 90);
        assert_eq!(quality_score(&InfoRecord::default()), 0);
    }

    #[test]
    fn quality_ignores_non_positive_pe() {
        let mut info = blue_chip();
        info.pe_ratio = Some(-4.0);
        assert_eq!(quality_score(&info), 65);
    }

    #[test]
    fn conviction_combines_components() {
        // 90 * 0.4 = 36, + growth 10 (0.06) + pe 20 (<15) + roe 20 (>0.2) = 86.
        assert_eq!(conviction_score(&blue_chip()), 86);
    }

    #[test]
    fn dividend_yield_percentage_is_normalized() {
        assert_eq!(normalize_dividend_yield(2.5), 0.025);
        assert_eq!(normalize_dividend_yield(0.025), 0.025);
    }

    #[test]
    fn moat_promotes_mega_caps() {
        let mut info = InfoRecord {
            sector: Some("Financial Services".into()),
            market_cap: Some(400_000_000_000.0),
            ..Default::default()
        };
        assert_eq!(industry_moat_strength(&info), MoatStrength::Strong);

        info.market_cap = Some(5_000_000_000.0);
        assert_eq!(industry_moat_strength(&info), MoatStrength::Moderate);

        info.sector = Some("Energy".into());
        assert_eq!(industry_moat_strength(&info), MoatStrength::Weak);
        info.sector = None;
        assert_eq!(industry_moat_strength(&info), MoatStrength::Weak);
    }

    #[test]
    fn predicates_report_unknown_inputs() {
        let empty = InfoRecord::default();
        assert_eq!(meets_roe(&empty, 0.1), None);
        assert_eq!(meets_growth(&empty, 0.1), None);
        assert_eq!(meets_valuation(&empty, 20.0, 2.0), None);

        let pe_only = InfoRecord {
            pe_ratio: Some(18.0),
            ..Default::default()
        };
        assert_eq!(meets_valuation(&pe_only, 20.0, 2.0), Some(true));
        assert_eq!(meets_valuation(&pe_only, 15.0, 2.0), Some(false));
    }

    #[test]
    fn growth_takes_the_better_of_revenue_and_eps() {
        let info = InfoRecord {
            revenue_growth: Some(0.02),
            eps_growth: Some(0.18),
            ..Default::default()
        };
        assert_eq!(meets_growth(&info, 0.1), Some(true));
    }

    #[test]
    fn fundamental_shift_triggers_on_contraction_or_low_quality() {
        let mut info = blue_chip();
        assert!(!has_fundamental_shift(&info, 0.1));

        info.revenue_growth = Some(-0.2);
        assert!(has_fundamental_shift(&info, 0.1));

        assert!(has_fundamental_shift(&InfoRecord::default(), 0.1));
    }
}
