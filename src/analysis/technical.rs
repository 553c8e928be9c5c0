//! Technical indicator math. Every function is a pure computation over an
//! ordered close-price series (oldest first) and returns `None` when the
//! series is too short, never a fabricated value.

use serde::Serialize;

use crate::models::Trend;

pub const RSI_PERIOD: usize = 14;
pub const BOLLINGER_WINDOW: usize = 20;
pub const BOLLINGER_K: f64 = 2.0;
pub const VOLATILITY_WINDOW: usize = 20;
pub const NEAR_LEVEL_THRESHOLD_PCT: f64 = 5.0;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SupportResistance {
    pub pivot: f64,
    pub resistance_1: f64,
    pub resistance_2: f64,
    pub support_1: f64,
    pub support_2: f64,
    pub recent_high: f64,
    pub recent_low: f64,
}

/// Simple moving average over the last `window` samples.
pub fn sma(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let tail = &closes[closes.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Exponential moving average seeded with the first sample:
/// `e <- e + alpha * (p - e)` with `alpha = 2 / (window + 1)`.
pub fn ema(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let alpha = 2.0 / (window as f64 + 1.0);
    let mut e = closes[0];
    for p in &closes[1..] {
        e += alpha * (p - e);
    }
    Some(e)
}

/// RSI over the last `period` price changes. A flat or all-gain series has
/// zero average loss and yields 100.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let tail = &changes[changes.len() - period..];
    let avg_gain = tail.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let avg_loss = -tail.iter().filter(|c| **c < 0.0).sum::<f64>() / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD line = EMA(12) - EMA(26); signal = EMA(9) of the MACD series. With
/// fewer than 9 MACD samples the signal falls back to the current line and
/// the histogram collapses to zero.
pub fn macd(closes: &[f64]) -> Option<Macd> {
    if closes.len() < 26 {
        return None;
    }

    let alpha_12 = 2.0 / 13.0;
    let alpha_26 = 2.0 / 27.0;
    let mut e12 = closes[0];
    let mut e26 = closes[0];
    let mut series = Vec::with_capacity(closes.len().saturating_sub(25));

    for (i, p) in closes.iter().enumerate().skip(1) {
        e12 += alpha_12 * (p - e12);
        e26 += alpha_26 * (p - e26);
        if i >= 25 {
            series.push(e12 - e26);
        }
    }

    let line = *series.last()?;
    let signal = if series.len() < 9 {
        line
    } else {
        ema(&series, 9)?
    };

    Some(Macd {
        line,
        signal,
        histogram: line - signal,
    })
}

/// Bollinger bands: middle = SMA, band width = k * population stddev over
/// the window.
pub fn bollinger(closes: &[f64], window: usize, k: f64) -> Option<Bollinger> {
    let middle = sma(closes, window)?;
    let tail = &closes[closes.len() - window..];
    let variance = tail.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / window as f64;
    let width = k * variance.sqrt();
    Some(Bollinger {
        upper: middle + width,
        middle,
        lower: middle - width,
    })
}

/// Population stddev of daily simple returns over the window, annualized by
/// sqrt(252).
pub fn volatility(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window + 1 {
        return None;
    }

    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.len() < window {
        return None;
    }

    let tail = &returns[returns.len() - window..];
    let mean = tail.iter().sum::<f64>() / tail.len() as f64;
    let variance = tail.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / tail.len() as f64;
    Some(variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Classic pivot levels from the recent-20 high/low and the last close.
pub fn support_resistance(closes: &[f64]) -> Option<SupportResistance> {
    if closes.len() < 20 {
        return None;
    }
    let tail = &closes[closes.len() - 20..];
    let recent_high = tail.iter().copied().fold(f64::MIN, f64::max);
    let recent_low = tail.iter().copied().fold(f64::MAX, f64::min);
    let close = *closes.last()?;

    let pivot = (recent_high + recent_low + close) / 3.0;
    Some(SupportResistance {
        pivot,
        resistance_1: 2.0 * pivot - recent_low,
        resistance_2: pivot + (recent_high - recent_low),
        support_1: 2.0 * pivot - recent_high,
        support_2: pivot - (recent_high - recent_low),
        recent_high,
        recent_low,
    })
}

/// BULLISH above both the 20- and 50-day SMA, BEARISH below both, else
/// SIDEWAYS.
pub fn trend(close: f64, sma_20: f64, sma_50: f64) -> Trend {
    if close > sma_20 && close > sma_50 {
        Trend::Bullish
    } else if close < sma_20 && close < sma_50 {
        Trend::Bearish
    } else {
        Trend::Sideways
    }
}

fn near_level(price: f64, level: f64, threshold_pct: f64) -> bool {
    level != 0.0 && (price - level).abs() / level * 100.0 <= threshold_pct
}

/// Everything the decision pipeline consumes for one symbol, computed in one
/// pass over the close series.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TechnicalSnapshot {
    pub current_price: f64,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_20: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<Macd>,
    pub bollinger: Option<Bollinger>,
    pub volatility: Option<f64>,
    pub trend: Option<Trend>,
    pub support_resistance: Option<SupportResistance>,
    pub is_overbought: Option<bool>,
    pub is_oversold: Option<bool>,
    pub has_golden_cross: Option<bool>,
    pub has_death_cross: Option<bool>,
    pub is_price_near_support: Option<bool>,
    pub is_price_near_resistance: Option<bool>,
}

impl TechnicalSnapshot {
    pub fn compute(closes: &[f64], current_price: f64) -> Self {
        let sma_20 = sma(closes, 20);
        let sma_50 = sma(closes, 50);
        let sma_200 = sma(closes, 200);
        let rsi_value = rsi(closes, RSI_PERIOD);
        let levels = support_resistance(closes);

        let trend = match (sma_20, sma_50) {
            (Some(s20), Some(s50)) => Some(trend(current_price, s20, s50)),
            _ => None,
        };
        let crossovers = match (sma_50, sma_200) {
            (Some(s50), Some(s200)) => (Some(s50 > s200), Some(s50 < s200)),
            _ => (None, None),
        };

        Self {
            current_price,
            sma_20,
            sma_50,
            sma_200,
            ema_20: ema(closes, 20),
            rsi: rsi_value,
            macd: macd(closes),
            bollinger: bollinger(closes, BOLLINGER_WINDOW, BOLLINGER_K),
            volatility: volatility(closes, VOLATILITY_WINDOW),
            trend,
            support_resistance: levels,
            is_overbought: rsi_value.map(|r| r >= 70.0),
            is_oversold: rsi_value.map(|r| r <= 30.0),
            has_golden_cross: crossovers.0,
            has_death_cross: crossovers.1,
            is_price_near_support: levels
                .map(|l| near_level(current_price, l.support_1, NEAR_LEVEL_THRESHOLD_PCT)),
            is_price_near_resistance: levels
                .map(|l| near_level(current_price, l.resistance_1, NEAR_LEVEL_THRESHOLD_PCT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize, f: impl Fn(usize) -> f64) -> Vec<f64> {
        (0..n).map(f).collect()
    }

    #[test]
    fn sma_requires_full_window() {
        let closes = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(sma(&closes, 2), Some(3.5));
        assert_eq!(sma(&closes, 4), Some(2.5));
        assert_eq!(sma(&closes, 5), None);
    }

    #[test]
    fn ema_matches_hand_computation() {
        // alpha = 2/4 = 0.5 for window 3.
        let closes = [2.0, 4.0, 8.0];
        // e = 2 -> 3 -> 5.5
        assert_eq!(ema(&closes, 3), Some(5.5));
        assert_eq!(ema(&closes, 4), None);
    }

    #[test]
    fn rsi_is_100_when_average_loss_is_zero() {
        let flat = series(30, |_| 50.0);
        assert_eq!(rsi(&flat, 14), Some(100.0));

        let rising = series(30, |i| 50.0 + i as f64);
        assert_eq!(rsi(&rising, 14), Some(100.0));
    }

    #[test]
    fn rsi_balanced_series_is_fifty() {
        // Alternating +1/-1 changes: equal average gain and loss.
        let closes = series(31, |i| if i % 2 == 0 { 100.0 } else { 101.0 });
        let value = rsi(&closes, 14).unwrap();
        assert!((value - 50.0).abs() < 1e-9, "rsi = {value}");
    }

    #[test]
    fn macd_signal_falls_back_to_line_on_short_series() {
        // 30 closes produce 5 MACD samples (< 9): histogram must be 0.
        let closes = series(30, |i| 100.0 + i as f64);
        let m = macd(&closes).unwrap();
        assert_eq!(m.signal, m.line);
        assert_eq!(m.histogram, 0.0);

        // 40 closes produce 15 samples: a trending series keeps the line
        // above its own EMA.
        let closes = series(40, |i| 100.0 + i as f64);
        let m = macd(&closes).unwrap();
        assert!(m.histogram > 0.0);
    }

    #[test]
    fn macd_requires_26_samples() {
        assert!(macd(&series(25, |i| i as f64 + 1.0)).is_none());
    }

    #[test]
    fn bollinger_collapses_on_constant_series() {
        let flat = series(20, |_| 42.0);
        let bands = bollinger(&flat, 20, 2.0).unwrap();
        assert_eq!(bands.upper, 42.0);
        assert_eq!(bands.middle, 42.0);
        assert_eq!(bands.lower, 42.0);
    }

    #[test]
    fn volatility_is_zero_for_constant_returns() {
        // Constant 1% daily growth: every return identical, stddev 0.
        let closes = series(40, |i| 100.0 * 1.01f64.powi(i as i32));
        let vol = volatility(&closes, 20).unwrap();
        assert!(vol.abs() < 1e-9);
        assert_eq!(volatility(&closes[..20], 20), None);
    }

    #[test]
    fn support_resistance_pivot_formulas() {
        // 19 closes at 100, last at 110; high = 110, low = 100.
        let mut closes = series(19, |_| 100.0);
        closes.push(110.0);
        let levels = support_resistance(&closes).unwrap();

        let pivot = (110.0 + 100.0 + 110.0) / 3.0;
        assert!((levels.pivot - pivot).abs() < 1e-9);
        assert!((levels.resistance_1 - (2.0 * pivot - 100.0)).abs() < 1e-9);
        assert!((levels.support_1 - (2.0 * pivot - 110.0)).abs() < 1e-9);
        assert!((levels.resistance_2 - (pivot + 10.0)).abs() < 1e-9);
        assert!((levels.support_2 - (pivot - 10.0)).abs() < 1e-9);
    }

    #[test]
    fn trend_labels() {
        assert_eq!(trend(110.0, 105.0, 100.0), Trend::Bullish);
        assert_eq!(trend(90.0, 105.0, 100.0), Trend::Bearish);
        assert_eq!(trend(102.0, 105.0, 100.0), Trend::Sideways);
    }

    #[test]
    fn snapshot_booleans_follow_rsi_and_levels() {
        let falling = series(60, |i| 200.0 - i as f64);
        let snap = TechnicalSnapshot::compute(&falling, *falling.last().unwrap());
        assert_eq!(snap.is_oversold, Some(true));
        assert_eq!(snap.is_overbought, Some(false));
        assert_eq!(snap.trend, Some(Trend::Bearish));
        // 60 samples cannot carry a 200-day SMA.
        assert_eq!(snap.sma_200, None);
        assert_eq!(snap.has_golden_cross, None);
    }
}
