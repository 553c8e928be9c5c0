//! Domain entities persisted by the storage layer, plus the small enums that
//! gate state transitions (order status, signal type, trend labels).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::Stop => "STOP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MARKET" => Some(Self::Market),
            "LIMIT" => Some(Self::Limit),
            "STOP" => Some(Self::Stop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "FILLED" => Some(Self::Filled),
            "CANCELLED" => Some(Self::Cancelled),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Valid transitions form a prefix of PENDING -> terminal.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match self {
            Self::Pending => true,
            _ => *self == next,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Bullish,
    Bearish,
    Sideways,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
            Self::Sideways => "SIDEWAYS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub account_name: String,
    /// 'virtual' or an external-broker tag.
    pub account_type: String,
    pub cash_balance: f64,
    pub currency: String,
    /// 'active', 'inactive', 'suspended'.
    pub status: String,
    pub description: Option<String>,
    pub strategy_id: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub currency: String,
    pub is_active: bool,
    pub watch_list: bool,
    pub overall_score: Option<i64>,
    pub risk_score: Option<i64>,
    pub sector: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// 'Long' or 'Short'.
    pub category: Option<String>,
    /// 'Buy Hold', 'Growth', 'Swing Trade', 'Day Trade', ...
    pub strategy_type: Option<String>,
    /// 'Manual' or 'AI'.
    pub stock_list_mode: Option<String>,
    pub stock_list: Option<String>,
    pub stock_list_ai_prompt: Option<String>,
    /// Key -> value parameter bag, stored as a JSON document.
    pub parameters: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub account_id: String,
    pub symbol_id: i64,
    pub quantity: f64,
    pub average_entry_price: f64,
    pub current_price: Option<f64>,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub account_id: String,
    pub symbol_id: i64,
    pub strategy_id: Option<i64>,
    /// Simulated broker order id.
    pub order_id: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: f64,
    /// Limit price for limit orders; market orders carry the decision price.
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub status: OrderStatus,
    pub filled_quantity: f64,
    pub average_fill_price: Option<f64>,
    pub commission: f64,
    pub submitted_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub account_id: String,
    pub symbol_id: i64,
    pub strategy_id: Option<i64>,
    pub side: OrderSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
    pub pnl_percentage: Option<f64>,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub holding_period_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketBar {
    pub id: i64,
    pub symbol_id: i64,
    pub timestamp: DateTime<Utc>,
    /// '1min', '5min', '1hour', '1day'.
    pub interval: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub vwap: Option<f64>,
    pub trade_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    pub id: i64,
    pub symbol_id: i64,
    pub strategy_id: i64,
    pub timestamp: DateTime<Utc>,
    pub signal_type: SignalAction,
    /// Signed composite score at decision time.
    pub strength: f64,
    pub price: f64,
    pub confidence: f64,
    /// Canonical JSON document of contributing indicator -> value.
    pub indicators_used: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub id: i64,
    pub category: String,
    pub name: String,
    /// Free-form value, typically a JSON document.
    pub parameters: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub account_id: Option<String>,
    pub level: String,
    pub module: String,
    pub message: String,
    pub details: Option<String>,
}

/// Round a cash amount to cents. Balances never carry more than two
/// fractional digits through the store.
pub fn round_cash(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_transitions_are_monotone() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Filled));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Rejected));
        assert!(!OrderStatus::Filled.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Rejected.can_transition_to(OrderStatus::Pending));
        assert!(OrderStatus::Filled.can_transition_to(OrderStatus::Filled));
    }

    #[test]
    fn side_and_status_round_trip_their_labels() {
        assert_eq!(OrderSide::parse("buy"), Some(OrderSide::Buy));
        assert_eq!(OrderStatus::parse("FILLED").unwrap().as_str(), "FILLED");
        assert_eq!(OrderType::parse("market"), Some(OrderType::Market));
        assert_eq!(OrderSide::parse("SHORT"), None);
    }

    #[test]
    fn round_cash_keeps_two_digits() {
        assert_eq!(round_cash(99.999), 100.0);
        assert_eq!(round_cash(0.004999), 0.0);
        assert_eq!(round_cash(880.0), 880.0);
    }
}
