//! End-to-end flows over a throwaway SQLite store with stub vendors: order
//! settlement arithmetic, rejection policy, the bot decision loop, and the
//! AI stock-list cache.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use paperprofit_backend::ai::{
    self, AiPlatform, CachedStockList, StockListGenerator, AI_CACHE_CATEGORY,
};
use paperprofit_backend::jobs::order_matcher::OrderMatcher;
use paperprofit_backend::jobs::trading_bot::TradingBot;
use paperprofit_backend::jobs::Job;
use paperprofit_backend::models::{OrderSide, OrderStatus, OrderType, SignalAction};
use paperprofit_backend::providers::{
    Fetch, HistoricalBar, HistoryPeriod, InfoRecord, Provider, ProviderKind, ProviderStack, Quote,
    VendorIndicators,
};
use paperprofit_backend::storage::orders::NewOrder;
use paperprofit_backend::storage::{migrate, Db, Store};

struct FakeProvider {
    price: Option<f64>,
    rsi: Option<f64>,
}

#[async_trait]
impl Provider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Yahoo
    }

    async fn fetch_info(&self, _symbol: &str) -> Fetch<InfoRecord> {
        Fetch::Empty
    }

    async fn fetch_current_price(&self, symbol: &str) -> Fetch<Quote> {
        match self.price {
            Some(price) => Fetch::Found(Quote {
                symbol: symbol.to_string(),
                price,
                name: None,
                exchange: None,
                currency: None,
            }),
            None => Fetch::Empty,
        }
    }

    async fn fetch_historical(
        &self,
        _symbol: &str,
        _period: HistoryPeriod,
    ) -> Fetch<Vec<HistoricalBar>> {
        Fetch::Empty
    }

    async fn fetch_indicators(&self, _symbol: &str) -> Fetch<VendorIndicators> {
        match self.rsi {
            Some(rsi) => Fetch::Found(VendorIndicators {
                rsi: Some(rsi),
                sma_50: None,
                sma_200: None,
            }),
            None => Fetch::Empty,
        }
    }
}

struct FakeGenerator {
    response: Option<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl StockListGenerator for FakeGenerator {
    async fn generate(&self, _platform: AiPlatform, _prompt: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

async fn store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let db = Db::open(dir.path().join("flow.db").to_str().unwrap()).unwrap();
    migrate::init(&db).await.unwrap();
    (dir, Store::new(db))
}

fn stack(price: Option<f64>, rsi: Option<f64>) -> ProviderStack {
    ProviderStack::with_providers(vec![Arc::new(FakeProvider { price, rsi })])
}

async fn seed_strategy(store: &Store, mode: &str, list: Option<&str>, prompt: Option<&str>) -> i64 {
    store
        .strategies()
        .create(
            "flow-strategy",
            Some("integration fixture"),
            Some("Long"),
            Some("Swing Trade"),
            Some(mode),
            list,
            prompt,
            Some(r#"{"max_position_size_percent": 10}"#),
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn buy_signal_sizes_order_and_fill_moves_cash_and_position() {
    let (_dir, store) = store().await;
    let strategy_id = seed_strategy(&store, "Manual", Some("AAPL"), None).await;
    store
        .accounts()
        .create("acct-1", "Flow Account", 1000.0, Some(strategy_id))
        .await
        .unwrap();

    // RSI 20 from the vendor: +2 oversold region, +1 oversold boolean -> BUY.
    let providers = stack(Some(50.0), Some(20.0));
    let generator = Arc::new(FakeGenerator {
        response: None,
        calls: AtomicUsize::new(0),
    });
    let bot = TradingBot::new(store.clone(), providers.clone(), generator);
    bot.run().await.unwrap();

    let instrument = store.instruments().get_by_symbol("AAPL").await.unwrap().unwrap();

    let signals = store
        .signals()
        .recent(Some(instrument.id), None, 10)
        .await
        .unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].signal_type, SignalAction::Buy);
    assert_eq!(signals[0].strength, 3.0);

    let orders = store.orders().get_by_account("acct-1", 10).await.unwrap();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.side, OrderSide::Buy);
    assert_eq!(order.status, OrderStatus::Pending);
    // floor(min(1000 * 10%, 1000) / 50) = 2 shares.
    assert_eq!(order.quantity, 2.0);
    // The signal is persisted before the order is created.
    assert!(signals[0].timestamp <= order.submitted_at);

    let matcher = OrderMatcher::new(store.clone(), providers);
    matcher.run().await.unwrap();

    let order = store.orders().get_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.filled_quantity, 2.0);
    assert_eq!(order.average_fill_price, Some(50.0));
    assert!(order.filled_at.is_some());

    let account = store.accounts().get_by_id("acct-1").await.unwrap().unwrap();
    assert_eq!(account.cash_balance, 900.0);

    let position = store
        .positions()
        .get("acct-1", instrument.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.quantity, 2.0);
    assert_eq!(position.average_entry_price, 50.0);
}

#[tokio::test]
async fn insufficient_funds_rejects_and_leaves_cash_untouched() {
    let (_dir, store) = store().await;
    let strategy_id = seed_strategy(&store, "Manual", Some("AAPL"), None).await;
    store
        .accounts()
        .create("acct-poor", "Broke Account", 40.0, Some(strategy_id))
        .await
        .unwrap();
    let instrument = store.instruments().ensure("AAPL").await.unwrap();

    let order = store
        .orders()
        .create(NewOrder {
            account_id: "acct-poor".to_string(),
            symbol_id: instrument.id,
            strategy_id: Some(strategy_id),
            order_type: OrderType::Market,
            side: OrderSide::Buy,
            quantity: 1.0,
            price: Some(50.0),
            stop_price: None,
        })
        .await
        .unwrap();

    let matcher = OrderMatcher::new(store.clone(), stack(Some(50.0), None));
    matcher.run().await.unwrap();

    let order = store.orders().get_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);

    let account = store.accounts().get_by_id("acct-poor").await.unwrap().unwrap();
    assert_eq!(account.cash_balance, 40.0);
    assert!(store
        .positions()
        .get("acct-poor", instrument.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn buy_merge_uses_weighted_average_entry_price() {
    let (_dir, store) = store().await;
    let strategy_id = seed_strategy(&store, "Manual", Some("MSFT"), None).await;
    store
        .accounts()
        .create("acct-avg", "Averaging Account", 10_000.0, Some(strategy_id))
        .await
        .unwrap();
    let instrument = store.instruments().ensure("MSFT").await.unwrap();

    let matcher = OrderMatcher::new(store.clone(), stack(Some(100.0), None));
    for (qty, price) in [(10.0, 100.0), (5.0, 120.0)] {
        store
            .orders()
            .create(NewOrder {
                account_id: "acct-avg".to_string(),
                symbol_id: instrument.id,
                strategy_id: Some(strategy_id),
                order_type: OrderType::Market,
                side: OrderSide::Buy,
                quantity: qty,
                price: Some(price),
                stop_price: None,
            })
            .await
            .unwrap();
        matcher.run().await.unwrap();
    }

    let position = store
        .positions()
        .get("acct-avg", instrument.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.quantity, 15.0);
    // (10 * 100 + 5 * 120) / 15 = 106.666...
    assert!((position.average_entry_price - 106.6666666667).abs() < 1e-6);

    let account = store.accounts().get_by_id("acct-avg").await.unwrap().unwrap();
    assert_eq!(account.cash_balance, 10_000.0 - 1000.0 - 600.0);
}

#[tokio::test]
async fn full_exit_credits_cash_keeps_entry_price_and_records_trade() {
    let (_dir, store) = store().await;
    let strategy_id = seed_strategy(&store, "Manual", Some("NVDA"), None).await;
    store
        .accounts()
        .create("acct-exit", "Exit Account", 720.0, Some(strategy_id))
        .await
        .unwrap();
    let instrument = store.instruments().ensure("NVDA").await.unwrap();

    let buy_matcher = OrderMatcher::new(store.clone(), stack(Some(90.0), None));
    store
        .orders()
        .create(NewOrder {
            account_id: "acct-exit".to_string(),
            symbol_id: instrument.id,
            strategy_id: Some(strategy_id),
            order_type: OrderType::Market,
            side: OrderSide::Buy,
            quantity: 8.0,
            price: Some(90.0),
            stop_price: None,
        })
        .await
        .unwrap();
    buy_matcher.run().await.unwrap();

    let account = store.accounts().get_by_id("acct-exit").await.unwrap().unwrap();
    assert_eq!(account.cash_balance, 0.0);

    store
        .orders()
        .create(NewOrder {
            account_id: "acct-exit".to_string(),
            symbol_id: instrument.id,
            strategy_id: Some(strategy_id),
            order_type: OrderType::Market,
            side: OrderSide::Sell,
            quantity: 8.0,
            price: Some(110.0),
            stop_price: None,
        })
        .await
        .unwrap();
    OrderMatcher::new(store.clone(), stack(Some(110.0), None))
        .run()
        .await
        .unwrap();

    let account = store.accounts().get_by_id("acct-exit").await.unwrap().unwrap();
    assert_eq!(account.cash_balance, 880.0);

    let position = store
        .positions()
        .get("acct-exit", instrument.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.quantity, 0.0);
    // Entry price survives the exit until a future buy rewrites it.
    assert_eq!(position.average_entry_price, 90.0);
    assert_eq!(position.realized_pnl, 160.0);

    let trades = store.trades().recent(10).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, 8.0);
    assert_eq!(trades[0].entry_price, 90.0);
    assert_eq!(trades[0].exit_price, 110.0);
    assert_eq!(trades[0].gross_pnl, 160.0);
    assert_eq!(trades[0].commission, 0.0);
}

#[tokio::test]
async fn sell_without_shares_stays_pending() {
    let (_dir, store) = store().await;
    let strategy_id = seed_strategy(&store, "Manual", Some("TSLA"), None).await;
    store
        .accounts()
        .create("acct-short", "No Shares", 1000.0, Some(strategy_id))
        .await
        .unwrap();
    let instrument = store.instruments().ensure("TSLA").await.unwrap();

    let order = store
        .orders()
        .create(NewOrder {
            account_id: "acct-short".to_string(),
            symbol_id: instrument.id,
            strategy_id: Some(strategy_id),
            order_type: OrderType::Market,
            side: OrderSide::Sell,
            quantity: 5.0,
            price: Some(200.0),
            stop_price: None,
        })
        .await
        .unwrap();

    OrderMatcher::new(store.clone(), stack(Some(200.0), None))
        .run()
        .await
        .unwrap();

    // The asymmetric policy: sell-side shortfalls are not auto-rejected.
    let order = store.orders().get_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    let logs = store.system_log().recent(10).await.unwrap();
    assert!(logs.iter().any(|l| l.level == "ERROR"));
}

#[tokio::test]
async fn ai_stock_list_is_cached_for_a_day() {
    let (_dir, store) = store().await;
    let strategy_id = seed_strategy(&store, "AI", None, Some("tech growth")).await;
    store
        .accounts()
        .create("acct-ai", "AI Account", 1000.0, Some(strategy_id))
        .await
        .unwrap();

    let generator = Arc::new(FakeGenerator {
        response: Some("AAPL, MSFT".to_string()),
        calls: AtomicUsize::new(0),
    });
    // Neutral indicators: the bot only records HOLDs, which is enough to
    // exercise universe resolution.
    let bot = TradingBot::new(store.clone(), stack(Some(50.0), None), generator.clone());

    bot.run().await.unwrap();
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    // Second cycle within 24h hits the cache.
    bot.run().await.unwrap();
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    // The generated list is written back to the strategy for Manual fallback.
    let strategy = store.strategies().get_by_id(strategy_id).await.unwrap().unwrap();
    assert_eq!(strategy.stock_list.as_deref(), Some("AAPL,MSFT"));

    // Age the cache entry past the TTL; the next cycle calls the platform.
    let key = ai::cache_key("tech growth", AiPlatform::DeepSeek);
    let stale = CachedStockList {
        stock_list: vec!["AAPL".to_string(), "MSFT".to_string()],
        cached_at: Utc::now() - ChronoDuration::hours(25),
        cache_key: key.clone(),
    };
    store
        .settings()
        .upsert(&key, &serde_json::to_string(&stale).unwrap(), AI_CACHE_CATEGORY, true)
        .await
        .unwrap();

    bot.run().await.unwrap();
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn hold_signals_are_persisted_without_orders() {
    let (_dir, store) = store().await;
    let strategy_id = seed_strategy(&store, "Manual", Some("AAPL"), None).await;
    store
        .accounts()
        .create("acct-hold", "Hold Account", 1000.0, Some(strategy_id))
        .await
        .unwrap();

    let generator = Arc::new(FakeGenerator {
        response: None,
        calls: AtomicUsize::new(0),
    });
    // No RSI, no history: every factor is unknown, score stays 0.
    let bot = TradingBot::new(store.clone(), stack(Some(50.0), None), generator);
    bot.run().await.unwrap();

    let instrument = store.instruments().get_by_symbol("AAPL").await.unwrap().unwrap();
    let signals = store
        .signals()
        .recent(Some(instrument.id), None, 10)
        .await
        .unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].signal_type, SignalAction::Hold);
    assert_eq!(signals[0].confidence, 0.5);
    // Volume equals the default floor: the strict < gate does not trip.
    assert_eq!(signals[0].reason, "No clear signal");

    let doc: serde_json::Value = serde_json::from_str(&signals[0].indicators_used).unwrap();
    assert_eq!(doc["signal_score"], serde_json::json!(0));
    assert_eq!(doc["confidence"], serde_json::json!(0.5));

    assert!(store.orders().get_by_account("acct-hold", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn thin_volume_emits_a_low_volume_hold() {
    let (_dir, store) = store().await;
    let strategy_id = store
        .strategies()
        .create(
            "thin-volume",
            None,
            Some("Long"),
            Some("Swing Trade"),
            Some("Manual"),
            Some("AAPL"),
            None,
            Some(r#"{"min_volume": 2000000}"#),
        )
        .await
        .unwrap()
        .id;
    store
        .accounts()
        .create("acct-thin", "Thin Volume", 1000.0, Some(strategy_id))
        .await
        .unwrap();

    let generator = Arc::new(FakeGenerator {
        response: None,
        calls: AtomicUsize::new(0),
    });
    // Synthesized bars carry a volume of 1,000,000, below the raised floor.
    let bot = TradingBot::new(store.clone(), stack(Some(50.0), Some(20.0)), generator);
    bot.run().await.unwrap();

    let instrument = store.instruments().get_by_symbol("AAPL").await.unwrap().unwrap();
    let signals = store
        .signals()
        .recent(Some(instrument.id), None, 10)
        .await
        .unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].signal_type, SignalAction::Hold);
    assert_eq!(signals[0].reason, "Low volume");
    assert!(store.orders().get_by_account("acct-thin", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn watchlist_add_is_idempotent() {
    let (_dir, store) = store().await;
    let first = store.instruments().add_to_watchlist("aapl", None).await.unwrap();
    let second = store.instruments().add_to_watchlist("AAPL", None).await.unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.watch_list);
    assert_eq!(store.instruments().watchlist().await.unwrap().len(), 1);
}

#[tokio::test]
async fn buy_then_symmetric_sell_returns_cash_to_initial() {
    let (_dir, store) = store().await;
    let strategy_id = seed_strategy(&store, "Manual", Some("JPM"), None).await;
    store
        .accounts()
        .create("acct-round", "Round Trip", 5000.0, Some(strategy_id))
        .await
        .unwrap();
    let instrument = store.instruments().ensure("JPM").await.unwrap();

    let matcher = OrderMatcher::new(store.clone(), stack(Some(125.0), None));
    for side in [OrderSide::Buy, OrderSide::Sell] {
        store
            .orders()
            .create(NewOrder {
                account_id: "acct-round".to_string(),
                symbol_id: instrument.id,
                strategy_id: Some(strategy_id),
                order_type: OrderType::Market,
                side,
                quantity: 4.0,
                price: Some(125.0),
                stop_price: None,
            })
            .await
            .unwrap();
        matcher.run().await.unwrap();
    }

    let account = store.accounts().get_by_id("acct-round").await.unwrap().unwrap();
    assert_eq!(account.cash_balance, 5000.0);
}
