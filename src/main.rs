//! PaperProfit - paper-trading engine.
//!
//! Two subcommands: `migrate` manages the SQLite schema and sample data,
//! `api` initializes the schema, starts the background workers, and serves
//! the HTTP surface until ctrl-c.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use paperprofit_backend::ai::AiClient;
use paperprofit_backend::analysis::scoring::{ScoringConfig, ScoringService};
use paperprofit_backend::api::{self, ApiState};
use paperprofit_backend::jobs::{
    market_data_refresher::{self, MarketDataRefresher},
    order_matcher::{self, OrderMatcher},
    position_revaluer::{self, PositionRevaluer},
    trading_bot::{self, TradingBot},
    JobController,
};
use paperprofit_backend::providers::ProviderStack;
use paperprofit_backend::storage::{migrate, Db, Store};

#[derive(Parser, Debug)]
#[command(name = "paperprofit")]
#[command(about = "Paper-trading engine: background workers, decision pipeline, HTTP API")]
struct Args {
    /// Path to the SQLite database
    #[arg(long, env = "PAPERPROFIT_DB", default_value = "paperprofit.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the database schema
    Migrate {
        #[arg(long, value_enum, default_value_t = MigrateAction::Init)]
        action: MigrateAction,
    },

    /// Run workers and serve the HTTP API
    Api {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value_t = 5000)]
        port: u16,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MigrateAction {
    Init,
    Status,
    Migrate,
    MigrateAll,
    Sample,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let result = match args.command {
        Commands::Migrate { action } => run_migrate(&args.db, action).await,
        Commands::Api { host, port } => run_api(&args.db, &host, port).await,
    };

    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "fatal");
    }
    result
}

async fn run_migrate(db_path: &str, action: MigrateAction) -> Result<()> {
    let db = Db::open(db_path)?;
    match action {
        MigrateAction::Init => {
            migrate::init(&db).await?;
            println!("schema initialized at {db_path}");
        }
        MigrateAction::Status => {
            for (table, present) in migrate::status(&db).await? {
                println!("{table}: {}", if present { "present" } else { "missing" });
            }
        }
        MigrateAction::Migrate => {
            let applied = migrate::migrate(&db).await?;
            println!("{applied} migration(s) applied");
        }
        MigrateAction::MigrateAll => {
            let applied = migrate::migrate_all(&db).await?;
            println!("schema initialized, {applied} migration(s) applied");
        }
        MigrateAction::Sample => {
            migrate::sample(&db).await?;
            println!("sample data seeded");
        }
    }
    Ok(())
}

async fn run_api(db_path: &str, host: &str, port: u16) -> Result<()> {
    let db = Db::open(db_path)?;
    migrate::migrate_all(&db).await?;
    let store = Store::new(db);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("build http client")?;

    let providers = ProviderStack::live(http.clone(), store.settings());
    let generator = Arc::new(AiClient::new(http, store.settings()));
    let scoring_config = ScoringConfig::load(std::path::Path::new("config/scoring.toml"));
    let enricher = Arc::new(ScoringService::new(providers.clone(), scoring_config));

    let controller = Arc::new(JobController::new(store.clone()));
    controller.register(
        "order_matcher",
        Arc::new(OrderMatcher::new(store.clone(), providers.clone())),
        order_matcher::DEFAULT_INTERVAL,
    )?;
    controller.register(
        "position_revaluer",
        Arc::new(PositionRevaluer::new(store.clone(), providers.clone())),
        position_revaluer::DEFAULT_INTERVAL,
    )?;
    controller.register(
        "market_data_refresher",
        Arc::new(MarketDataRefresher::new(store.clone(), providers.clone())),
        market_data_refresher::DEFAULT_INTERVAL,
    )?;
    controller.register(
        "trading_bot",
        Arc::new(TradingBot::new(store.clone(), providers, generator)),
        trading_bot::DEFAULT_INTERVAL,
    )?;
    controller.start(None);

    let app = api::router(ApiState {
        store,
        controller: controller.clone(),
        enricher,
    });

    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(addr = %addr, "api server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("api server")?;

    controller.stop(None).await;
    info!("all jobs stopped");
    Ok(())
}
