//! Persistence layer. The only writer of durable state: workers and the API
//! mutate entities exclusively through these repositories.

pub mod accounts;
pub mod db;
pub mod instruments;
pub mod market_data;
pub mod migrate;
pub mod orders;
pub mod positions;
pub mod settings;
pub mod settlement;
pub mod signals;
pub mod strategies;
pub mod system_log;
pub mod trades;

pub use db::Db;

use accounts::AccountRepo;
use instruments::InstrumentRepo;
use market_data::MarketDataRepo;
use orders::OrderRepo;
use positions::PositionRepo;
use settings::SettingsRepo;
use settlement::SettlementRepo;
use signals::SignalRepo;
use strategies::StrategyRepo;
use system_log::SystemLogRepo;
use trades::TradeRepo;

/// Factory handing out per-entity repositories over one shared database.
#[derive(Clone)]
pub struct Store {
    db: Db,
}

impl Store {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn accounts(&self) -> AccountRepo {
        AccountRepo::new(self.db.clone())
    }

    pub fn instruments(&self) -> InstrumentRepo {
        InstrumentRepo::new(self.db.clone())
    }

    pub fn strategies(&self) -> StrategyRepo {
        StrategyRepo::new(self.db.clone())
    }

    pub fn market_data(&self) -> MarketDataRepo {
        MarketDataRepo::new(self.db.clone())
    }

    pub fn signals(&self) -> SignalRepo {
        SignalRepo::new(self.db.clone())
    }

    pub fn orders(&self) -> OrderRepo {
        OrderRepo::new(self.db.clone())
    }

    pub fn positions(&self) -> PositionRepo {
        PositionRepo::new(self.db.clone())
    }

    pub fn trades(&self) -> TradeRepo {
        TradeRepo::new(self.db.clone())
    }

    pub fn settlement(&self) -> SettlementRepo {
        SettlementRepo::new(self.db.clone())
    }

    pub fn settings(&self) -> SettingsRepo {
        SettingsRepo::new(self.db.clone())
    }

    pub fn system_log(&self) -> SystemLogRepo {
        SystemLogRepo::new(self.db.clone())
    }
}
