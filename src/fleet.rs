//! The `Fleet` handle: one store, one live view coordinator, three repositories.

use crate::config::FleetConfig;
use crate::core::cab::CabRepository;
use crate::core::expense::ExpenseRepository;
use crate::core::live::LiveViews;
use crate::core::trip::TripRepository;
use crate::errors::Result;
use crate::store::FleetStore;
use std::sync::Arc;

/// Entry point to the fleet data layer.
///
/// Repositories are cheap handles sharing the same store and coordinator, so
/// observers registered through any of them share one listener per collection.
#[derive(Debug)]
pub struct Fleet {
    store: Arc<FleetStore>,
    live: Arc<LiveViews>,
    config: FleetConfig,
}

impl Fleet {
    /// Connects to the configured database, creating the tables if needed.
    pub async fn connect(config: FleetConfig) -> Result<Self> {
        let store = FleetStore::connect(&config).await?;
        Ok(Self::with_store(store, config))
    }

    /// Builds a fleet over an already prepared store.
    #[must_use]
    pub fn with_store(store: FleetStore, config: FleetConfig) -> Self {
        let store = Arc::new(store);
        let live = Arc::new(LiveViews::new(Arc::clone(&store)));
        Self {
            store,
            live,
            config,
        }
    }

    /// The Cab Repository.
    #[must_use]
    pub fn cabs(&self) -> CabRepository {
        CabRepository::new(Arc::clone(&self.store), Arc::clone(&self.live))
    }

    /// The Trip Repository.
    #[must_use]
    pub fn trips(&self) -> TripRepository {
        TripRepository::new(Arc::clone(&self.store), Arc::clone(&self.live), self.cabs())
    }

    /// The Expense Repository, using the configured expense date basis.
    #[must_use]
    pub fn expenses(&self) -> ExpenseRepository {
        ExpenseRepository::new(
            Arc::clone(&self.store),
            Arc::clone(&self.live),
            self.config.expense_date_basis,
        )
    }

    /// The live view coordinator.
    #[must_use]
    pub fn live(&self) -> &LiveViews {
        &self.live
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &FleetStore {
        &self.store
    }

    /// Configuration the fleet was opened with.
    #[must_use]
    pub const fn config(&self) -> &FleetConfig {
        &self.config
    }
}
