/// Database connection and table bootstrap
pub mod database;

/// Fleet settings loaded from fleet.toml
pub mod fleet;

pub use fleet::{ExpenseDateBasis, FleetConfig, load_config, load_default_config};
