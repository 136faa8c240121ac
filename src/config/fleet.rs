//! Fleet configuration loading from fleet.toml
//!
//! Every key is optional; anything left out falls back to the defaults in
//! [`FleetConfig::default`].

use crate::core::report::ReportRange;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Which expense field drives expense date-range queries.
///
/// Dashboards and reports historically disagreed on this; the choice is made
/// once here and applied to every expense range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseDateBasis {
    /// The calendar day the cost was incurred
    #[default]
    Date,
    /// The moment the expense was recorded
    CreatedAt,
}

/// Configuration structure representing the entire fleet.toml file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Database URL, overridden by `DATABASE_URL`
    pub database_url: String,
    /// Field used for expense date ranges
    pub expense_date_basis: ExpenseDateBasis,
    /// Buffer size of the store change feed
    pub change_feed_capacity: usize,
    /// Range used when a report is requested without one
    pub default_report_range: ReportRange,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/fleet.sqlite?mode=rwc".to_string(),
            expense_date_basis: ExpenseDateBasis::Date,
            change_feed_capacity: 256,
            default_report_range: ReportRange::Last7Days,
        }
    }
}

/// Loads fleet configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A value has the wrong type
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FleetConfig> {
    let path = path.as_ref();
    debug!("Loading fleet configuration from {}", path.display());
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.display()),
    })?;

    let config: FleetConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path.display()),
    })?;

    if config.change_feed_capacity == 0 {
        return Err(Error::Config {
            message: "change_feed_capacity must be at least 1".to_string(),
        });
    }
    Ok(config)
}

/// Loads configuration from `FLEET_CONFIG` or `./fleet.toml`, falling back
/// to defaults when the file does not exist.
pub fn load_default_config() -> Result<FleetConfig> {
    let path = std::env::var("FLEET_CONFIG").unwrap_or_else(|_| "fleet.toml".to_string());
    if Path::new(&path).exists() {
        load_config(&path)
    } else {
        info!("No configuration file at {path}, using defaults");
        Ok(FleetConfig::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_fleet_config() {
        let toml_str = r#"
            database_url = "sqlite://fleet-test.sqlite"
            expense_date_basis = "created_at"
            change_feed_capacity = 32
            default_report_range = "30d"
        "#;

        let config: FleetConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database_url, "sqlite://fleet-test.sqlite");
        assert_eq!(config.expense_date_basis, ExpenseDateBasis::CreatedAt);
        assert_eq!(config.change_feed_capacity, 32);
        assert_eq!(config.default_report_range, ReportRange::Last30Days);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config: FleetConfig = toml::from_str("").unwrap();
        assert_eq!(config.expense_date_basis, ExpenseDateBasis::Date);
        assert_eq!(config.change_feed_capacity, 256);
        assert_eq!(config.default_report_range, ReportRange::Last7Days);
    }

    #[test]
    fn test_unknown_basis_is_rejected() {
        let result: std::result::Result<FleetConfig, _> =
            toml::from_str(r#"expense_date_basis = "receipt""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("definitely/not/here.toml");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
