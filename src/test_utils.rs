//! Shared test utilities for the fleet layer.
//!
//! This module provides helpers for setting up an in-memory fleet, creating
//! records with sensible defaults, building plain models for the pure
//! functions, and waiting on live deliveries.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use crate::{
    config::{FleetConfig, database},
    core::{cab::NewCab, expense::NewExpense, trip::NewTrip},
    entities::{CabModel, CabStatus, ExpenseModel, PaymentStatus, TripModel, TripStatus},
    errors::{Error, Result},
    fleet::Fleet,
    store::FleetStore,
};
use chrono::{NaiveDate, TimeZone, Utc};
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// How long a test waits for a live delivery before failing.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);
/// How long a test waits to be sure nothing more is delivered.
const QUIET_PERIOD: Duration = Duration::from_millis(150);

/// Creates a fleet over an in-memory `SQLite` database with all tables
/// initialized. This is the standard setup for all integration tests.
pub async fn setup_test_fleet() -> Result<Fleet> {
    setup_test_fleet_with(FleetConfig::default()).await
}

/// Like [`setup_test_fleet`] with a custom configuration. The configured
/// database URL is ignored.
pub async fn setup_test_fleet_with(config: FleetConfig) -> Result<Fleet> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    database::create_tables(&db).await?;
    let store = FleetStore::new(db, config.change_feed_capacity);
    Ok(Fleet::with_store(store, config))
}

/// A valid cab form.
///
/// # Defaults
/// * `registration_number`: `"KA-00-TEST"`
/// * `model`: `"Toyota Etios"`
/// * `year`: 2020
pub fn test_new_cab() -> NewCab {
    NewCab {
        registration_number: Some("KA-00-TEST".to_string()),
        vehicle_model: Some("Toyota Etios".to_string()),
        driver_name: Some("Test Driver".to_string()),
        driver_phone: Some("9000000000".to_string()),
        year: Some(2020),
        color: Some("white".to_string()),
    }
}

/// Creates a cab with the given registration number and returns it as stored.
pub async fn create_test_cab(fleet: &Fleet, registration: &str) -> Result<CabModel> {
    let id = fleet
        .cabs()
        .create(NewCab {
            registration_number: Some(registration.to_string()),
            ..test_new_cab()
        })
        .await?;
    fleet.cabs().get_by_id(id).await?.ok_or_else(|| Error::validation("cab vanished"))
}

/// A valid trip form for `cab_id` from "MG Road" to "Airport".
pub fn test_new_trip(cab_id: i64) -> NewTrip {
    NewTrip {
        cab_id: Some(cab_id),
        pickup_location: Some("MG Road".to_string()),
        destination: Some("Airport".to_string()),
        fare: Some(50.0),
        distance: None,
        duration: None,
        notes: None,
    }
}

/// Starts a trip for `cab_id` with the given quoted fare and returns it as stored.
pub async fn create_test_trip(fleet: &Fleet, cab_id: i64, fare: f64) -> Result<TripModel> {
    let id = fleet
        .trips()
        .create(NewTrip {
            fare: Some(fare),
            ..test_new_trip(cab_id)
        })
        .await?;
    fleet.trips().get_by_id(id).await?.ok_or_else(|| Error::validation("trip vanished"))
}

/// A valid expense form; `date` is `YYYY-MM-DD`.
pub fn test_new_expense(date: &str, category: &str, amount: f64) -> NewExpense {
    NewExpense {
        description: Some(format!("Test {category} expense")),
        category: Some(category.to_string()),
        amount: Some(amount),
        date: Some(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()),
        cab_id: None,
        receipt_number: None,
        notes: None,
    }
}

/// Records an expense and returns it as stored.
pub async fn create_test_expense(
    fleet: &Fleet,
    date: &str,
    category: &str,
    amount: f64,
) -> Result<ExpenseModel> {
    let id = fleet
        .expenses()
        .create(test_new_expense(date, category, amount))
        .await?;
    fleet
        .expenses()
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::validation("expense vanished"))
}

/// A cab model that never touched the store.
pub fn cab_model(id: i64, registration: &str, driver: &str, status: CabStatus) -> CabModel {
    let created = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
    CabModel {
        id,
        registration_number: registration.to_string(),
        vehicle_model: "Maruti Dzire".to_string(),
        driver_name: driver.to_string(),
        driver_phone: "9000000000".to_string(),
        year: 2022,
        color: None,
        status,
        total_earnings: 0.0,
        total_trips: 0,
        current_latitude: None,
        current_longitude: None,
        last_location_update: None,
        created_at: created,
        updated_at: created,
    }
}

/// A trip model from "MG Road" to "Airport" that never touched the store.
pub fn trip_model(
    id: i64,
    status: TripStatus,
    fare: Option<f64>,
    distance: Option<f64>,
) -> TripModel {
    let created = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
    TripModel {
        id,
        cab_id: 1,
        pickup_location: "MG Road".to_string(),
        destination: "Airport".to_string(),
        fare,
        distance,
        duration: None,
        status,
        payment_status: PaymentStatus::Pending,
        notes: None,
        created_at: created,
        completed_at: (status == TripStatus::Completed).then_some(created),
        updated_at: created,
    }
}

/// An expense model that never touched the store.
pub fn expense_model(id: i64, category: &str, amount: f64) -> ExpenseModel {
    let created = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
    ExpenseModel {
        id,
        description: format!("{category} bill"),
        category: category.to_string(),
        amount,
        date: created.date_naive(),
        cab_id: None,
        receipt_number: None,
        notes: None,
        created_at: created,
        updated_at: created,
    }
}

/// Waits for the next live delivery, failing the test after a timeout.
pub async fn next_delivery<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(DELIVERY_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a live delivery")
        .expect("observer stopped delivering")
}

/// Asserts that nothing is delivered for a short while. A closed channel
/// counts as silence.
pub async fn assert_no_delivery<T: Debug>(rx: &mut UnboundedReceiver<T>) {
    if let Ok(Some(value)) = tokio::time::timeout(QUIET_PERIOD, rx.recv()).await {
        panic!("unexpected live delivery: {value:?}");
    }
}
