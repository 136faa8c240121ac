//! Cab entity - one vehicle of the fleet.
//!
//! `total_earnings` and `total_trips` are running totals maintained by trip
//! completion; `current_latitude`/`current_longitude` are written by location
//! pings only.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operational status of a cab. Any status may be edited into any other.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum CabStatus {
    /// On the road and accepting trips
    #[sea_orm(string_value = "active")]
    Active,
    /// In the workshop
    #[sea_orm(string_value = "maintenance")]
    Maintenance,
    /// Parked or retired
    #[sea_orm(string_value = "inactive")]
    Inactive,
}

impl CabStatus {
    /// Stored string form of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Maintenance => "maintenance",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for CabStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude, -90..=90
    pub lat: f64,
    /// Longitude, -180..=180
    pub lng: f64,
}

/// Cab database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cabs")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Store-assigned identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Licence plate, unique within the fleet
    #[sea_orm(unique)]
    pub registration_number: String,
    /// Make and model, e.g. "Toyota Prius"
    #[serde(rename = "model")]
    pub vehicle_model: String,
    /// Name of the assigned driver
    pub driver_name: String,
    /// Driver contact number
    pub driver_phone: String,
    /// Model year
    pub year: i32,
    /// Paint colour
    pub color: Option<String>,
    /// Current operational status
    pub status: CabStatus,
    /// Sum of fares of all trips completed by this cab
    pub total_earnings: f64,
    /// Number of trips completed by this cab
    pub total_trips: i64,
    /// Last reported latitude
    pub current_latitude: Option<f64>,
    /// Last reported longitude
    pub current_longitude: Option<f64>,
    /// When the last location ping arrived
    pub last_location_update: Option<DateTimeUtc>,
    /// When the cab was added to the fleet
    pub created_at: DateTimeUtc,
    /// When the cab was last edited
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Last reported position, if the cab has ever sent one.
    #[must_use]
    pub fn current_location(&self) -> Option<Coordinate> {
        self.current_latitude
            .zip(self.current_longitude)
            .map(|(lat, lng)| Coordinate { lat, lng })
    }
}

/// Trips and expenses point at cabs by id only, so no relations are declared.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
