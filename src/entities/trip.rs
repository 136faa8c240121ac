//! Trip entity - a single fare-carrying ride.
//!
//! Trips move `active -> completed` or `active -> cancelled`; both targets are
//! terminal. `fare`, `distance` and `duration` are only authoritative once the
//! trip is completed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a trip.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    /// In progress
    #[sea_orm(string_value = "active")]
    Active,
    /// Finished and paid out to the cab's totals
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Abandoned before completion
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl TripStatus {
    /// Stored string form of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is permitted from this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Transition table: only `active` may move, and only into a terminal state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Completed | Self::Cancelled)
        )
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the rider has paid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Not yet settled
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Settled
    #[sea_orm(string_value = "paid")]
    Paid,
}

/// Trip database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trips")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Store-assigned identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Cab that drove the trip (lookup only, may dangle after the cab is deleted)
    pub cab_id: i64,
    /// Where the rider was picked up
    pub pickup_location: String,
    /// Where the rider was dropped off
    pub destination: String,
    /// Fare charged
    pub fare: Option<f64>,
    /// Distance driven in kilometres
    pub distance: Option<f64>,
    /// Duration in minutes
    pub duration: Option<f64>,
    /// Lifecycle status
    pub status: TripStatus,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Free-form notes
    pub notes: Option<String>,
    /// When the trip was booked
    pub created_at: DateTimeUtc,
    /// When the trip was completed
    pub completed_at: Option<DateTimeUtc>,
    /// When the trip was last written
    pub updated_at: DateTimeUtc,
}

/// Cab references are weak, so no relations are declared.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
