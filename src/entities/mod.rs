//! Entity module - SeaORM entity definitions for the three fleet collections.
//! Each entity has a Model struct for data and an Entity struct for operations.
//! Cross-collection ids (`cab_id`) are plain columns with no foreign keys, so
//! deleting a cab never cascades into trips or expenses.

pub mod cab;
pub mod expense;
pub mod trip;

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export specific types to avoid conflicts
pub use cab::{
    CabStatus, Column as CabColumn, Coordinate, Entity as Cab, Model as CabModel,
};
pub use expense::{
    Column as ExpenseColumn, Entity as Expense, ExpenseCategory, Model as ExpenseModel,
};
pub use trip::{
    Column as TripColumn, Entity as Trip, Model as TripModel, PaymentStatus, TripStatus,
};

/// The collections owned by the fleet layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// `cabs`
    Cabs,
    /// `trips`
    Trips,
    /// `expenses`
    Expenses,
}

impl Collection {
    /// Collection (table) name in the document store.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cabs => "cabs",
            Self::Trips => "trips",
            Self::Expenses => "expenses",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
