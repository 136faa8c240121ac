//! Expense entity - an operating cost of the fleet.
//!
//! `date` is the calendar day the cost was incurred, which can differ from
//! `created_at`, the moment it was recorded. `category` is kept as the literal
//! string entered so reports can break down arbitrary categories.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The expense buckets reports total separately. Anything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpenseCategory {
    /// Fuel and charging
    Fuel,
    /// Repairs and servicing
    Maintenance,
    /// Insurance premiums
    Insurance,
    /// Everything else
    Other,
}

impl ExpenseCategory {
    /// Maps a stored category string onto its reporting bucket.
    #[must_use]
    pub fn bucket(category: &str) -> Self {
        match category {
            "fuel" => Self::Fuel,
            "maintenance" => Self::Maintenance,
            "insurance" => Self::Insurance,
            _ => Self::Other,
        }
    }

    /// Stored string form of the named buckets.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fuel => "fuel",
            Self::Maintenance => "maintenance",
            Self::Insurance => "insurance",
            Self::Other => "other",
        }
    }
}

/// Expense database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "expenses")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Store-assigned identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// What was paid for
    pub description: String,
    /// Lower-case category, e.g. `"fuel"`
    pub category: String,
    /// Amount paid
    pub amount: f64,
    /// Calendar day the cost was incurred
    pub date: Date,
    /// Cab the cost belongs to, if any (lookup only)
    pub cab_id: Option<i64>,
    /// Receipt or invoice number
    pub receipt_number: Option<String>,
    /// Free-form notes
    pub notes: Option<String>,
    /// When the expense was recorded
    pub created_at: DateTimeUtc,
    /// When the expense was last edited
    pub updated_at: DateTimeUtc,
}

/// Cab references are weak, so no relations are declared.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
