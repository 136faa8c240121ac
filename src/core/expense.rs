//! Expense business logic - the Expense Repository.
//!
//! Expense date-range queries run on the field chosen by
//! [`ExpenseDateBasis`]: the calendar `date` the cost was incurred, or the
//! `created_at` moment it was recorded. The same basis is used by every range
//! query, statistic and range subscription in this module.

use crate::config::ExpenseDateBasis;
use crate::core::document::{
    clearable, lenient, non_negative, optional_non_negative, optional_text, parse_document, required_text,
};
use crate::core::live::{LiveViews, ObserverHandle, Snapshot};
use crate::core::stats::{ExpenseStatistics, compute_expense_statistics};
use crate::entities::{Collection, Expense, ExpenseCategory, ExpenseModel, expense};
use crate::errors::{Error, Result};
use crate::store::{ChangeKind, FleetStore, load_snapshot, query_by_range};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{Set, prelude::*};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

/// Fields a caller may supply when recording an expense.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    /// What the money was spent on, required
    pub description: Option<String>,
    /// Category, required; stored trimmed and lowercased
    pub category: Option<String>,
    /// Amount spent, required
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Option<f64>,
    /// Day the cost was incurred (`YYYY-MM-DD`), required
    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<NaiveDate>,
    /// Cab the cost belongs to
    #[serde(default, deserialize_with = "lenient")]
    pub cab_id: Option<i64>,
    /// Receipt or invoice number
    pub receipt_number: Option<String>,
    /// Free text
    pub notes: Option<String>,
}

impl NewExpense {
    /// Parses a submitted expense form. Server-maintained keys are ignored.
    pub fn from_document(document: Value) -> Result<Self> {
        parse_document("expense", document, &[])
    }
}

/// A partial edit of an expense. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpensePatch {
    /// New description
    pub description: Option<String>,
    /// New category; trimmed and lowercased
    pub category: Option<String>,
    /// New amount
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Option<f64>,
    /// New calendar day
    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<NaiveDate>,
    /// Attributes the expense to a cab; `Some(None)` (a blank value) detaches it
    #[serde(default, deserialize_with = "clearable")]
    pub cab_id: Option<Option<i64>>,
    /// A blank string clears the receipt number
    pub receipt_number: Option<String>,
    /// A blank string clears the notes
    pub notes: Option<String>,
}

const EXPENSE_PROTECTED_FIELDS: &[&str] = &["id", "createdAt", "updatedAt"];

impl ExpensePatch {
    /// Parses a submitted expense edit, rejecting server-maintained and unknown keys.
    pub fn from_document(document: Value) -> Result<Self> {
        parse_document("expense", document, EXPENSE_PROTECTED_FIELDS)
    }
}

fn normalize_category(category: Option<String>) -> Result<String> {
    required_text(category, "category").map(|category| category.to_lowercase())
}

/// CRUD, queries and live subscriptions over the `expenses` collection.
#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    store: Arc<FleetStore>,
    live: Arc<LiveViews>,
    basis: ExpenseDateBasis,
}

impl ExpenseRepository {
    pub(crate) const fn new(
        store: Arc<FleetStore>,
        live: Arc<LiveViews>,
        basis: ExpenseDateBasis,
    ) -> Self {
        Self { store, live, basis }
    }

    fn db(&self) -> &DatabaseConnection {
        self.store.db()
    }

    /// Field driving date-range queries.
    #[must_use]
    pub const fn date_basis(&self) -> ExpenseDateBasis {
        self.basis
    }

    /// Records an expense and returns its id.
    #[instrument(skip(self, new_expense))]
    pub async fn create(&self, new_expense: NewExpense) -> Result<i64> {
        let description = required_text(new_expense.description, "description")?;
        let category = normalize_category(new_expense.category)?;
        let amount = new_expense
            .amount
            .ok_or_else(|| Error::validation("amount is required"))
            .and_then(|amount| non_negative(amount, "amount"))?;
        let date = new_expense
            .date
            .ok_or_else(|| Error::validation("date is required"))?;

        let now = Utc::now();
        let expense = expense::ActiveModel {
            description: Set(description),
            category: Set(category),
            amount: Set(amount),
            date: Set(date),
            cab_id: Set(new_expense.cab_id),
            receipt_number: Set(optional_text(new_expense.receipt_number)),
            notes: Set(optional_text(new_expense.notes)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let expense = expense.insert(self.db()).await?;
        self.store
            .publish(Collection::Expenses, expense.id, ChangeKind::Added);
        info!(
            expense_id = expense.id,
            category = %expense.category,
            amount,
            "Expense recorded"
        );
        Ok(expense.id)
    }

    /// Applies `patch` to expense `id` and returns the stored result.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: i64, patch: ExpensePatch) -> Result<ExpenseModel> {
        let description = patch
            .description
            .map(|value| required_text(Some(value), "description"))
            .transpose()?;
        let category = patch
            .category
            .map(|value| normalize_category(Some(value)))
            .transpose()?;
        let amount = optional_non_negative(patch.amount, "amount")?;

        let existing = self.find_required(id).await?;
        let mut expense: expense::ActiveModel = existing.into();
        if let Some(description) = description {
            expense.description = Set(description);
        }
        if let Some(category) = category {
            expense.category = Set(category);
        }
        if let Some(amount) = amount {
            expense.amount = Set(amount);
        }
        if let Some(date) = patch.date {
            expense.date = Set(date);
        }
        if let Some(cab_id) = patch.cab_id {
            expense.cab_id = Set(cab_id);
        }
        if let Some(receipt_number) = patch.receipt_number {
            expense.receipt_number = Set(optional_text(Some(receipt_number)));
        }
        if let Some(notes) = patch.notes {
            expense.notes = Set(optional_text(Some(notes)));
        }
        expense.updated_at = Set(Utc::now());

        let expense = expense.update(self.db()).await?;
        self.store
            .publish(Collection::Expenses, id, ChangeKind::Modified);
        info!(expense_id = id, "Expense updated");
        Ok(expense)
    }

    /// Removes expense `id`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = Expense::delete_by_id(id).exec(self.db()).await?;
        if result.rows_affected == 0 {
            return Err(Error::NotFound {
                collection: Collection::Expenses,
                id,
            });
        }
        self.store
            .publish(Collection::Expenses, id, ChangeKind::Removed);
        info!(expense_id = id, "Expense removed");
        Ok(())
    }

    /// Every expense, most recent `date` first.
    pub async fn get_all(&self) -> Result<Vec<ExpenseModel>> {
        load_snapshot::<Expense>(self.db()).await
    }

    /// Expense `id`, or `None` if it does not exist.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<ExpenseModel>> {
        Expense::find_by_id(id).one(self.db()).await.map_err(Into::into)
    }

    async fn find_required(&self, id: i64) -> Result<ExpenseModel> {
        self.get_by_id(id).await?.ok_or(Error::NotFound {
            collection: Collection::Expenses,
            id,
        })
    }

    /// Expenses whose `field` lies in `[start, end]` and that match every equality filter.
    pub async fn query_by_range<V: Into<sea_orm::Value>>(
        &self,
        field: expense::Column,
        start: V,
        end: V,
        equals: &[(expense::Column, sea_orm::Value)],
    ) -> Result<Vec<ExpenseModel>> {
        query_by_range::<Expense, V>(self.db(), field, start, end, equals).await
    }

    async fn in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        mut equals: Vec<(expense::Column, sea_orm::Value)>,
        cab_id: Option<i64>,
    ) -> Result<Vec<ExpenseModel>> {
        if let Some(cab_id) = cab_id {
            equals.push((expense::Column::CabId, cab_id.into()));
        }
        match self.basis {
            ExpenseDateBasis::Date => {
                self.query_by_range(
                    expense::Column::Date,
                    start.date_naive(),
                    end.date_naive(),
                    &equals,
                )
                .await
            }
            ExpenseDateBasis::CreatedAt => {
                self.query_by_range(expense::Column::CreatedAt, start, end, &equals)
                    .await
            }
        }
    }

    /// Expenses inside `[start, end]` on the configured date basis,
    /// optionally for one cab.
    ///
    /// With the `date` basis only the calendar days of `start` and `end`
    /// matter.
    pub async fn expenses_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cab_id: Option<i64>,
    ) -> Result<Vec<ExpenseModel>> {
        self.in_range(start, end, Vec::new(), cab_id).await
    }

    /// Expenses of one category inside `[start, end]`.
    pub async fn expenses_by_category(
        &self,
        category: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cab_id: Option<i64>,
    ) -> Result<Vec<ExpenseModel>> {
        let category = category.trim().to_lowercase();
        self.in_range(
            start,
            end,
            vec![(expense::Column::Category, category.into())],
            cab_id,
        )
        .await
    }

    /// Fuel expenses inside `[start, end]`.
    pub async fn fuel_expenses(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cab_id: Option<i64>,
    ) -> Result<Vec<ExpenseModel>> {
        self.expenses_by_category(ExpenseCategory::Fuel.as_str(), start, end, cab_id)
            .await
    }

    /// Maintenance expenses inside `[start, end]`.
    pub async fn maintenance_expenses(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cab_id: Option<i64>,
    ) -> Result<Vec<ExpenseModel>> {
        self.expenses_by_category(ExpenseCategory::Maintenance.as_str(), start, end, cab_id)
            .await
    }

    /// Expense statistics over `[start, end]` on the configured date basis.
    pub async fn expense_statistics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cab_id: Option<i64>,
    ) -> Result<ExpenseStatistics> {
        let expenses = self.expenses_by_date_range(start, end, cab_id).await?;
        Ok(compute_expense_statistics(&expenses))
    }

    /// Delivers the full expense snapshot now and after every change.
    pub async fn subscribe<F>(&self, callback: F) -> Result<ObserverHandle>
    where
        F: FnMut(Snapshot<ExpenseModel>) + Send + 'static,
    {
        self.live.add_observer::<Expense, _>(callback).await
    }

    /// Like [`ExpenseRepository::subscribe`], restricted to expenses inside
    /// `[start, end]` on the configured date basis.
    pub async fn subscribe_in_range<F>(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        callback: F,
    ) -> Result<ObserverHandle>
    where
        F: FnMut(Snapshot<ExpenseModel>) + Send + 'static,
    {
        let basis = self.basis;
        let (first_day, last_day) = (start.date_naive(), end.date_naive());
        let keep = move |expense: &ExpenseModel| match basis {
            ExpenseDateBasis::Date => expense.date >= first_day && expense.date <= last_day,
            ExpenseDateBasis::CreatedAt => expense.created_at >= start && expense.created_at <= end,
        };
        self.live
            .add_filtered_observer::<Expense, _, _>(keep, callback)
            .await
    }
}
