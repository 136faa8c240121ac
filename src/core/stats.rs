//! Aggregation engine - pure reductions of trip and expense sets.
//!
//! Neither function touches the store or fails: an empty input yields zeroed
//! statistics. Profit is derived by the caller (see
//! [`crate::core::report::FinancialSummary`]) so the two reductions stay
//! independent.

use crate::entities::{ExpenseCategory, ExpenseModel, TripModel, TripStatus};
use serde::Serialize;
use std::collections::BTreeMap;

/// Reduction of a set of trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStatistics {
    /// Every trip in the set, whatever its status
    pub total_trips: usize,
    /// Sum of fares of completed trips
    pub total_earnings: f64,
    /// Sum of distances of completed trips
    pub total_distance: f64,
    /// `total_earnings / completed_trips`, 0 without completed trips
    pub average_fare: f64,
    /// Trips in `completed`
    pub completed_trips: usize,
    /// Trips in `cancelled`
    pub cancelled_trips: usize,
    /// Trips in any other status
    pub pending_trips: usize,
}

/// Reduction of a set of expenses.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseStatistics {
    /// Sum of every amount
    pub total_expenses: f64,
    /// Sum of `fuel` amounts
    pub total_fuel: f64,
    /// Sum of `maintenance` amounts
    pub total_maintenance: f64,
    /// Sum of `insurance` amounts
    pub total_insurance: f64,
    /// Sum of amounts in any other category
    pub total_other: f64,
    /// `total_expenses / expense_count`, 0 for an empty set
    pub average_expense: f64,
    /// Number of expenses in the set
    pub expense_count: usize,
    /// Total per literal category string
    pub category_breakdown: BTreeMap<String, f64>,
}

/// Reduces `trips` into [`TripStatistics`].
///
/// Only completed trips contribute earnings and distance; a completed trip
/// without a recorded fare or distance counts as 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_trip_statistics(trips: &[TripModel]) -> TripStatistics {
    let mut stats = TripStatistics {
        total_trips: trips.len(),
        ..TripStatistics::default()
    };

    for trip in trips {
        match trip.status {
            TripStatus::Completed => {
                stats.completed_trips += 1;
                stats.total_earnings += trip.fare.unwrap_or(0.0);
                stats.total_distance += trip.distance.unwrap_or(0.0);
            }
            TripStatus::Cancelled => stats.cancelled_trips += 1,
            TripStatus::Active => stats.pending_trips += 1,
        }
    }

    if stats.completed_trips > 0 {
        stats.average_fare = stats.total_earnings / stats.completed_trips as f64;
    }
    stats
}

/// Reduces `expenses` into [`ExpenseStatistics`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_expense_statistics(expenses: &[ExpenseModel]) -> ExpenseStatistics {
    let mut stats = ExpenseStatistics {
        expense_count: expenses.len(),
        ..ExpenseStatistics::default()
    };

    for expense in expenses {
        stats.total_expenses += expense.amount;
        match ExpenseCategory::bucket(&expense.category) {
            ExpenseCategory::Fuel => stats.total_fuel += expense.amount,
            ExpenseCategory::Maintenance => stats.total_maintenance += expense.amount,
            ExpenseCategory::Insurance => stats.total_insurance += expense.amount,
            ExpenseCategory::Other => stats.total_other += expense.amount,
        }
        *stats
            .category_breakdown
            .entry(expense.category.clone())
            .or_insert(0.0) += expense.amount;
    }

    if stats.expense_count > 0 {
        stats.average_expense = stats.total_expenses / stats.expense_count as f64;
    }
    stats
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::{expense_model, trip_model};

    const EPSILON: f64 = 1e-6;

    #[test]
    fn test_trip_statistics_partition_by_status() {
        let trips = vec![
            trip_model(1, TripStatus::Completed, Some(50.0), Some(10.0)),
            trip_model(2, TripStatus::Completed, Some(70.25), Some(12.5)),
            trip_model(3, TripStatus::Cancelled, Some(99.0), Some(40.0)),
            trip_model(4, TripStatus::Active, Some(30.0), None),
            trip_model(5, TripStatus::Completed, Some(0.1), None),
        ];

        let stats = compute_trip_statistics(&trips);
        assert_eq!(stats.total_trips, 5);
        assert_eq!(stats.completed_trips, 3);
        assert_eq!(stats.cancelled_trips, 1);
        assert_eq!(stats.pending_trips, 1);
        assert!((stats.total_earnings - 120.35).abs() < EPSILON);
        assert!((stats.total_distance - 22.5).abs() < EPSILON);
        assert!((stats.average_fare - 120.35 / 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_trip_earnings_match_fare_sum() {
        let fares = [12.3, 45.6, 7.89, 1000.0, 0.01, 33.333];
        let trips: Vec<_> = fares
            .iter()
            .enumerate()
            .map(|(i, fare)| trip_model(i as i64, TripStatus::Completed, Some(*fare), None))
            .collect();

        let stats = compute_trip_statistics(&trips);
        let sum: f64 = fares.iter().sum();
        assert!((stats.total_earnings - sum).abs() < EPSILON);
        assert!((stats.average_fare - sum / fares.len() as f64).abs() < EPSILON);
    }

    #[test]
    fn test_empty_trip_set_is_zeroed() {
        let stats = compute_trip_statistics(&[]);
        assert_eq!(stats, TripStatistics::default());
        assert_eq!(stats.average_fare, 0.0);
        assert_eq!(stats.total_trips, 0);
    }

    #[test]
    fn test_expense_statistics_by_category() {
        let expenses = vec![
            expense_model(1, "fuel", 100.0),
            expense_model(2, "maintenance", 50.0),
            expense_model(3, "insurance", 30.0),
            expense_model(4, "rideshare", 20.0),
        ];

        let stats = compute_expense_statistics(&expenses);
        assert_eq!(stats.total_fuel, 100.0);
        assert_eq!(stats.total_maintenance, 50.0);
        assert_eq!(stats.total_insurance, 30.0);
        assert_eq!(stats.total_other, 20.0);
        assert_eq!(stats.total_expenses, 200.0);
        assert_eq!(stats.expense_count, 4);
        assert_eq!(stats.average_expense, 50.0);

        let expected: BTreeMap<String, f64> = [
            ("fuel", 100.0),
            ("maintenance", 50.0),
            ("insurance", 30.0),
            ("rideshare", 20.0),
        ]
        .into_iter()
        .map(|(category, total)| (category.to_string(), total))
        .collect();
        assert_eq!(stats.category_breakdown, expected);
    }

    #[test]
    fn test_breakdown_accumulates_repeated_categories() {
        let expenses = vec![
            expense_model(1, "fuel", 40.0),
            expense_model(2, "fuel", 60.0),
            expense_model(3, "other", 5.0),
        ];

        let stats = compute_expense_statistics(&expenses);
        assert_eq!(stats.category_breakdown.get("fuel"), Some(&100.0));
        assert_eq!(stats.total_other, 5.0);
        assert_eq!(stats.category_breakdown.len(), 2);
    }

    #[test]
    fn test_empty_expense_set_is_zeroed() {
        let stats = compute_expense_statistics(&[]);
        assert_eq!(stats, ExpenseStatistics::default());
        assert_eq!(stats.average_expense, 0.0);
    }

    #[test]
    fn test_statistics_serialize_camel_case() {
        let stats = compute_trip_statistics(&[]);
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("averageFare").is_some());
        assert!(json.get("pendingTrips").is_some());
    }
}
