//! Report generation business logic.
//!
//! Composes the aggregation engine's trip and expense statistics into the
//! fleet report and the dashboard summary. All functions return structured
//! data; formatting is left to the presentation layer.

use crate::core::stats::{ExpenseStatistics, TripStatistics, compute_trip_statistics};
use crate::errors::{Error, Result};
use crate::fleet::Fleet;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Look-back period of a fleet report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportRange {
    /// The last 7 days
    #[default]
    #[serde(rename = "7d")]
    Last7Days,
    /// The last 30 days
    #[serde(rename = "30d")]
    Last30Days,
    /// The last 90 days
    #[serde(rename = "90d")]
    Last90Days,
}

impl ReportRange {
    /// Length of the range in days.
    #[must_use]
    pub const fn days(self) -> i64 {
        match self {
            Self::Last7Days => 7,
            Self::Last30Days => 30,
            Self::Last90Days => 90,
        }
    }

    /// `[now - days, now]`
    #[must_use]
    pub fn window(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - Duration::days(self.days()), now)
    }

    /// Short form used in configuration and query strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
            Self::Last90Days => "90d",
        }
    }
}

impl fmt::Display for ReportRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "7d" => Ok(Self::Last7Days),
            "30d" => Ok(Self::Last30Days),
            "90d" => Ok(Self::Last90Days),
            other => Err(Error::validation(format!(
                "Unknown report range '{other}', expected 7d, 30d or 90d"
            ))),
        }
    }
}

/// The UTC day containing `now`, as `[midnight, next midnight)`.
#[must_use]
pub fn day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// Figures derived from one trip and one expense reduction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    /// Earnings minus expenses
    pub net_profit: f64,
    /// Percentage of trips that completed, 0 without trips
    pub completion_rate: f64,
    /// Net profit as a percentage of earnings, 0 without earnings
    pub profit_margin: f64,
    /// Earnings divided by all trips, 0 without trips
    pub earnings_per_trip: f64,
}

impl FinancialSummary {
    /// Combines the two reductions. Every ratio is 0 when its denominator is.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compose(trips: &TripStatistics, expenses: &ExpenseStatistics) -> Self {
        let net_profit = trips.total_earnings - expenses.total_expenses;
        let (completion_rate, earnings_per_trip) = if trips.total_trips > 0 {
            let total = trips.total_trips as f64;
            (
                trips.completed_trips as f64 / total * 100.0,
                trips.total_earnings / total,
            )
        } else {
            (0.0, 0.0)
        };
        let profit_margin = if trips.total_earnings > 0.0 {
            net_profit / trips.total_earnings * 100.0
        } else {
            0.0
        };

        Self {
            net_profit,
            completion_rate,
            profit_margin,
            earnings_per_trip,
        }
    }
}

/// Trip and expense statistics over a report range, plus the derived figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetReport {
    /// Range the report covers
    pub range: ReportRange,
    /// Start of the window
    pub start: DateTime<Utc>,
    /// End of the window
    pub end: DateTime<Utc>,
    /// Cab the report is restricted to, if any
    pub cab_id: Option<i64>,
    /// Reduction of the trips created in the window
    pub trips: TripStatistics,
    /// Reduction of the expenses in the window
    pub expenses: ExpenseStatistics,
    /// Figures derived from both
    pub summary: FinancialSummary,
}

/// Generates the fleet report for `range` ending at `now`.
///
/// # Arguments
/// * `fleet` - Fleet handle
/// * `range` - Look-back period; the configured default when `None`
/// * `now` - End of the window
/// * `cab_id` - Restrict both reductions to one cab
pub async fn generate_fleet_report(
    fleet: &Fleet,
    range: Option<ReportRange>,
    now: DateTime<Utc>,
    cab_id: Option<i64>,
) -> Result<FleetReport> {
    let range = range.unwrap_or(fleet.config().default_report_range);
    let (start, end) = range.window(now);
    debug!(%range, ?cab_id, "Generating fleet report");

    let trips = fleet.trips().trip_statistics(start, end, cab_id).await?;
    let expenses = fleet
        .expenses()
        .expense_statistics(start, end, cab_id)
        .await?;
    let summary = FinancialSummary::compose(&trips, &expenses);

    Ok(FleetReport {
        range,
        start,
        end,
        cab_id,
        trips,
        expenses,
        summary,
    })
}

/// Headline figures of the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    /// Every cab in the fleet
    pub total_cabs: usize,
    /// Cabs with status `active`
    pub active_cabs: usize,
    /// Trips created today, whatever their status
    pub today_trips: usize,
    /// Fares of today's trips that have completed
    pub today_earnings: f64,
    /// Expenses of today on the configured date basis
    pub today_expenses: f64,
    /// `today_earnings - today_expenses`
    pub net_profit: f64,
}

/// Computes the dashboard summary for the UTC day containing `now`.
pub async fn dashboard_summary(fleet: &Fleet, now: DateTime<Utc>) -> Result<DashboardSummary> {
    let total_cabs = fleet.cabs().get_all().await?.len();
    let active_cabs = fleet.cabs().active_cabs().await?.len();

    let today = fleet.trips().today_trips(now).await?;
    let today_earnings = compute_trip_statistics(&today).total_earnings;

    let (start, next_day) = day_window(now);
    let end_of_day = next_day - Duration::microseconds(1);
    let today_expenses = fleet
        .expenses()
        .expense_statistics(start, end_of_day, None)
        .await?
        .total_expenses;

    Ok(DashboardSummary {
        total_cabs,
        active_cabs,
        today_trips: today.len(),
        today_earnings,
        today_expenses,
        net_profit: today_earnings - today_expenses,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::cab::CabPatch;
    use crate::core::trip::TripCompletion;
    use crate::entities::CabStatus;
    use crate::test_utils::*;
    use chrono::TimeZone;

    #[test]
    fn test_report_range_parsing() {
        assert_eq!("7d".parse::<ReportRange>().unwrap(), ReportRange::Last7Days);
        assert_eq!(" 90d ".parse::<ReportRange>().unwrap(), ReportRange::Last90Days);
        assert!("1y".parse::<ReportRange>().is_err());
        assert_eq!(ReportRange::default(), ReportRange::Last7Days);
        assert_eq!(ReportRange::Last30Days.to_string(), "30d");
    }

    #[test]
    fn test_report_window() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 10, 0, 0).unwrap();
        let (start, end) = ReportRange::Last30Days.window(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(end, now);
    }

    #[test]
    fn test_day_window() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap();
        let (start, end) = day_window(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_financial_summary() {
        let trips = TripStatistics {
            total_trips: 4,
            total_earnings: 200.0,
            completed_trips: 3,
            ..TripStatistics::default()
        };
        let expenses = ExpenseStatistics {
            total_expenses: 50.0,
            ..ExpenseStatistics::default()
        };

        let summary = FinancialSummary::compose(&trips, &expenses);
        assert_eq!(summary.net_profit, 150.0);
        assert_eq!(summary.completion_rate, 75.0);
        assert_eq!(summary.profit_margin, 75.0);
        assert_eq!(summary.earnings_per_trip, 50.0);
    }

    #[test]
    fn test_financial_summary_without_trips() {
        let expenses = ExpenseStatistics {
            total_expenses: 80.0,
            ..ExpenseStatistics::default()
        };
        let summary = FinancialSummary::compose(&TripStatistics::default(), &expenses);
        assert_eq!(summary.net_profit, -80.0);
        assert_eq!(summary.completion_rate, 0.0);
        assert_eq!(summary.profit_margin, 0.0);
        assert_eq!(summary.earnings_per_trip, 0.0);
    }

    #[tokio::test]
    async fn test_generate_fleet_report() -> Result<()> {
        let fleet = setup_test_fleet().await?;
        let cab = create_test_cab(&fleet, "KA-20-0001").await?;
        let done = create_test_trip(&fleet, cab.id, 120.0).await?;
        create_test_trip(&fleet, cab.id, 30.0).await?;
        fleet
            .trips()
            .complete_trip(done.id, TripCompletion::default())
            .await?;

        let now = Utc::now();
        let today = now.date_naive().format("%Y-%m-%d").to_string();
        create_test_expense(&fleet, &today, "fuel", 20.0).await?;

        let report = generate_fleet_report(&fleet, None, now, None).await?;
        assert_eq!(report.range, ReportRange::Last7Days);
        assert_eq!(report.trips.total_trips, 2);
        assert_eq!(report.trips.total_earnings, 120.0);
        assert_eq!(report.expenses.total_fuel, 20.0);
        assert_eq!(report.summary.net_profit, 100.0);
        assert_eq!(report.summary.completion_rate, 50.0);

        let other_cab = generate_fleet_report(&fleet, Some(ReportRange::Last90Days), now, Some(999))
            .await?;
        assert_eq!(other_cab.trips.total_trips, 0);
        assert_eq!(other_cab.summary, FinancialSummary::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_dashboard_summary() -> Result<()> {
        let fleet = setup_test_fleet().await?;
        let first = create_test_cab(&fleet, "KA-21-0001").await?;
        let second = create_test_cab(&fleet, "KA-21-0002").await?;
        fleet
            .cabs()
            .update(
                second.id,
                CabPatch {
                    status: Some(CabStatus::Maintenance),
                    ..CabPatch::default()
                },
            )
            .await?;

        let trip = create_test_trip(&fleet, first.id, 80.0).await?;
        create_test_trip(&fleet, first.id, 15.0).await?;
        fleet
            .trips()
            .complete_trip(trip.id, TripCompletion::with_fare(90.0))
            .await?;

        let now = Utc::now();
        let today = now.date_naive().format("%Y-%m-%d").to_string();
        create_test_expense(&fleet, &today, "fuel", 25.0).await?;
        create_test_expense(&fleet, "2001-01-01", "fuel", 500.0).await?;

        let summary = dashboard_summary(&fleet, now).await?;
        assert_eq!(summary.total_cabs, 2);
        assert_eq!(summary.active_cabs, 1);
        assert_eq!(summary.today_trips, 2);
        assert_eq!(summary.today_earnings, 90.0);
        assert_eq!(summary.today_expenses, 25.0);
        assert_eq!(summary.net_profit, 65.0);
        Ok(())
    }
}
