//! List filters for the management screens.
//!
//! Case-insensitive substring search over the fields each screen shows,
//! combined with an optional status or category filter. An empty search term
//! matches everything.

use crate::entities::{CabModel, CabStatus, ExpenseModel, TripModel, TripStatus};

fn matches_term(term: &str, fields: &[&str]) -> bool {
    if term.is_empty() {
        return true;
    }
    fields
        .iter()
        .any(|field| field.to_lowercase().contains(term))
}

fn normalize(search: &str) -> String {
    search.trim().to_lowercase()
}

/// Cabs whose registration number, driver name or model contains `search`.
#[must_use]
pub fn filter_cabs<'a>(
    cabs: &'a [CabModel],
    search: &str,
    status: Option<CabStatus>,
) -> Vec<&'a CabModel> {
    let term = normalize(search);
    cabs.iter()
        .filter(|cab| status.is_none_or(|status| cab.status == status))
        .filter(|cab| {
            matches_term(
                &term,
                &[&cab.registration_number, &cab.driver_name, &cab.vehicle_model],
            )
        })
        .collect()
}

/// Trips whose pickup, destination or cab id contains `search`.
#[must_use]
pub fn filter_trips<'a>(
    trips: &'a [TripModel],
    search: &str,
    status: Option<TripStatus>,
) -> Vec<&'a TripModel> {
    let term = normalize(search);
    trips
        .iter()
        .filter(|trip| status.is_none_or(|status| trip.status == status))
        .filter(|trip| {
            let cab_id = trip.cab_id.to_string();
            matches_term(&term, &[&trip.pickup_location, &trip.destination, &cab_id])
        })
        .collect()
}

/// Expenses whose description or category contains `search`.
#[must_use]
pub fn filter_expenses<'a>(
    expenses: &'a [ExpenseModel],
    search: &str,
    category: Option<&str>,
) -> Vec<&'a ExpenseModel> {
    let term = normalize(search);
    let category = category.map(normalize);
    expenses
        .iter()
        .filter(|expense| {
            category
                .as_deref()
                .is_none_or(|category| expense.category == category)
        })
        .filter(|expense| matches_term(&term, &[&expense.description, &expense.category]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{cab_model, expense_model, trip_model};

    #[test]
    fn test_filter_cabs() {
        let cabs = vec![
            cab_model(1, "KA-01-AB-1234", "Ravi Kumar", CabStatus::Active),
            cab_model(2, "MH-12-XY-9876", "Anita Rao", CabStatus::Maintenance),
        ];

        let found = filter_cabs(&cabs, "ravi", None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 1);

        assert_eq!(filter_cabs(&cabs, " mh-12 ", None)[0].id, 2);
        assert_eq!(filter_cabs(&cabs, "", None).len(), 2);
        assert!(filter_cabs(&cabs, "ravi", Some(CabStatus::Maintenance)).is_empty());
        assert_eq!(filter_cabs(&cabs, "", Some(CabStatus::Maintenance))[0].id, 2);
    }

    #[test]
    fn test_filter_trips() {
        let trips = vec![
            trip_model(1, TripStatus::Completed, Some(10.0), None),
            trip_model(2, TripStatus::Active, Some(10.0), None),
        ];

        assert_eq!(filter_trips(&trips, "AIRPORT", None).len(), 2);
        assert_eq!(filter_trips(&trips, "", Some(TripStatus::Active))[0].id, 2);
        assert!(filter_trips(&trips, "nowhere", None).is_empty());
    }

    #[test]
    fn test_filter_expenses() {
        let expenses = vec![
            expense_model(1, "fuel", 10.0),
            expense_model(2, "insurance", 300.0),
        ];

        assert_eq!(filter_expenses(&expenses, "INSUR", None)[0].id, 2);
        assert_eq!(filter_expenses(&expenses, "", Some("Fuel"))[0].id, 1);
        assert!(filter_expenses(&expenses, "insurance", Some("fuel")).is_empty());
    }
}
