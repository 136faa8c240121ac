//! Cab business logic - the Cab Repository.
//!
//! Owns the `cabs` collection. Running totals (`total_earnings`,
//! `total_trips`) can only be moved by trip completion, and location pings go
//! through [`CabRepository::update_location`] instead of the full edit path.

use crate::core::document::{lenient, optional_text, parse_document, required_text};
use crate::core::live::{LiveViews, ObserverHandle, Snapshot};
use crate::entities::{Cab, CabModel, CabStatus, Collection, Coordinate, cab};
use crate::errors::{Error, Result};
use crate::store::{ChangeKind, FleetStore, load_snapshot, query_by_range};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{QueryOrder, Set, SqlErr, prelude::*};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Fields a caller may supply when adding a cab to the fleet.
///
/// Status, counters and location are not part of this type: a new cab always
/// starts active, with zero totals and no position.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCab {
    /// Licence plate, required and unique
    pub registration_number: Option<String>,
    /// Make and model, required
    #[serde(rename = "model")]
    pub vehicle_model: Option<String>,
    /// Driver name, required
    pub driver_name: Option<String>,
    /// Driver phone, required
    pub driver_phone: Option<String>,
    /// Model year, required, 1900..=2100
    #[serde(default, deserialize_with = "lenient")]
    pub year: Option<i32>,
    /// Paint colour
    pub color: Option<String>,
}

impl NewCab {
    /// Parses a submitted cab form. Server-maintained keys are ignored.
    pub fn from_document(document: Value) -> Result<Self> {
        parse_document("cab", document, &[])
    }
}

/// A partial edit of a cab. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CabPatch {
    /// New licence plate
    pub registration_number: Option<String>,
    /// New make and model
    #[serde(rename = "model")]
    pub vehicle_model: Option<String>,
    /// New driver name
    pub driver_name: Option<String>,
    /// New driver phone
    pub driver_phone: Option<String>,
    /// New model year
    #[serde(default, deserialize_with = "lenient")]
    pub year: Option<i32>,
    /// New colour; a blank string clears it
    pub color: Option<String>,
    /// New status. Any status may follow any other.
    pub status: Option<CabStatus>,
}

const CAB_PROTECTED_FIELDS: &[&str] = &[
    "id",
    "totalEarnings",
    "totalTrips",
    "currentLocation",
    "currentLatitude",
    "currentLongitude",
    "lastLocationUpdate",
    "createdAt",
    "updatedAt",
];

impl CabPatch {
    /// Parses a submitted cab edit, rejecting server-maintained and unknown keys.
    pub fn from_document(document: Value) -> Result<Self> {
        parse_document("cab", document, CAB_PROTECTED_FIELDS)
    }
}

fn validate_year(year: i32) -> Result<i32> {
    if (1900..=2100).contains(&year) {
        Ok(year)
    } else {
        Err(Error::validation(format!(
            "year must be between 1900 and 2100, got {year}"
        )))
    }
}

fn validate_coordinate(coordinate: Coordinate) -> Result<Coordinate> {
    let Coordinate { lat, lng } = coordinate;
    if !(lat.is_finite() && (-90.0..=90.0).contains(&lat)) {
        return Err(Error::validation(format!("latitude {lat} is out of range")));
    }
    if !(lng.is_finite() && (-180.0..=180.0).contains(&lng)) {
        return Err(Error::validation(format!("longitude {lng} is out of range")));
    }
    Ok(coordinate)
}

/// CRUD, queries and live subscriptions over the `cabs` collection.
#[derive(Debug, Clone)]
pub struct CabRepository {
    store: Arc<FleetStore>,
    live: Arc<LiveViews>,
}

impl CabRepository {
    pub(crate) const fn new(store: Arc<FleetStore>, live: Arc<LiveViews>) -> Self {
        Self { store, live }
    }

    fn db(&self) -> &DatabaseConnection {
        self.store.db()
    }

    /// Maps a unique-index violation on insert or update to the same error
    /// the pre-check reports.
    fn registration_conflict(err: DbErr, registration: &str) -> Error {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Error::validation(format!(
                "A cab with registration number {registration} already exists"
            )),
            _ => err.into(),
        }
    }

    async fn ensure_registration_free(&self, registration: &str, except: Option<i64>) -> Result<()> {
        let mut query = Cab::find().filter(cab::Column::RegistrationNumber.eq(registration));
        if let Some(id) = except {
            query = query.filter(cab::Column::Id.ne(id));
        }
        if query.one(self.db()).await?.is_some() {
            return Err(Error::validation(format!(
                "A cab with registration number {registration} already exists"
            )));
        }
        Ok(())
    }

    /// Adds a cab to the fleet and returns its id.
    ///
    /// The cab starts `active` with zero earnings, zero trips and no location.
    #[instrument(skip(self, new_cab))]
    pub async fn create(&self, new_cab: NewCab) -> Result<i64> {
        let registration = required_text(new_cab.registration_number, "registrationNumber")?;
        let vehicle_model = required_text(new_cab.vehicle_model, "model")?;
        let driver_name = required_text(new_cab.driver_name, "driverName")?;
        let driver_phone = required_text(new_cab.driver_phone, "driverPhone")?;
        let year = new_cab
            .year
            .ok_or_else(|| Error::validation("year is required"))
            .and_then(validate_year)?;

        self.ensure_registration_free(&registration, None).await?;

        let now = Utc::now();
        let cab = cab::ActiveModel {
            registration_number: Set(registration.clone()),
            vehicle_model: Set(vehicle_model),
            driver_name: Set(driver_name),
            driver_phone: Set(driver_phone),
            year: Set(year),
            color: Set(optional_text(new_cab.color)),
            status: Set(CabStatus::Active),
            total_earnings: Set(0.0),
            total_trips: Set(0),
            current_latitude: Set(None),
            current_longitude: Set(None),
            last_location_update: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let cab = cab
            .insert(self.db())
            .await
            .map_err(|err| Self::registration_conflict(err, &registration))?;
        self.store.publish(Collection::Cabs, cab.id, ChangeKind::Added);
        info!(cab_id = cab.id, registration = %cab.registration_number, "Cab added");
        Ok(cab.id)
    }

    /// Applies `patch` to cab `id` and returns the stored result.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: i64, patch: CabPatch) -> Result<CabModel> {
        let registration = patch
            .registration_number
            .map(|value| required_text(Some(value), "registrationNumber"))
            .transpose()?;
        let vehicle_model = patch
            .vehicle_model
            .map(|value| required_text(Some(value), "model"))
            .transpose()?;
        let driver_name = patch
            .driver_name
            .map(|value| required_text(Some(value), "driverName"))
            .transpose()?;
        let driver_phone = patch
            .driver_phone
            .map(|value| required_text(Some(value), "driverPhone"))
            .transpose()?;
        let year = patch.year.map(validate_year).transpose()?;

        let existing = self.find_required(id).await?;
        if let Some(registration) = &registration {
            if *registration != existing.registration_number {
                self.ensure_registration_free(registration, Some(id)).await?;
            }
        }

        let wanted = registration
            .clone()
            .unwrap_or_else(|| existing.registration_number.clone());
        let mut cab: cab::ActiveModel = existing.into();
        if let Some(registration) = registration {
            cab.registration_number = Set(registration);
        }
        if let Some(vehicle_model) = vehicle_model {
            cab.vehicle_model = Set(vehicle_model);
        }
        if let Some(driver_name) = driver_name {
            cab.driver_name = Set(driver_name);
        }
        if let Some(driver_phone) = driver_phone {
            cab.driver_phone = Set(driver_phone);
        }
        if let Some(year) = year {
            cab.year = Set(year);
        }
        if let Some(color) = patch.color {
            cab.color = Set(optional_text(Some(color)));
        }
        if let Some(status) = patch.status {
            cab.status = Set(status);
        }
        cab.updated_at = Set(Utc::now());

        let cab = cab
            .update(self.db())
            .await
            .map_err(|err| Self::registration_conflict(err, &wanted))?;
        self.store.publish(Collection::Cabs, id, ChangeKind::Modified);
        info!(cab_id = id, status = %cab.status, "Cab updated");
        Ok(cab)
    }

    /// Removes cab `id`. Trips and expenses referring to it are left untouched.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = Cab::delete_by_id(id).exec(self.db()).await?;
        if result.rows_affected == 0 {
            return Err(Error::NotFound {
                collection: Collection::Cabs,
                id,
            });
        }
        self.store.publish(Collection::Cabs, id, ChangeKind::Removed);
        info!(cab_id = id, "Cab removed");
        Ok(())
    }

    /// Every cab, newest first.
    pub async fn get_all(&self) -> Result<Vec<CabModel>> {
        load_snapshot::<Cab>(self.db()).await
    }

    /// Cab `id`, or `None` if it does not exist.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<CabModel>> {
        Cab::find_by_id(id).one(self.db()).await.map_err(Into::into)
    }

    async fn find_required(&self, id: i64) -> Result<CabModel> {
        self.get_by_id(id).await?.ok_or(Error::NotFound {
            collection: Collection::Cabs,
            id,
        })
    }

    /// Cabs currently on the road, newest first.
    pub async fn active_cabs(&self) -> Result<Vec<CabModel>> {
        Cab::find()
            .filter(cab::Column::Status.eq(CabStatus::Active))
            .order_by_desc(cab::Column::CreatedAt)
            .order_by_desc(cab::Column::Id)
            .all(self.db())
            .await
            .map_err(Into::into)
    }

    /// Cabs whose `field` lies in `[start, end]` and that match every equality filter.
    pub async fn query_by_range<V: Into<sea_orm::Value>>(
        &self,
        field: cab::Column,
        start: V,
        end: V,
        equals: &[(cab::Column, sea_orm::Value)],
    ) -> Result<Vec<CabModel>> {
        query_by_range::<Cab, V>(self.db(), field, start, end, equals).await
    }

    /// Records a location ping. Only the position and its timestamp change.
    #[instrument(skip(self))]
    pub async fn update_location(&self, id: i64, location: Coordinate) -> Result<()> {
        let Coordinate { lat, lng } = validate_coordinate(location)?;

        let result = Cab::update_many()
            .col_expr(cab::Column::CurrentLatitude, Expr::value(lat))
            .col_expr(cab::Column::CurrentLongitude, Expr::value(lng))
            .col_expr(cab::Column::LastLocationUpdate, Expr::value(Utc::now()))
            .filter(cab::Column::Id.eq(id))
            .exec(self.db())
            .await?;
        if result.rows_affected == 0 {
            return Err(Error::NotFound {
                collection: Collection::Cabs,
                id,
            });
        }

        self.store.publish(Collection::Cabs, id, ChangeKind::Modified);
        debug!(cab_id = id, lat, lng, "Cab location updated");
        Ok(())
    }

    /// Adds a completed fare to the cab's running totals in a single SQL
    /// statement: `total_earnings = total_earnings + fare`,
    /// `total_trips = total_trips + 1`.
    ///
    /// Returns `false` when the cab no longer exists.
    pub(crate) async fn record_completed_trip(&self, id: i64, fare: f64) -> Result<bool> {
        let result = Cab::update_many()
            .col_expr(
                cab::Column::TotalEarnings,
                Expr::col(cab::Column::TotalEarnings).add(fare),
            )
            .col_expr(
                cab::Column::TotalTrips,
                Expr::col(cab::Column::TotalTrips).add(1),
            )
            .filter(cab::Column::Id.eq(id))
            .exec(self.db())
            .await?;

        if result.rows_affected == 0 {
            debug!(cab_id = id, "Cab no longer exists, trip totals not recorded");
            return Ok(false);
        }
        self.store.publish(Collection::Cabs, id, ChangeKind::Modified);
        Ok(true)
    }

    /// Delivers the full cab snapshot now and after every change.
    pub async fn subscribe<F>(&self, callback: F) -> Result<ObserverHandle>
    where
        F: FnMut(Snapshot<CabModel>) + Send + 'static,
    {
        self.live.add_observer::<Cab, _>(callback).await
    }

    /// Delivers cab `id` whenever it changes, staying silent while it is absent.
    pub async fn subscribe_to_cab<F>(&self, id: i64, callback: F) -> Result<ObserverHandle>
    where
        F: FnMut(CabModel) + Send + 'static,
    {
        self.live.add_record_observer::<Cab, _>(id, callback).await
    }
}
