//! Trip business logic - the Trip Repository.
//!
//! Trips are created `active` and leave that state exactly once, either
//! through [`TripRepository::complete_trip`] or [`TripRepository::cancel_trip`].
//! Both transitions are conditional writes (`WHERE status = 'active'`), so two
//! racing completions cannot both succeed.
//!
//! Completing a trip also adds its fare to the cab's running totals. That is a
//! second write on another collection with no transaction around the pair: if
//! the cab is gone the increment is skipped, and if it fails the trip stays
//! completed and the failure is logged.

use crate::core::cab::CabRepository;
use crate::core::document::{
    lenient, non_negative, optional_non_negative, optional_text, parse_document, required_text,
};
use crate::core::live::{LiveViews, ObserverHandle, Snapshot};
use crate::core::report::day_window;
use crate::core::stats::{TripStatistics, compute_trip_statistics};
use crate::entities::{Collection, PaymentStatus, Trip, TripModel, TripStatus, trip};
use crate::errors::{Error, Result};
use crate::store::{ChangeKind, FleetStore, load_snapshot, query_by_range};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::NotSet, QueryOrder, Set, prelude::*};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Fields a caller may supply when starting a trip.
///
/// Status and payment status are not part of this type: every trip starts
/// `active` and `pending`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrip {
    /// Cab driving the trip, required
    #[serde(default, deserialize_with = "lenient")]
    pub cab_id: Option<i64>,
    /// Pickup address, required
    pub pickup_location: Option<String>,
    /// Drop-off address, required
    pub destination: Option<String>,
    /// Quoted fare, required
    #[serde(default, deserialize_with = "lenient")]
    pub fare: Option<f64>,
    /// Estimated distance
    #[serde(default, deserialize_with = "lenient")]
    pub distance: Option<f64>,
    /// Estimated duration
    #[serde(default, deserialize_with = "lenient")]
    pub duration: Option<f64>,
    /// Free text
    pub notes: Option<String>,
}

impl NewTrip {
    /// Parses a submitted trip form. Server-maintained keys are ignored.
    pub fn from_document(document: Value) -> Result<Self> {
        parse_document("trip", document, &[])
    }
}

/// A partial edit of a trip. Status changes go through
/// [`TripRepository::complete_trip`] and [`TripRepository::cancel_trip`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TripPatch {
    /// Reassigns the trip to another cab
    #[serde(default, deserialize_with = "lenient")]
    pub cab_id: Option<i64>,
    /// New pickup address
    pub pickup_location: Option<String>,
    /// New drop-off address
    pub destination: Option<String>,
    /// New fare
    #[serde(default, deserialize_with = "lenient")]
    pub fare: Option<f64>,
    /// New distance
    #[serde(default, deserialize_with = "lenient")]
    pub distance: Option<f64>,
    /// New duration
    #[serde(default, deserialize_with = "lenient")]
    pub duration: Option<f64>,
    /// Marks the fare as paid or pending
    pub payment_status: Option<PaymentStatus>,
    /// A blank string clears the notes
    pub notes: Option<String>,
}

const TRIP_PROTECTED_FIELDS: &[&str] = &["id", "status", "completedAt", "createdAt", "updatedAt"];

impl TripPatch {
    /// Parses a submitted trip edit, rejecting server-maintained and unknown keys.
    pub fn from_document(document: Value) -> Result<Self> {
        parse_document("trip", document, TRIP_PROTECTED_FIELDS)
    }
}

/// Final figures recorded when a trip completes. Any value left out keeps
/// the one already stored on the trip.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripCompletion {
    /// Final fare
    #[serde(default, deserialize_with = "lenient")]
    pub fare: Option<f64>,
    /// Distance driven
    #[serde(default, deserialize_with = "lenient")]
    pub distance: Option<f64>,
    /// Time taken
    #[serde(default, deserialize_with = "lenient")]
    pub duration: Option<f64>,
}

impl TripCompletion {
    /// Parses a submitted completion form.
    pub fn from_document(document: Value) -> Result<Self> {
        parse_document("trip completion", document, &[])
    }

    /// Completion that only overrides the fare.
    #[must_use]
    pub const fn with_fare(fare: f64) -> Self {
        Self {
            fare: Some(fare),
            distance: None,
            duration: None,
        }
    }
}

/// CRUD, lifecycle transitions, queries and live subscriptions over the
/// `trips` collection.
#[derive(Debug, Clone)]
pub struct TripRepository {
    store: Arc<FleetStore>,
    live: Arc<LiveViews>,
    cabs: CabRepository,
}

impl TripRepository {
    pub(crate) const fn new(
        store: Arc<FleetStore>,
        live: Arc<LiveViews>,
        cabs: CabRepository,
    ) -> Self {
        Self { store, live, cabs }
    }

    fn db(&self) -> &DatabaseConnection {
        self.store.db()
    }

    /// Starts a trip and returns its id. The cab id is not checked against
    /// the `cabs` collection.
    #[instrument(skip(self, new_trip))]
    pub async fn create(&self, new_trip: NewTrip) -> Result<i64> {
        let cab_id = new_trip
            .cab_id
            .ok_or_else(|| Error::validation("cabId is required"))?;
        let pickup_location = required_text(new_trip.pickup_location, "pickupLocation")?;
        let destination = required_text(new_trip.destination, "destination")?;
        let fare = new_trip
            .fare
            .ok_or_else(|| Error::validation("fare is required"))
            .and_then(|fare| non_negative(fare, "fare"))?;
        let distance = optional_non_negative(new_trip.distance, "distance")?;
        let duration = optional_non_negative(new_trip.duration, "duration")?;

        let now = Utc::now();
        let trip = trip::ActiveModel {
            cab_id: Set(cab_id),
            pickup_location: Set(pickup_location),
            destination: Set(destination),
            fare: Set(Some(fare)),
            distance: Set(distance),
            duration: Set(duration),
            status: Set(TripStatus::Active),
            payment_status: Set(PaymentStatus::Pending),
            notes: Set(optional_text(new_trip.notes)),
            created_at: Set(now),
            completed_at: Set(None),
            updated_at: Set(now),
            ..Default::default()
        };

        let trip = trip.insert(self.db()).await?;
        self.store.publish(Collection::Trips, trip.id, ChangeKind::Added);
        info!(trip_id = trip.id, cab_id, fare, "Trip started");
        Ok(trip.id)
    }

    /// Applies `patch` to trip `id` and returns the stored result.
    ///
    /// Once a trip is completed or cancelled its cab and final figures are
    /// fixed; only payment status, addresses and notes may still change.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: i64, patch: TripPatch) -> Result<TripModel> {
        let pickup_location = patch
            .pickup_location
            .map(|value| required_text(Some(value), "pickupLocation"))
            .transpose()?;
        let destination = patch
            .destination
            .map(|value| required_text(Some(value), "destination"))
            .transpose()?;
        let fare = optional_non_negative(patch.fare, "fare")?;
        let distance = optional_non_negative(patch.distance, "distance")?;
        let duration = optional_non_negative(patch.duration, "duration")?;

        let existing = self.find_required(id).await?;
        if existing.status.is_terminal() {
            let locked = [
                ("cabId", patch.cab_id.is_some()),
                ("fare", fare.is_some()),
                ("distance", distance.is_some()),
                ("duration", duration.is_some()),
            ];
            if let Some((field, _)) = locked.iter().find(|(_, set)| *set) {
                return Err(Error::validation(format!(
                    "{field} cannot be changed on a {} trip",
                    existing.status
                )));
            }
        }
        let mut trip: trip::ActiveModel = existing.into();
        if let Some(cab_id) = patch.cab_id {
            trip.cab_id = Set(cab_id);
        }
        if let Some(pickup_location) = pickup_location {
            trip.pickup_location = Set(pickup_location);
        }
        if let Some(destination) = destination {
            trip.destination = Set(destination);
        }
        if fare.is_some() {
            trip.fare = Set(fare);
        }
        if distance.is_some() {
            trip.distance = Set(distance);
        }
        if duration.is_some() {
            trip.duration = Set(duration);
        }
        if let Some(payment_status) = patch.payment_status {
            trip.payment_status = Set(payment_status);
        }
        if let Some(notes) = patch.notes {
            trip.notes = Set(optional_text(Some(notes)));
        }
        trip.updated_at = Set(Utc::now());

        let trip = trip.update(self.db()).await?;
        self.store.publish(Collection::Trips, id, ChangeKind::Modified);
        info!(trip_id = id, "Trip updated");
        Ok(trip)
    }

    /// Removes trip `id`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = Trip::delete_by_id(id).exec(self.db()).await?;
        if result.rows_affected == 0 {
            return Err(Error::NotFound {
                collection: Collection::Trips,
                id,
            });
        }
        self.store.publish(Collection::Trips, id, ChangeKind::Removed);
        info!(trip_id = id, "Trip removed");
        Ok(())
    }

    /// Every trip, newest first.
    pub async fn get_all(&self) -> Result<Vec<TripModel>> {
        load_snapshot::<Trip>(self.db()).await
    }

    /// Trip `id`, or `None` if it does not exist.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<TripModel>> {
        Trip::find_by_id(id).one(self.db()).await.map_err(Into::into)
    }

    async fn find_required(&self, id: i64) -> Result<TripModel> {
        self.get_by_id(id).await?.ok_or(Error::NotFound {
            collection: Collection::Trips,
            id,
        })
    }

    /// Trips whose `field` lies in `[start, end]` and that match every equality filter.
    pub async fn query_by_range<V: Into<sea_orm::Value>>(
        &self,
        field: trip::Column,
        start: V,
        end: V,
        equals: &[(trip::Column, sea_orm::Value)],
    ) -> Result<Vec<TripModel>> {
        query_by_range::<Trip, V>(self.db(), field, start, end, equals).await
    }

    /// Turns a failed conditional transition into the right error: the trip
    /// either vanished or is no longer active.
    async fn transition_rejected(&self, id: i64, to: TripStatus) -> Error {
        match self.get_by_id(id).await {
            Ok(Some(trip)) => Error::InvalidTransition {
                id,
                from: trip.status,
                to,
            },
            Ok(None) => Error::NotFound {
                collection: Collection::Trips,
                id,
            },
            Err(e) => e,
        }
    }

    /// Completes an active trip.
    ///
    /// Sets `completed_at`, applies the final figures and adds the fare to the
    /// cab's totals. The fare is the one in `completion`, or the quoted fare
    /// when none is given.
    #[instrument(skip(self))]
    pub async fn complete_trip(&self, id: i64, completion: TripCompletion) -> Result<TripModel> {
        let fare = optional_non_negative(completion.fare, "fare")?;
        let distance = optional_non_negative(completion.distance, "distance")?;
        let duration = optional_non_negative(completion.duration, "duration")?;

        let trip = self.find_required(id).await?;
        if !trip.status.can_transition_to(TripStatus::Completed) {
            return Err(Error::InvalidTransition {
                id,
                from: trip.status,
                to: TripStatus::Completed,
            });
        }
        let fare = fare
            .or(trip.fare)
            .ok_or_else(|| Error::validation("fare is required to complete a trip"))?;

        let now = Utc::now();
        let changes = trip::ActiveModel {
            status: Set(TripStatus::Completed),
            fare: Set(Some(fare)),
            distance: distance.map_or(NotSet, |distance| Set(Some(distance))),
            duration: duration.map_or(NotSet, |duration| Set(Some(duration))),
            completed_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };
        let result = Trip::update_many()
            .set(changes)
            .filter(trip::Column::Id.eq(id))
            .filter(trip::Column::Status.eq(TripStatus::Active))
            .exec(self.db())
            .await?;
        if result.rows_affected == 0 {
            return Err(self.transition_rejected(id, TripStatus::Completed).await);
        }
        self.store.publish(Collection::Trips, id, ChangeKind::Modified);
        info!(trip_id = id, cab_id = trip.cab_id, fare, "Trip completed");

        match self.cabs.record_completed_trip(trip.cab_id, fare).await {
            Ok(true) => debug!(cab_id = trip.cab_id, fare, "Cab totals updated"),
            Ok(false) => {}
            Err(e) => warn!(
                trip_id = id,
                cab_id = trip.cab_id,
                error = %e,
                "Trip completed but the cab totals could not be updated"
            ),
        }

        self.find_required(id).await
    }

    /// Cancels an active trip.
    #[instrument(skip(self))]
    pub async fn cancel_trip(&self, id: i64) -> Result<TripModel> {
        let trip = self.find_required(id).await?;
        if !trip.status.can_transition_to(TripStatus::Cancelled) {
            return Err(Error::InvalidTransition {
                id,
                from: trip.status,
                to: TripStatus::Cancelled,
            });
        }

        let changes = trip::ActiveModel {
            status: Set(TripStatus::Cancelled),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        let result = Trip::update_many()
            .set(changes)
            .filter(trip::Column::Id.eq(id))
            .filter(trip::Column::Status.eq(TripStatus::Active))
            .exec(self.db())
            .await?;
        if result.rows_affected == 0 {
            return Err(self.transition_rejected(id, TripStatus::Cancelled).await);
        }
        self.store.publish(Collection::Trips, id, ChangeKind::Modified);
        info!(trip_id = id, "Trip cancelled");

        self.find_required(id).await
    }

    /// Trips created within `[start, end]`, optionally for one cab, newest first.
    pub async fn trips_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cab_id: Option<i64>,
    ) -> Result<Vec<TripModel>> {
        let equals: Vec<(trip::Column, sea_orm::Value)> = cab_id
            .map(|cab_id| (trip::Column::CabId, cab_id.into()))
            .into_iter()
            .collect();
        self.query_by_range(trip::Column::CreatedAt, start, end, &equals)
            .await
    }

    /// Trips created during the UTC day containing `now`.
    pub async fn today_trips(&self, now: DateTime<Utc>) -> Result<Vec<TripModel>> {
        let (start, end) = day_window(now);
        Trip::find()
            .filter(trip::Column::CreatedAt.gte(start))
            .filter(trip::Column::CreatedAt.lt(end))
            .order_by_desc(trip::Column::CreatedAt)
            .order_by_desc(trip::Column::Id)
            .all(self.db())
            .await
            .map_err(Into::into)
    }

    /// Every trip of cab `cab_id`, newest first.
    pub async fn trips_by_cab(&self, cab_id: i64) -> Result<Vec<TripModel>> {
        Trip::find()
            .filter(trip::Column::CabId.eq(cab_id))
            .order_by_desc(trip::Column::CreatedAt)
            .order_by_desc(trip::Column::Id)
            .all(self.db())
            .await
            .map_err(Into::into)
    }

    /// Trip statistics over trips created within `[start, end]`.
    pub async fn trip_statistics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cab_id: Option<i64>,
    ) -> Result<TripStatistics> {
        let trips = self.trips_by_date_range(start, end, cab_id).await?;
        Ok(compute_trip_statistics(&trips))
    }

    /// Delivers the full trip snapshot now and after every change.
    pub async fn subscribe<F>(&self, callback: F) -> Result<ObserverHandle>
    where
        F: FnMut(Snapshot<TripModel>) + Send + 'static,
    {
        self.live.add_observer::<Trip, _>(callback).await
    }

    /// Like [`TripRepository::subscribe`], restricted to trips created in
    /// `[start, end)`.
    pub async fn subscribe_in_range<F>(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        callback: F,
    ) -> Result<ObserverHandle>
    where
        F: FnMut(Snapshot<TripModel>) + Send + 'static,
    {
        self.live
            .add_filtered_observer::<Trip, _, _>(
                move |trip: &TripModel| trip.created_at >= start && trip.created_at < end,
                callback,
            )
            .await
    }

    /// Live view of the trips created during the UTC day containing `now`.
    pub async fn subscribe_today<F>(&self, now: DateTime<Utc>, callback: F) -> Result<ObserverHandle>
    where
        F: FnMut(Snapshot<TripModel>) + Send + 'static,
    {
        let (start, end) = day_window(now);
        self.subscribe_in_range(start, end, callback).await
    }
}
