//! Document store adapter.
//!
//! The fleet collections live in a `SeaORM` database. `SQLite` has no change
//! notifications of its own, so every committed write is announced on a
//! broadcast change feed; the live view coordinator listens to that feed and
//! re-reads full snapshots from the database.

use crate::config::{FleetConfig, database};
use crate::entities::{Collection, cab, expense, trip};
use crate::errors::Result;
use sea_orm::{QueryOrder, Value, prelude::*};
use std::fmt;
use tokio::sync::broadcast;
use tracing::{info, trace};

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A record was created
    Added,
    /// A record was updated in place
    Modified,
    /// A record was deleted
    Removed,
}

/// One committed write, as announced on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Collection that was written
    pub collection: Collection,
    /// Id of the record that changed
    pub id: i64,
    /// Kind of write
    pub kind: ChangeKind,
}

/// Database connection plus the change feed announcing writes to it.
pub struct FleetStore {
    db: DatabaseConnection,
    changes: broadcast::Sender<ChangeEvent>,
}

impl fmt::Debug for FleetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetStore")
            .field("feed_receivers", &self.changes.receiver_count())
            .finish_non_exhaustive()
    }
}

impl FleetStore {
    /// Wraps an existing connection. The tables must already exist.
    #[must_use]
    pub fn new(db: DatabaseConnection, feed_capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(feed_capacity.max(1));
        Self { db, changes }
    }

    /// Connects to the configured database and ensures the fleet tables exist.
    pub async fn connect(config: &FleetConfig) -> Result<Self> {
        let url = database::get_database_url(config);
        let db = database::create_connection(&url).await?;
        database::create_tables(&db).await?;
        info!("Fleet store ready");
        Ok(Self::new(db, config.change_feed_capacity))
    }

    /// The underlying database connection.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Starts receiving change events for writes committed from now on.
    #[must_use]
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    /// Announces a committed write.
    pub(crate) fn publish(&self, collection: Collection, id: i64, kind: ChangeKind) {
        let event = ChangeEvent {
            collection,
            id,
            kind,
        };
        match self.changes.send(event) {
            Ok(receivers) => trace!(?event, receivers, "Change published"),
            Err(_) => trace!(?event, "Change published with no live listeners"),
        }
    }
}

/// A collection entity the fleet layer can snapshot and range-query.
pub trait FleetRecord: EntityTrait {
    /// Which collection this entity is stored in
    const COLLECTION: Collection;

    /// Column snapshots are ordered by, newest first.
    fn snapshot_order() -> Self::Column;

    /// Primary key column, used to break ordering ties.
    fn id_column() -> Self::Column;

    /// Id of a loaded record.
    fn record_id(model: &Self::Model) -> i64;
}

impl FleetRecord for cab::Entity {
    const COLLECTION: Collection = Collection::Cabs;

    fn snapshot_order() -> Self::Column {
        cab::Column::CreatedAt
    }

    fn id_column() -> Self::Column {
        cab::Column::Id
    }

    fn record_id(model: &Self::Model) -> i64 {
        model.id
    }
}

impl FleetRecord for trip::Entity {
    const COLLECTION: Collection = Collection::Trips;

    fn snapshot_order() -> Self::Column {
        trip::Column::CreatedAt
    }

    fn id_column() -> Self::Column {
        trip::Column::Id
    }

    fn record_id(model: &Self::Model) -> i64 {
        model.id
    }
}

impl FleetRecord for expense::Entity {
    const COLLECTION: Collection = Collection::Expenses;

    fn snapshot_order() -> Self::Column {
        expense::Column::Date
    }

    fn id_column() -> Self::Column {
        expense::Column::Id
    }

    fn record_id(model: &Self::Model) -> i64 {
        model.id
    }
}

/// Loads every record of a collection in snapshot order.
pub async fn load_snapshot<E>(db: &DatabaseConnection) -> Result<Vec<E::Model>>
where
    E: FleetRecord,
{
    E::find()
        .order_by_desc(E::snapshot_order())
        .order_by_desc(E::id_column())
        .all(db)
        .await
        .map_err(Into::into)
}

/// Returns the records whose `field` lies in `[start, end]` and which match
/// every `(column, value)` equality filter, ordered by `field` descending.
pub async fn query_by_range<E, V>(
    db: &DatabaseConnection,
    field: E::Column,
    start: V,
    end: V,
    equals: &[(E::Column, Value)],
) -> Result<Vec<E::Model>>
where
    E: FleetRecord,
    V: Into<Value>,
{
    let mut query = E::find().filter(field.between(start, end));
    for (column, value) in equals {
        query = query.filter(column.eq(value.clone()));
    }
    query
        .order_by_desc(field)
        .order_by_desc(E::id_column())
        .all(db)
        .await
        .map_err(Into::into)
}
