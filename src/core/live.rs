//! Live view coordinator.
//!
//! Any number of observers may watch a collection, but each collection has at
//! most one store listener. The first observer starts it, the last one to
//! leave tears it down. The listener re-reads the full ordered snapshot on
//! every change event and publishes it on a `watch` channel; every observer
//! has its own delivery task reading that channel.
//!
//! A slow observer only ever sees the most recent snapshot when several
//! changes land while its callback is running. It never sees an older one.
//! Unsubscribing stops future deliveries immediately but lets a callback that
//! is already running finish.

use crate::entities::{Cab, Collection, Expense, Trip};
use crate::errors::Result;
use crate::store::{ChangeEvent, FleetRecord, FleetStore, load_snapshot};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// A fully materialized, ordered list of every record in a collection.
pub type Snapshot<M> = Arc<Vec<M>>;

/// Entities that can be observed through [`LiveViews`].
pub trait LiveRecord: FleetRecord {
    /// The hub multiplexing this collection.
    fn hub(views: &LiveViews) -> &Hub<Self>;
}

impl LiveRecord for Cab {
    fn hub(views: &LiveViews) -> &Hub<Self> {
        &views.cabs
    }
}

impl LiveRecord for Trip {
    fn hub(views: &LiveViews) -> &Hub<Self> {
        &views.trips
    }
}

impl LiveRecord for Expense {
    fn hub(views: &LiveViews) -> &Hub<Self> {
        &views.expenses
    }
}

/// Reference-counted live subscriptions for the three fleet collections.
pub struct LiveViews {
    store: Arc<FleetStore>,
    cabs: Hub<Cab>,
    trips: Hub<Trip>,
    expenses: Hub<Expense>,
}

impl fmt::Debug for LiveViews {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveViews")
            .field("cabs", &self.cabs.observer_count())
            .field("trips", &self.trips.observer_count())
            .field("expenses", &self.expenses.observer_count())
            .finish()
    }
}

impl LiveViews {
    /// Creates a coordinator with no listeners running.
    #[must_use]
    pub fn new(store: Arc<FleetStore>) -> Self {
        Self {
            store,
            cabs: Hub::new(),
            trips: Hub::new(),
            expenses: Hub::new(),
        }
    }

    /// Registers `callback` for every snapshot of `E`'s collection.
    ///
    /// The first delivery is the current snapshot; later deliveries follow
    /// each committed write. Dropping the returned handle unsubscribes.
    pub async fn add_observer<E, F>(&self, callback: F) -> Result<ObserverHandle>
    where
        E: LiveRecord,
        E::Model: Sync + 'static,
        F: FnMut(Snapshot<E::Model>) + Send + 'static,
    {
        let hub = E::hub(self);
        let attachment = hub.attach(&self.store).await?;
        debug!(
            collection = %E::COLLECTION,
            observer = attachment.id,
            observers = hub.observer_count(),
            "Observer registered"
        );
        let handle = hub.handle(attachment.id);
        tokio::spawn(deliver(attachment.snapshots, attachment.stop, callback));
        Ok(handle)
    }

    /// Registers `callback` for the subset of each snapshot `keep` accepts.
    pub async fn add_filtered_observer<E, P, F>(
        &self,
        mut keep: P,
        mut callback: F,
    ) -> Result<ObserverHandle>
    where
        E: LiveRecord,
        E::Model: Sync + 'static,
        P: FnMut(&E::Model) -> bool + Send + 'static,
        F: FnMut(Snapshot<E::Model>) + Send + 'static,
    {
        self.add_observer::<E, _>(move |snapshot: Snapshot<E::Model>| {
            let filtered: Vec<E::Model> =
                snapshot.iter().filter(|record| keep(*record)).cloned().collect();
            callback(Arc::new(filtered));
        })
        .await
    }

    /// Registers `callback` for one record. It fires whenever that record
    /// changes and stays silent while the record does not exist.
    pub async fn add_record_observer<E, F>(&self, id: i64, mut callback: F) -> Result<ObserverHandle>
    where
        E: LiveRecord,
        E::Model: Sync + PartialEq + 'static,
        F: FnMut(E::Model) + Send + 'static,
    {
        let mut last: Option<E::Model> = None;
        self.add_observer::<E, _>(move |snapshot: Snapshot<E::Model>| {
            let Some(record) = snapshot.iter().find(|record| E::record_id(record) == id) else {
                return;
            };
            if last.as_ref() == Some(record) {
                return;
            }
            last = Some(record.clone());
            callback(record.clone());
        })
        .await
    }

    /// Number of observers currently registered for `collection`.
    #[must_use]
    pub fn observer_count(&self, collection: Collection) -> usize {
        match collection {
            Collection::Cabs => self.cabs.observer_count(),
            Collection::Trips => self.trips.observer_count(),
            Collection::Expenses => self.expenses.observer_count(),
        }
    }

    /// Whether a store listener is running for `collection`.
    #[must_use]
    pub fn is_listening(&self, collection: Collection) -> bool {
        match collection {
            Collection::Cabs => self.cabs.is_listening(),
            Collection::Trips => self.trips.is_listening(),
            Collection::Expenses => self.expenses.is_listening(),
        }
    }
}

/// Observer registry of one collection.
pub struct Hub<E: FleetRecord> {
    registry: Arc<Mutex<Registry<E::Model>>>,
}

struct Registry<M> {
    collection: Collection,
    listener: Option<Listener<M>>,
    next_id: u64,
}

struct Listener<M> {
    snapshots: watch::Receiver<Snapshot<M>>,
    task: JoinHandle<()>,
    observers: HashMap<u64, oneshot::Sender<()>>,
}

impl<M> Drop for Listener<M> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Attachment<M> {
    id: u64,
    snapshots: watch::Receiver<Snapshot<M>>,
    stop: oneshot::Receiver<()>,
}

impl<M> Registry<M> {
    fn join(listener: &mut Listener<M>, next_id: &mut u64) -> Attachment<M> {
        *next_id += 1;
        let (stop_tx, stop) = oneshot::channel();
        listener.observers.insert(*next_id, stop_tx);
        Attachment {
            id: *next_id,
            snapshots: listener.snapshots.clone(),
            stop,
        }
    }
}

impl<E> Hub<E>
where
    E: FleetRecord,
    E::Model: Sync + 'static,
{
    fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                collection: E::COLLECTION,
                listener: None,
                next_id: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry<E::Model>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observer_count(&self) -> usize {
        self.lock()
            .listener
            .as_ref()
            .map_or(0, |listener| listener.observers.len())
    }

    fn is_listening(&self) -> bool {
        self.lock().listener.is_some()
    }

    fn try_join(&self) -> Option<Attachment<E::Model>> {
        let mut guard = self.lock();
        let registry = &mut *guard;
        let listener = registry.listener.as_mut()?;
        Some(Registry::join(listener, &mut registry.next_id))
    }

    async fn attach(&self, store: &Arc<FleetStore>) -> Result<Attachment<E::Model>> {
        if let Some(attachment) = self.try_join() {
            return Ok(attachment);
        }

        // Subscribe before loading so no write can slip between the two.
        let changes = store.subscribe_changes();
        let initial = load_snapshot::<E>(store.db()).await?;

        let mut guard = self.lock();
        let registry = &mut *guard;
        let listener = registry.listener.get_or_insert_with(|| {
            let (publisher, snapshots) = watch::channel(Arc::new(initial));
            let task = tokio::spawn(listen::<E>(Arc::clone(store), changes, publisher));
            debug!(collection = %E::COLLECTION, "Store listener started");
            Listener {
                snapshots,
                task,
                observers: HashMap::new(),
            }
        });
        Ok(Registry::join(listener, &mut registry.next_id))
    }

    fn handle(&self, observer: u64) -> ObserverHandle {
        let weak = Arc::downgrade(&self.registry);
        let registry: Weak<dyn Detach> = weak;
        ObserverHandle {
            collection: E::COLLECTION,
            observer,
            registry: Some(registry),
        }
    }
}

trait Detach: Send + Sync {
    fn detach(&self, observer: u64);
}

impl<M: Send + Sync + 'static> Detach for Mutex<Registry<M>> {
    fn detach(&self, observer: u64) {
        let mut registry = self.lock().unwrap_or_else(PoisonError::into_inner);
        let collection = registry.collection;
        let Some(listener) = registry.listener.as_mut() else {
            return;
        };
        if let Some(stop) = listener.observers.remove(&observer) {
            // The delivery task may already be gone; nothing to do then.
            let _ = stop.send(());
            debug!(%collection, observer, "Observer removed");
        }
        if listener.observers.is_empty() {
            registry.listener = None;
            debug!(%collection, "Last observer left, store listener stopped");
        }
    }
}

/// Token returned by [`LiveViews::add_observer`].
///
/// [`ObserverHandle::unsubscribe`] is idempotent; dropping the handle
/// unsubscribes as well.
#[must_use = "dropping the handle unsubscribes the observer"]
pub struct ObserverHandle {
    collection: Collection,
    observer: u64,
    registry: Option<Weak<dyn Detach>>,
}

impl ObserverHandle {
    /// Stops future deliveries to this observer.
    pub fn unsubscribe(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.detach(self.observer);
        }
    }

    /// Collection this observer watches.
    #[must_use]
    pub const fn collection(&self) -> Collection {
        self.collection
    }

    /// Whether [`ObserverHandle::unsubscribe`] has not been called yet.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.registry.is_some()
    }
}

impl fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("collection", &self.collection)
            .field("observer", &self.observer)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Store listener: reloads the snapshot after every change to `E`'s collection.
async fn listen<E>(
    store: Arc<FleetStore>,
    mut changes: broadcast::Receiver<ChangeEvent>,
    publisher: watch::Sender<Snapshot<E::Model>>,
) where
    E: FleetRecord,
    E::Model: Sync + 'static,
{
    loop {
        match changes.recv().await {
            Ok(event) if event.collection == E::COLLECTION => {
                trace!(?event, "Reloading live snapshot");
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    collection = %E::COLLECTION,
                    skipped,
                    "Live listener fell behind the change feed, reloading"
                );
            }
            Err(RecvError::Closed) => break,
        }

        match load_snapshot::<E>(store.db()).await {
            Ok(records) => {
                publisher.send_replace(Arc::new(records));
            }
            Err(e) => warn!(
                collection = %E::COLLECTION,
                error = %e,
                "Failed to reload live snapshot, keeping the previous one"
            ),
        }
    }
}

/// Delivery task of one observer.
async fn deliver<M, F>(
    mut snapshots: watch::Receiver<Snapshot<M>>,
    mut stop: oneshot::Receiver<()>,
    mut callback: F,
) where
    M: Send + Sync + 'static,
    F: FnMut(Snapshot<M>) + Send + 'static,
{
    let mut current = snapshots.borrow_and_update().clone();
    loop {
        if !matches!(stop.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
            break;
        }
        callback(current);

        tokio::select! {
            biased;
            _ = &mut stop => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                current = snapshots.borrow_and_update().clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::cab::NewCab;
    use crate::entities::CabModel;
    use crate::test_utils::*;
    use tokio::sync::mpsc;

    fn collect_sizes(
        tx: mpsc::UnboundedSender<usize>,
    ) -> impl FnMut(Snapshot<CabModel>) + Send + 'static {
        move |snapshot: Snapshot<CabModel>| {
            let _ = tx.send(snapshot.len());
        }
    }

    #[tokio::test]
    async fn test_late_observer_gets_full_snapshot_not_backlog() -> Result<()> {
        let fleet = setup_test_fleet().await?;
        for registration in ["KA-01-1111", "KA-01-2222", "KA-01-3333"] {
            create_test_cab(&fleet, registration).await?;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = fleet
            .live()
            .add_observer::<Cab, _>(collect_sizes(tx))
            .await?;

        assert_eq!(next_delivery(&mut rx).await, 3);
        assert_no_delivery(&mut rx).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_observers_share_one_listener() -> Result<()> {
        let fleet = setup_test_fleet().await?;
        let live = fleet.live();
        assert!(!live.is_listening(Collection::Cabs));

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let mut first = live.add_observer::<Cab, _>(collect_sizes(tx_a)).await?;
        let mut second = live.add_observer::<Cab, _>(collect_sizes(tx_b)).await?;

        assert!(live.is_listening(Collection::Cabs));
        assert_eq!(live.observer_count(Collection::Cabs), 2);
        assert!(!live.is_listening(Collection::Trips));
        assert_eq!(next_delivery(&mut rx_a).await, 0);
        assert_eq!(next_delivery(&mut rx_b).await, 0);

        create_test_cab(&fleet, "KA-02-0001").await?;
        assert_eq!(next_delivery(&mut rx_a).await, 1);
        assert_eq!(next_delivery(&mut rx_b).await, 1);

        first.unsubscribe();
        assert_eq!(live.observer_count(Collection::Cabs), 1);
        assert!(live.is_listening(Collection::Cabs));

        create_test_cab(&fleet, "KA-02-0002").await?;
        assert_eq!(next_delivery(&mut rx_b).await, 2);
        assert_no_delivery(&mut rx_a).await;

        second.unsubscribe();
        assert!(!live.is_listening(Collection::Cabs));
        assert_eq!(live.observer_count(Collection::Cabs), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() -> Result<()> {
        let fleet = setup_test_fleet().await?;
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut handle = fleet
            .live()
            .add_observer::<Cab, _>(collect_sizes(tx))
            .await?;
        assert!(handle.is_active());

        handle.unsubscribe();
        handle.unsubscribe();
        assert!(!handle.is_active());
        assert!(!fleet.live().is_listening(Collection::Cabs));
        Ok(())
    }

    #[tokio::test]
    async fn test_dropping_handle_unsubscribes() -> Result<()> {
        let fleet = setup_test_fleet().await?;
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = fleet
            .live()
            .add_observer::<Cab, _>(collect_sizes(tx))
            .await?;
        assert_eq!(fleet.live().observer_count(Collection::Cabs), 1);

        drop(handle);
        assert_eq!(fleet.live().observer_count(Collection::Cabs), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_listener_restarts_after_teardown() -> Result<()> {
        let fleet = setup_test_fleet().await?;
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = fleet
            .live()
            .add_observer::<Cab, _>(collect_sizes(tx))
            .await?;
        drop(first);

        create_test_cab(&fleet, "KA-03-0001").await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _second = fleet
            .live()
            .add_observer::<Cab, _>(collect_sizes(tx))
            .await?;
        assert!(fleet.live().is_listening(Collection::Cabs));
        assert_eq!(next_delivery(&mut rx).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_slow_observer_only_sees_newer_snapshots() -> Result<()> {
        let fleet = setup_test_fleet().await?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = fleet
            .live()
            .add_observer::<Cab, _>(collect_sizes(tx))
            .await?;
        assert_eq!(next_delivery(&mut rx).await, 0);

        // Several writes land before the observer task gets to run again.
        for i in 0..5 {
            fleet
                .cabs()
                .create(NewCab {
                    registration_number: Some(format!("KA-04-{i:04}")),
                    ..test_new_cab()
                })
                .await?;
        }

        let mut last = 0;
        loop {
            let size = next_delivery(&mut rx).await;
            assert!(size >= last, "snapshot of {size} arrived after {last}");
            last = size;
            if size == 5 {
                break;
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_unsubscribe_during_delivery_lets_it_finish() -> Result<()> {
        let fleet = setup_test_fleet().await?;
        let live = fleet.live();

        let slot: Arc<Mutex<Option<ObserverHandle>>> = Arc::default();
        let own = Arc::clone(&slot);
        let (slow_tx, mut slow_rx) = mpsc::unbounded_channel();
        let slow = live
            .add_observer::<Cab, _>(move |snapshot: Snapshot<CabModel>| {
                if snapshot.is_empty() {
                    return;
                }
                if let Some(mut handle) = own.lock().unwrap().take() {
                    handle.unsubscribe();
                }
                // Still running after its own unsubscribe.
                let _ = slow_tx.send(snapshot.len());
            })
            .await?;
        *slot.lock().unwrap() = Some(slow);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _other = live.add_observer::<Cab, _>(collect_sizes(tx)).await?;
        assert_eq!(next_delivery(&mut rx).await, 0);

        create_test_cab(&fleet, "KA-06-0001").await?;
        assert_eq!(next_delivery(&mut slow_rx).await, 1);
        assert_eq!(next_delivery(&mut rx).await, 1);
        assert_eq!(live.observer_count(Collection::Cabs), 1);

        create_test_cab(&fleet, "KA-06-0002").await?;
        assert_eq!(next_delivery(&mut rx).await, 2);
        assert_no_delivery(&mut slow_rx).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_record_observer_skips_unchanged_and_missing() -> Result<()> {
        let fleet = setup_test_fleet().await?;
        let watched = create_test_cab(&fleet, "KA-05-0001").await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = fleet
            .live()
            .add_record_observer::<Cab, _>(watched.id, move |cab: CabModel| {
                let _ = tx.send(cab.current_location());
            })
            .await?;
        assert_eq!(next_delivery(&mut rx).await, None);

        // A different cab changing must not re-deliver the watched one.
        create_test_cab(&fleet, "KA-05-0002").await?;
        assert_no_delivery(&mut rx).await;

        let ping = crate::entities::Coordinate { lat: 12.97, lng: 77.59 };
        fleet.cabs().update_location(watched.id, ping).await?;
        assert_eq!(next_delivery(&mut rx).await, Some(ping));

        fleet.cabs().delete(watched.id).await?;
        assert_no_delivery(&mut rx).await;
        Ok(())
    }
}
