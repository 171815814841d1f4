use async_trait::async_trait;
use shuttle_core::{
    Booking, BookingStore, Stop, StoreError, StoreResult, StoreTx, Trip, TripStatus, User, WalletDebit,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    User(Uuid),
    Trip(Uuid),
    Booking(Uuid),
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    stops: Vec<Stop>,
    trips: HashMap<Uuid, Trip>,
    bookings: HashMap<Uuid, Booking>,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    rows: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    lock_timeout: Option<Duration>,
}

/// In-process store with the locking behaviour of the relational one: row
/// locks block other transactions until commit or rollback, are reentrant
/// within a transaction, and writes stay invisible until commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail lock acquisition with `StoreError::LockTimeout` after `timeout`.
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner { lock_timeout: Some(timeout), ..Inner::default() }),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_user(&self, user: User) {
        self.tables().users.insert(user.id, user);
    }

    pub fn add_stops(&self, stops: impl IntoIterator<Item = Stop>) {
        self.tables().stops.extend(stops);
    }

    /// Create a route with one stop per name, sequenced in order.
    pub fn seed_route(&self, names: &[&str]) -> Vec<Stop> {
        let route_id = Uuid::new_v4();
        let stops: Vec<Stop> = names
            .iter()
            .enumerate()
            .map(|(i, name)| Stop {
                id: Uuid::new_v4(),
                route_id,
                name: name.to_string(),
                sequence: i as i32 + 1,
            })
            .collect();
        self.add_stops(stops.clone());
        stops
    }

    pub fn add_trip(&self, trip: Trip) {
        self.tables().trips.insert(trip.id, trip);
    }

    /// Force a trip status, as scheduling does when a trip starts or ends.
    pub fn set_trip_status(&self, trip_id: Uuid, status: TripStatus) {
        if let Some(trip) = self.tables().trips.get_mut(&trip_id) {
            trip.status = status;
        }
    }

    pub fn trip(&self, id: Uuid) -> Option<Trip> {
        self.tables().trips.get(&id).cloned()
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.tables().users.get(&id).cloned()
    }

    pub fn trip_bookings(&self, trip_id: Uuid) -> Vec<Booking> {
        self.tables()
            .bookings
            .values()
            .filter(|b| b.trip_id == trip_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            held: HashMap::new(),
            users: HashMap::new(),
            trips: HashMap::new(),
            bookings: HashMap::new(),
        }))
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables().bookings.get(&id).cloned())
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .tables()
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }
}

/// Transaction over [`MemoryStore`]. Writes go to an overlay applied on
/// commit; dropping the handle discards them and releases its locks.
pub struct MemoryTx {
    store: MemoryStore,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    users: HashMap<Uuid, User>,
    trips: HashMap<Uuid, Trip>,
    /// `None` marks a deleted row.
    bookings: HashMap<Uuid, Option<Booking>>,
}

impl MemoryTx {
    async fn acquire(&mut self, key: RowKey) -> StoreResult<()> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let row = {
            let mut rows = self.store.inner.rows.lock().unwrap_or_else(PoisonError::into_inner);
            // Only the map holds an unused row lock: no guard, no waiter.
            rows.retain(|_, row| Arc::strong_count(row) > 1);
            rows.entry(key).or_default().clone()
        };
        let guard = match self.store.inner.lock_timeout {
            Some(timeout) => tokio::time::timeout(timeout, row.lock_owned())
                .await
                .map_err(|_| StoreError::LockTimeout(format!("{:?}", key)))?,
            None => row.lock_owned().await,
        };
        self.held.insert(key, guard);
        Ok(())
    }

    fn trip_view(&self, id: Uuid) -> Option<Trip> {
        self.trips.get(&id).cloned().or_else(|| self.store.trip(id))
    }

    fn user_view(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).cloned().or_else(|| self.store.user(id))
    }

    fn booking_view(&self, id: Uuid) -> Option<Booking> {
        match self.bookings.get(&id) {
            Some(overlay) => overlay.clone(),
            None => self.store.tables().bookings.get(&id).cloned(),
        }
    }

    /// Committed bookings with this transaction's own writes applied.
    fn bookings_view(&self) -> Vec<Booking> {
        let mut merged = self.store.tables().bookings.clone();
        for (id, row) in &self.bookings {
            match row {
                Some(b) => {
                    merged.insert(*id, b.clone());
                }
                None => {
                    merged.remove(id);
                }
            }
        }
        merged.into_values().collect()
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        self.acquire(RowKey::User(id)).await?;
        Ok(self.user_view(id))
    }

    async fn lock_trip(&mut self, id: Uuid) -> StoreResult<Option<Trip>> {
        self.acquire(RowKey::Trip(id)).await?;
        Ok(self.trip_view(id))
    }

    async fn route_stops(&mut self, route_id: Uuid) -> StoreResult<Vec<Stop>> {
        let mut stops: Vec<Stop> = self
            .store
            .tables()
            .stops
            .iter()
            .filter(|s| s.route_id == route_id)
            .cloned()
            .collect();
        stops.sort_by_key(|s| s.sequence);
        Ok(stops)
    }

    async fn held_seat_ids(&mut self, trip_id: Uuid) -> StoreResult<Vec<String>> {
        Ok(self
            .bookings_view()
            .into_iter()
            .filter(|b| b.trip_id == trip_id && b.status.holds_seats())
            .flat_map(|b| b.booked_seat_ids)
            .collect())
    }

    async fn write_trip_capacity(
        &mut self,
        trip_id: Uuid,
        current_seats: i32,
        status: TripStatus,
    ) -> StoreResult<u64> {
        self.acquire(RowKey::Trip(trip_id)).await?;
        let Some(mut trip) = self.trip_view(trip_id) else {
            return Ok(0);
        };
        if current_seats < 0 || current_seats > trip.initial_seats {
            return Err(StoreError::Backend(format!(
                "check constraint violated: current_seats {} outside 0..={}",
                current_seats, trip.initial_seats
            )));
        }
        trip.current_seats = current_seats;
        trip.status = status;
        self.trips.insert(trip_id, trip);
        Ok(1)
    }

    async fn debit_wallet(&mut self, user_id: Uuid, amount_cents: i64) -> StoreResult<WalletDebit> {
        self.acquire(RowKey::User(user_id)).await?;
        let Some(mut user) = self.user_view(user_id) else {
            return Ok(WalletDebit::insufficient(0, amount_cents));
        };
        if user.wallet_balance_cents < amount_cents {
            return Ok(WalletDebit::insufficient(user.wallet_balance_cents, amount_cents));
        }
        user.wallet_balance_cents -= amount_cents;
        let balance = user.wallet_balance_cents;
        self.users.insert(user_id, user);
        Ok(WalletDebit::debited(balance))
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        let existing = self.bookings_view();
        if existing.iter().any(|b| b.id == booking.id) {
            return Err(StoreError::UniqueViolation(format!("booking {} already exists", booking.id)));
        }
        if let Some(key) = &booking.idempotency_key {
            let clash = existing.iter().any(|b| {
                b.user_id == booking.user_id
                    && b.trip_id == booking.trip_id
                    && b.idempotency_key.as_ref() == Some(key)
            });
            if clash {
                return Err(StoreError::UniqueViolation(format!(
                    "idempotency key {} already used for trip {}",
                    key, booking.trip_id
                )));
            }
        }
        self.acquire(RowKey::Booking(booking.id)).await?;
        self.bookings.insert(booking.id, Some(booking.clone()));
        Ok(())
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.acquire(RowKey::Booking(id)).await?;
        Ok(self.booking_view(id))
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<u64> {
        self.acquire(RowKey::Booking(booking.id)).await?;
        if self.booking_view(booking.id).is_none() {
            return Ok(0);
        }
        self.bookings.insert(booking.id, Some(booking.clone()));
        Ok(1)
    }

    async fn delete_booking(&mut self, id: Uuid) -> StoreResult<u64> {
        self.acquire(RowKey::Booking(id)).await?;
        if self.booking_view(id).is_none() {
            return Ok(0);
        }
        self.bookings.insert(id, None);
        Ok(1)
    }

    async fn bookings_by_idempotency_key(&mut self, user_id: Uuid, key: &str) -> StoreResult<Vec<Booking>> {
        let mut found: Vec<Booking> = self
            .bookings_view()
            .into_iter()
            .filter(|b| b.user_id == user_id && b.idempotency_key.as_deref() == Some(key))
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { store, held, users, trips, bookings } = *self;
        {
            let mut tables = store.tables();
            tables.users.extend(users);
            tables.trips.extend(trips);
            for (id, row) in bookings {
                match row {
                    Some(b) => {
                        tables.bookings.insert(id, b);
                    }
                    None => {
                        tables.bookings.remove(&id);
                    }
                }
            }
        }
        debug!(locks = held.len(), "memory transaction committed");
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
