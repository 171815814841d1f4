use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Booking, Stop, Trip, TripStatus, User};
use crate::payment::WalletDebit;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("lock wait timed out: {0}")]
    LockTimeout(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("row decode failed: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Entry point to the shared relational store.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Open a transaction. Every mutation of trips, bookings and wallets goes
    /// through the returned handle.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    /// Unlocked read of a committed booking.
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// Committed bookings of a user, newest first.
    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>>;
}

/// A transaction-scoped handle. Row locks taken through it are held until
/// `commit` or `rollback`; dropping the handle rolls back.
///
/// Lock acquisition is reentrant within one transaction.
#[async_trait]
pub trait StoreTx: Send {
    /// Lock the user row (wallet owner) and return it.
    async fn lock_user(&mut self, id: Uuid) -> StoreResult<Option<User>>;

    /// Exclusive row lock on the trip.
    async fn lock_trip(&mut self, id: Uuid) -> StoreResult<Option<Trip>>;

    /// Stops of a route ordered by sequence. Unlocked: route data is immutable
    /// while bookings are taken.
    async fn route_stops(&mut self, route_id: Uuid) -> StoreResult<Vec<Stop>>;

    /// Seat ids held by CONFIRMED/ONGOING bookings of the trip, as visible to
    /// this transaction.
    async fn held_seat_ids(&mut self, trip_id: Uuid) -> StoreResult<Vec<String>>;

    /// Persist new seat counters and status; returns rows affected.
    async fn write_trip_capacity(
        &mut self,
        trip_id: Uuid,
        current_seats: i32,
        status: TripStatus,
    ) -> StoreResult<u64>;

    /// Atomically debit the user's wallet.
    async fn debit_wallet(&mut self, user_id: Uuid, amount_cents: i64) -> StoreResult<WalletDebit>;

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    /// Exclusive row lock on the booking.
    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<u64>;

    async fn delete_booking(&mut self, id: Uuid) -> StoreResult<u64>;

    /// Bookings previously created by `user_id` under an idempotency key.
    async fn bookings_by_idempotency_key(
        &mut self,
        user_id: Uuid,
        key: &str,
    ) -> StoreResult<Vec<Booking>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
