mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::*;
use shuttle_booking::payment::PaymentRequest;
use shuttle_booking::{PassthroughGateway, PaymentResolver};
use shuttle_core::payment::PaymentGateway;
use shuttle_core::{
    Booking, BookingStore, CoreError, CoreResult, PaymentMethod, SettlementRecord, SettlementStatus, Stop, StoreResult,
    StoreTx, Trip, TripStatus, User, WalletDebit,
};
use shuttle_store::MemoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Approves the first charge and declines every later one.
#[derive(Default)]
struct DeclinesAfterFirst {
    calls: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for DeclinesAfterFirst {
    async fn settle(
        &self,
        _user_id: Uuid,
        method: PaymentMethod,
        amount_cents: i64,
        currency: &str,
        _reference: Option<&str>,
    ) -> CoreResult<SettlementRecord> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        let status = if attempt == 0 { SettlementStatus::Success } else { SettlementStatus::Failed };
        Ok(SettlementRecord {
            method,
            gateway: "card-test".to_string(),
            transaction_reference: format!("ch_{}", attempt),
            amount_cents,
            currency: currency.to_string(),
            status,
            settled_at: Utc::now(),
        })
    }
}

/// Store whose trip rows disappear between the lock and the capacity write.
struct VanishingTrips(MemoryStore);

#[async_trait]
impl BookingStore for VanishingTrips {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        Ok(Box::new(VanishingTripsTx(self.0.begin().await?)))
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.0.get_booking(id).await
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        self.0.list_user_bookings(user_id).await
    }
}

struct VanishingTripsTx(Box<dyn StoreTx>);

#[async_trait]
impl StoreTx for VanishingTripsTx {
    async fn lock_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        self.0.lock_user(id).await
    }

    async fn lock_trip(&mut self, id: Uuid) -> StoreResult<Option<Trip>> {
        self.0.lock_trip(id).await
    }

    async fn route_stops(&mut self, route_id: Uuid) -> StoreResult<Vec<Stop>> {
        self.0.route_stops(route_id).await
    }

    async fn held_seat_ids(&mut self, trip_id: Uuid) -> StoreResult<Vec<String>> {
        self.0.held_seat_ids(trip_id).await
    }

    async fn write_trip_capacity(&mut self, _trip_id: Uuid, _current: i32, _status: TripStatus) -> StoreResult<u64> {
        Ok(0)
    }

    async fn debit_wallet(&mut self, user_id: Uuid, amount_cents: i64) -> StoreResult<WalletDebit> {
        self.0.debit_wallet(user_id, amount_cents).await
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.0.insert_booking(booking).await
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.0.lock_booking(id).await
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<u64> {
        self.0.update_booking(booking).await
    }

    async fn delete_booking(&mut self, id: Uuid) -> StoreResult<u64> {
        self.0.delete_booking(id).await
    }

    async fn bookings_by_idempotency_key(&mut self, user_id: Uuid, key: &str) -> StoreResult<Vec<Booking>> {
        self.0.bookings_by_idempotency_key(user_id, key).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.0.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.0.rollback().await
    }
}

#[tokio::test]
async fn zero_amount_settles_as_promotional() {
    let store = MemoryStore::new();
    let resolver = PaymentResolver::new(Arc::new(PassthroughGateway));
    let mut tx = store.begin().await.unwrap();

    let record = resolver
        .resolve(
            tx.as_mut(),
            PaymentRequest {
                user_id: Uuid::new_v4(),
                amount_cents: 0,
                currency: "USD",
                method: PaymentMethod::Wallet,
                reference: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(record.gateway, "promotional");
    assert_eq!(record.amount_cents, 0);
    assert_eq!(record.status, SettlementStatus::Success);
    assert!(record.transaction_reference.starts_with("PROMO-"));
}

#[tokio::test]
async fn free_trip_books_without_touching_the_wallet() {
    let fx = Fixture::new();
    let user = fx.user(0);
    let trip = fx.trip(2);
    fx.edit_trip(&trip, |t| t.price_per_seat_cents = 0);

    let outcome = fx
        .service
        .create_booking(user, one_way(&trip, &["1A"], PaymentMethod::Wallet))
        .await
        .unwrap();

    assert_eq!(outcome.onward.payment.gateway, "promotional");
    assert_eq!(outcome.onward.fare.total_cents, 0);
    assert_eq!(fx.store.user(user).unwrap().wallet_balance_cents, 0);
    assert_eq!(fx.seats_left(&trip), 1);
}

#[tokio::test]
async fn declined_card_on_return_leg_rolls_back_both_legs() {
    let store = MemoryStore::new();
    let fx = Fixture::wired(store.clone(), Arc::new(store), Arc::new(DeclinesAfterFirst::default()));
    let user = fx.user(0);
    let (out, back) = (fx.trip(4), fx.trip(4));

    let err = fx
        .service
        .create_booking(user, round_trip(&out, &back, &["5A"], PaymentMethod::Card))
        .await
        .unwrap_err();

    assert_eq!(err, CoreError::Forbidden("payment was not authorized (status FAILED)".into()));
    assert_eq!(fx.seats_left(&out), 4);
    assert_eq!(fx.seats_left(&back), 4);
    assert!(fx.store.trip_bookings(out.id).is_empty());
    assert!(fx.store.trip_bookings(back.id).is_empty());
}

#[tokio::test]
async fn lock_wait_timeout_surfaces_as_internal_error() {
    let fx = Fixture::on(MemoryStore::with_lock_timeout(Duration::from_millis(100)));
    let user = fx.user(0);
    let trip = fx.trip(3);

    let mut holder = fx.store.begin().await.unwrap();
    holder.lock_trip(trip.id).await.unwrap();

    let err = fx
        .service
        .create_booking(user, one_way(&trip, &["1A"], PaymentMethod::Cash))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InternalError(_)), "got {:?}", err);
    assert_eq!(fx.seats_left(&trip), 3);

    drop(holder);
    fx.service
        .create_booking(user, one_way(&trip, &["1A"], PaymentMethod::Cash))
        .await
        .unwrap();
    assert_eq!(fx.seats_left(&trip), 2);
}

#[tokio::test]
async fn capacity_write_hitting_no_rows_aborts_the_booking() {
    let store = MemoryStore::new();
    let fx = Fixture::wired(store.clone(), Arc::new(VanishingTrips(store)), Arc::new(PassthroughGateway));
    let user = fx.user(0);
    let trip = fx.trip(3);

    let err = fx
        .service
        .create_booking(user, one_way(&trip, &["1A"], PaymentMethod::Cash))
        .await
        .unwrap_err();

    assert_eq!(err, CoreError::InternalError(format!("capacity update for trip {} affected no rows", trip.id)));
    assert!(fx.store.trip_bookings(trip.id).is_empty());
    assert_eq!(fx.seats_left(&trip), 3);
}
