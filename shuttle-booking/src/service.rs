use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use shuttle_core::notify::EventNotifier;
use shuttle_core::payment::PaymentGateway;
use shuttle_core::{Booking, BookingStore, CoreError, CoreResult, StoreTx, Trip};
use shuttle_shared::PlatformEvent;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::boarding::BoardingCodes;
use crate::fare::FarePolicy;
use crate::ledger::{CapacityLedger, Restoration};
use crate::lifecycle::{BookingLifecycle, TransitionOutcome};
use crate::models::{BookingOutcome, BookingRequest};
use crate::orchestrator::BookingOrchestrator;
use crate::payment::PaymentResolver;
use crate::policy::CancellationPolicy;

/// Tunable business rules, usually loaded from configuration
#[derive(Debug, Clone, Copy)]
pub struct BookingRules {
    pub cancellation_notice: Duration,
    pub boarding_code_length: usize,
    pub boarding_code_validity: Duration,
    pub tax_rate: f64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            cancellation_notice: Duration::minutes(120),
            boarding_code_length: 6,
            boarding_code_validity: Duration::minutes(120),
            tax_rate: 0.0,
        }
    }
}

/// A booking as shown to its passenger
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub can_cancel: bool,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Transaction boundary for the reservation core.
///
/// Each operation opens one transaction, runs to completion inside it, and
/// commits; any error rolls everything back. Notifications go out only after
/// a successful commit.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    orchestrator: BookingOrchestrator,
    lifecycle: BookingLifecycle,
    ledger: CapacityLedger,
    notifier: Arc<dyn EventNotifier>,
    clock: Clock,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn EventNotifier>,
        rules: BookingRules,
    ) -> Self {
        let codes = BoardingCodes::new(rules.boarding_code_length, rules.boarding_code_validity);
        let ledger = CapacityLedger::new();
        Self {
            store,
            orchestrator: BookingOrchestrator::new(
                PaymentResolver::new(gateway),
                FarePolicy::new(rules.tax_rate),
                codes,
            ),
            lifecycle: BookingLifecycle::new(
                ledger,
                CancellationPolicy::new(rules.cancellation_notice),
                codes,
            ),
            ledger,
            notifier,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. to pin "now" in tests.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub async fn create_booking(&self, user_id: Uuid, request: BookingRequest) -> CoreResult<BookingOutcome> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = self.orchestrator.book(tx.as_mut(), user_id, &request, now).await;
        let outcome = finish(tx, result).await?;

        if !outcome.replayed {
            let mut events = Vec::new();
            for booking in outcome.bookings() {
                events.push(PlatformEvent::BookingConfirmed {
                    booking_id: booking.id,
                    trip_id: booking.trip_id,
                    user_id: booking.user_id,
                    seats: booking.number_of_seats_booked,
                    round_trip_id: booking.round_trip_id,
                    timestamp: now.timestamp(),
                });
            }
            self.publish_all(events).await;
        }
        Ok(outcome)
    }

    pub async fn cancel_by_user(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
        reason: Option<String>,
    ) -> CoreResult<Booking> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = self
            .lifecycle
            .cancel_by_user(tx.as_mut(), user_id, booking_id, reason, now)
            .await;
        let outcome = finish(tx, result).await?;
        self.publish_release(&outcome, now).await;
        Ok(outcome.booking)
    }

    pub async fn cancel_by_admin(&self, booking_id: Uuid, reason: Option<String>) -> CoreResult<Booking> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = self.lifecycle.cancel_by_admin(tx.as_mut(), booking_id, reason, now).await;
        let outcome = finish(tx, result).await?;
        self.publish_release(&outcome, now).await;
        Ok(outcome.booking)
    }

    pub async fn decline_by_driver(&self, driver_id: Uuid, booking_id: Uuid, reason: &str) -> CoreResult<Booking> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = self
            .lifecycle
            .decline_by_driver(tx.as_mut(), driver_id, booking_id, reason, now)
            .await;
        let outcome = finish(tx, result).await?;
        self.publish_release(&outcome, now).await;
        Ok(outcome.booking)
    }

    pub async fn onboard(
        &self,
        driver_id: Uuid,
        booking_id: Uuid,
        boarding_code: Option<&str>,
    ) -> CoreResult<Booking> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = self
            .lifecycle
            .onboard(tx.as_mut(), driver_id, booking_id, boarding_code, now)
            .await;
        let outcome = finish(tx, result).await?;
        self.publish_all(vec![PlatformEvent::PassengerOnboarded {
            booking_id: outcome.booking.id,
            trip_id: outcome.booking.trip_id,
            driver_id,
            timestamp: now.timestamp(),
        }])
        .await;
        Ok(outcome.booking)
    }

    pub async fn complete(&self, driver_id: Uuid, booking_id: Uuid) -> CoreResult<Booking> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = self.lifecycle.complete(tx.as_mut(), driver_id, booking_id, now).await;
        let outcome = finish(tx, result).await?;
        self.publish_all(vec![PlatformEvent::BookingCompleted {
            booking_id: outcome.booking.id,
            trip_id: outcome.booking.trip_id,
            timestamp: now.timestamp(),
        }])
        .await;
        Ok(outcome.booking)
    }

    pub async fn leave_feedback(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
        rating: i16,
        comment: Option<String>,
        tip_cents: i64,
    ) -> CoreResult<Booking> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = self
            .lifecycle
            .leave_feedback(tx.as_mut(), user_id, booking_id, rating, comment, tip_cents, now)
            .await;
        finish(tx, result).await
    }

    /// Remove a booking row outright, restoring its seats first.
    pub async fn admin_delete(&self, booking_id: Uuid) -> CoreResult<()> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = self.lifecycle.admin_delete(tx.as_mut(), booking_id).await;
        let outcome = finish(tx, result).await?;
        self.publish_release(&outcome, now).await;
        Ok(())
    }

    pub async fn increase_seats(&self, trip_id: Uuid, seats: i32) -> CoreResult<Trip> {
        self.adjust_seats(trip_id, seats).await
    }

    pub async fn decrease_seats(&self, trip_id: Uuid, seats: i32) -> CoreResult<Trip> {
        let delta = seats
            .checked_neg()
            .ok_or_else(|| CoreError::bad_request("seat adjustment out of range"))?;
        self.adjust_seats(trip_id, delta).await
    }

    /// Manual capacity correction: positive `delta` adds seats (clamped at the
    /// vehicle capacity), negative removes them and fails rather than going
    /// below zero.
    pub async fn adjust_seats(&self, trip_id: Uuid, delta: i32) -> CoreResult<Trip> {
        if delta == 0 {
            return Err(CoreError::bad_request("seat adjustment must not be zero"));
        }
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = if delta > 0 {
            self.ledger.increment(tx.as_mut(), trip_id, delta).await
        } else {
            self.ledger.decrease_checked(tx.as_mut(), trip_id, delta.saturating_neg()).await
        };
        let trip = finish(tx, result).await?;
        self.publish_all(vec![capacity_event(&trip, now)]).await;
        Ok(trip)
    }

    /// A single booking, visible to its owner only.
    pub async fn get_booking(&self, user_id: Uuid, booking_id: Uuid) -> CoreResult<BookingView> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("booking {} not found", booking_id)))?;
        if booking.user_id != user_id {
            return Err(CoreError::forbidden("booking belongs to another user"));
        }
        Ok(self.view(booking, self.now()))
    }

    pub async fn list_bookings(&self, user_id: Uuid) -> CoreResult<Vec<BookingView>> {
        let now = self.now();
        let bookings = self.store.list_user_bookings(user_id).await?;
        Ok(bookings.into_iter().map(|b| self.view(b, now)).collect())
    }

    fn view(&self, booking: Booking, now: DateTime<Utc>) -> BookingView {
        let can_cancel = self.lifecycle.policy().is_cancellable(&booking, now);
        BookingView { booking, can_cancel }
    }

    async fn publish_release(&self, outcome: &TransitionOutcome, now: DateTime<Utc>) {
        let booking = &outcome.booking;
        let mut events = vec![PlatformEvent::BookingReleased {
            booking_id: booking.id,
            trip_id: booking.trip_id,
            status: booking.status.to_string(),
            seats_restored: outcome.seats_restored(),
            timestamp: now.timestamp(),
        }];
        if let Some(Restoration::Applied(trip)) = &outcome.restoration {
            events.push(capacity_event(trip, now));
        }
        self.publish_all(events).await;
    }

    async fn publish_all(&self, events: Vec<PlatformEvent>) {
        for event in &events {
            if let Err(e) = self.notifier.publish(event).await {
                error!(error = %e, topic = event.topic(), trip_id = %event.trip_id(), "failed to publish event");
            }
        }
    }
}

fn capacity_event(trip: &Trip, now: DateTime<Utc>) -> PlatformEvent {
    PlatformEvent::TripCapacityChanged {
        trip_id: trip.id,
        current_seats: trip.current_seats,
        status: trip.status.to_string(),
        timestamp: now.timestamp(),
    }
}

/// Commit on success, roll back on error.
async fn finish<T>(tx: Box<dyn StoreTx>, result: CoreResult<T>) -> CoreResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}
