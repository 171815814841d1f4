#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use shuttle_booking::{BookingRequest, BookingRules, BookingService, LegRequest, PassthroughGateway, TripSelection};
use shuttle_core::payment::PaymentGateway;
use shuttle_core::{BookingStore, PaymentMethod, Stop, Trip, TripStatus, User};
use shuttle_store::{BroadcastNotifier, MemoryStore};
use std::sync::Arc;
use uuid::Uuid;

pub const PRICE_CENTS: i64 = 1_500;

pub struct Fixture {
    pub store: MemoryStore,
    pub notifier: BroadcastNotifier,
    pub service: BookingService,
    pub driver_id: Uuid,
}

/// A seeded trip and the stops of its route.
#[derive(Clone)]
pub struct SeededTrip {
    pub id: Uuid,
    pub stops: Vec<Stop>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::on(MemoryStore::new())
    }

    pub fn on(store: MemoryStore) -> Self {
        Self::wired(store.clone(), Arc::new(store), Arc::new(PassthroughGateway))
    }

    /// Service running against `backend` and `gateway`; `store` is where the
    /// fixture seeds and inspects rows.
    pub fn wired(store: MemoryStore, backend: Arc<dyn BookingStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        let notifier = BroadcastNotifier::new(256);
        let service = BookingService::new(backend, gateway, Arc::new(notifier.clone()), BookingRules::default());
        Self { store, notifier, service, driver_id: Uuid::new_v4() }
    }

    /// Pin the service clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.service = self.service.with_clock(move || now);
        self
    }

    pub fn user(&self, wallet_balance_cents: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.store.add_user(User {
            id,
            full_name: "Test Passenger".to_string(),
            is_active: true,
            wallet_balance_cents,
        });
        id
    }

    pub fn inactive_user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.store.add_user(User {
            id,
            full_name: "Closed Account".to_string(),
            is_active: false,
            wallet_balance_cents: 10_000,
        });
        id
    }

    /// Rewrite a seeded trip row, e.g. to deactivate or reprice it.
    pub fn edit_trip(&self, trip: &SeededTrip, edit: impl FnOnce(&mut Trip)) {
        if let Some(mut row) = self.store.trip(trip.id) {
            edit(&mut row);
            self.store.add_trip(row);
        }
    }

    pub fn trip(&self, seats: i32) -> SeededTrip {
        self.trip_departing(seats, Utc::now() + Duration::days(1))
    }

    pub fn trip_departing(&self, seats: i32, departure: DateTime<Utc>) -> SeededTrip {
        let stops = self.store.seed_route(&["Depot", "Market", "Campus"]);
        let id = Uuid::new_v4();
        self.store.add_trip(Trip {
            id,
            route_id: stops[0].route_id,
            vehicle_id: Uuid::new_v4(),
            driver_id: self.driver_id,
            series_id: None,
            departure_time: departure,
            estimated_arrival_time: departure + Duration::minutes(45),
            price_per_seat_cents: PRICE_CENTS,
            currency: "USD".to_string(),
            initial_seats: seats,
            current_seats: seats,
            status: TripStatus::Scheduled,
            is_active: true,
        });
        SeededTrip { id, stops }
    }

    pub fn seats_left(&self, trip: &SeededTrip) -> i32 {
        self.store.trip(trip.id).map(|t| t.current_seats).unwrap_or(-1)
    }

    pub fn status_of(&self, trip: &SeededTrip) -> Option<TripStatus> {
        self.store.trip(trip.id).map(|t| t.status)
    }
}

pub fn leg(trip: &SeededTrip, seats: &[&str]) -> LegRequest {
    LegRequest {
        trip_id: trip.id,
        pickup_stop_id: trip.stops[0].id,
        drop_off_stop_id: trip.stops[2].id,
        seat_ids: seats.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn one_way(trip: &SeededTrip, seats: &[&str], method: PaymentMethod) -> BookingRequest {
    BookingRequest {
        trip: TripSelection::OneWay { leg: leg(trip, seats) },
        payment_method: method,
        payment_reference: None,
        idempotency_key: None,
    }
}

pub fn round_trip(onward: &SeededTrip, back: &SeededTrip, seats: &[&str], method: PaymentMethod) -> BookingRequest {
    BookingRequest {
        trip: TripSelection::RoundTrip { onward: leg(onward, seats), return_leg: leg(back, seats) },
        payment_method: method,
        payment_reference: None,
        idempotency_key: None,
    }
}
