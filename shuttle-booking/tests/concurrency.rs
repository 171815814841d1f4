mod common;

use common::*;
use shuttle_core::{BookingStatus, CoreError, PaymentMethod, TripStatus};
use shuttle_store::MemoryStore;
use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_for_the_last_seat_has_one_winner() {
    let fx = Fixture::new();
    let trip = fx.trip(1);
    let (alice, bob) = (fx.user(0), fx.user(0));

    let a = {
        let service = fx.service.clone();
        let request = one_way(&trip, &["1A"], PaymentMethod::Cash);
        tokio::spawn(async move { service.create_booking(alice, request).await })
    };
    let b = {
        let service = fx.service.clone();
        let request = one_way(&trip, &["1A"], PaymentMethod::Cash);
        tokio::spawn(async move { service.create_booking(bob, request).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser, CoreError::Conflict(_)));
    assert_eq!(fx.seats_left(&trip), 0);
    assert_eq!(fx.status_of(&trip), Some(TripStatus::Full));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_bookings_never_oversell() {
    let fx = Fixture::new();
    let trip = fx.trip(10);
    let mut tasks = JoinSet::new();

    for i in 0..25 {
        let service = fx.service.clone();
        let user = fx.user(0);
        // Distinct seats, so only capacity limits the winners.
        let request = one_way(&trip, &[format!("S{}", i).as_str()], PaymentMethod::Cash);
        tasks.spawn(async move { service.create_booking(user, request).await });
    }

    let mut confirmed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => confirmed += 1,
            Err(e) => assert!(matches!(e, CoreError::Conflict(_)), "unexpected error {:?}", e),
        }
    }

    assert_eq!(confirmed, 10);
    assert_eq!(fx.seats_left(&trip), 0);

    let held: Vec<String> = fx
        .store
        .trip_bookings(trip.id)
        .into_iter()
        .filter(|b| b.status == BookingStatus::Confirmed)
        .flat_map(|b| b.booked_seat_ids)
        .collect();
    let unique: HashSet<&String> = held.iter().collect();
    assert_eq!(held.len(), 10);
    assert_eq!(unique.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn duplicate_seat_requests_never_double_book() {
    let fx = Fixture::new();
    let trip = fx.trip(20);
    let mut tasks = JoinSet::new();

    for _ in 0..12 {
        let service = fx.service.clone();
        let user = fx.user(0);
        let request = one_way(&trip, &["7C"], PaymentMethod::Cash);
        tasks.spawn(async move { service.create_booking(user, request).await });
    }

    let mut winners = 0;
    while let Some(joined) = tasks.join_next().await {
        if joined.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(fx.seats_left(&trip), 19);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn opposite_round_trips_do_not_deadlock() {
    // A short lock timeout turns a deadlock into visible failures.
    let fx = Fixture::on(MemoryStore::with_lock_timeout(Duration::from_secs(2)));
    let (x, y) = (fx.trip(40), fx.trip(40));
    let mut tasks = JoinSet::new();

    for i in 0..10 {
        for (onward, back) in [(&x, &y), (&y, &x)] {
            let service = fx.service.clone();
            let user = fx.user(0);
            let seat = format!("{}-{}", i, onward.id.simple());
            let request = round_trip(onward, back, &[seat.as_str()], PaymentMethod::Cash);
            tasks.spawn(async move { service.create_booking(user, request).await });
        }
    }

    let all = tokio::time::timeout(Duration::from_secs(20), async {
        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.unwrap());
        }
        results
    })
    .await
    .expect("round trips stalled");

    assert!(all.iter().all(|r| r.is_ok()), "failures: {:?}", all.iter().filter(|r| r.is_err()).collect::<Vec<_>>());
    assert_eq!(fx.seats_left(&x), 20);
    assert_eq!(fx.seats_left(&y), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellations_and_bookings_interleave_within_bounds() {
    let fx = Fixture::new();
    let trip = fx.trip(3);
    let holder = fx.user(0);

    let mut held = Vec::new();
    for seat in ["1A", "1B", "1C"] {
        let outcome = fx
            .service
            .create_booking(holder, one_way(&trip, &[seat], PaymentMethod::Cash))
            .await
            .unwrap();
        held.push(outcome.onward.id);
    }
    assert_eq!(fx.status_of(&trip), Some(TripStatus::Full));

    let mut tasks = JoinSet::new();
    for id in held {
        let service = fx.service.clone();
        tasks.spawn(async move { service.cancel_by_user(holder, id, None).await.map(|_| ()) });
    }
    for i in 0..6 {
        let service = fx.service.clone();
        let user = fx.user(0);
        let request = one_way(&trip, &[format!("2{}", i).as_str()], PaymentMethod::Cash);
        tasks.spawn(async move { service.create_booking(user, request).await.map(|_| ()) });
    }
    while let Some(joined) = tasks.join_next().await {
        let _ = joined.unwrap();
    }

    let seats = fx.seats_left(&trip);
    assert!((0..=3).contains(&seats));
    let confirmed: i32 = fx
        .store
        .trip_bookings(trip.id)
        .iter()
        .filter(|b| b.status.holds_seats())
        .map(|b| b.number_of_seats_booked)
        .sum();
    assert_eq!(confirmed + seats, 3);
}
