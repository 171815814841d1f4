use shuttle_core::{CoreError, CoreResult, StoreTx, Trip, TripStatus};
use tracing::{info, warn};
use uuid::Uuid;

/// Sole mutator of a trip's seat counters and fullness status.
///
/// All operations run inside the caller's transaction and take the trip row
/// lock (reentrant if already held).
#[derive(Debug, Clone, Copy, Default)]
pub struct CapacityLedger;

/// Outcome of giving seats back as a side effect of a booking transition
#[derive(Debug, Clone, PartialEq)]
pub enum Restoration {
    Applied(Trip),
    /// Trip is completed or cancelled; counters left untouched.
    Skipped { trip_id: Uuid, status: TripStatus },
}

impl CapacityLedger {
    pub fn new() -> Self {
        Self
    }

    /// Reduce `current_seats` by `seats`, flipping the trip to FULL at zero.
    pub async fn decrement(&self, tx: &mut dyn StoreTx, trip_id: Uuid, seats: i32) -> CoreResult<Trip> {
        ensure_positive(seats)?;
        let trip = lock(tx, trip_id).await?;
        if seats > trip.current_seats {
            warn!(
                trip_id = %trip_id,
                requested = seats,
                available = trip.current_seats,
                "decrement exceeds remaining seats, clamping at zero"
            );
        }
        let (current, status) = after_decrement(&trip, seats);
        write(tx, trip, current, status).await
    }

    /// Increase `current_seats` by `seats`, clamped at `initial_seats`; a FULL
    /// trip with seats available again goes back to SCHEDULED.
    pub async fn increment(&self, tx: &mut dyn StoreTx, trip_id: Uuid, seats: i32) -> CoreResult<Trip> {
        ensure_positive(seats)?;
        let trip = lock(tx, trip_id).await?;
        let (current, status) = after_increment(&trip, seats);
        write(tx, trip, current, status).await
    }

    /// Decrement for manual corrections: refuses to go below zero instead of clamping.
    pub async fn decrease_checked(&self, tx: &mut dyn StoreTx, trip_id: Uuid, seats: i32) -> CoreResult<Trip> {
        ensure_positive(seats)?;
        let trip = lock(tx, trip_id).await?;
        if seats > trip.current_seats {
            return Err(CoreError::conflict(format!(
                "cannot remove {} seats, only {} remaining",
                seats, trip.current_seats
            )));
        }
        self.decrement(tx, trip_id, seats).await
    }

    /// Give seats back after a booking stops holding them. Skipped once the
    /// trip is completed or cancelled.
    pub async fn restore(&self, tx: &mut dyn StoreTx, trip_id: Uuid, seats: i32) -> CoreResult<Restoration> {
        let trip = lock(tx, trip_id).await?;
        if !trip.status.takes_returned_seats() {
            info!(trip_id = %trip_id, status = %trip.status, "seat restoration skipped");
            return Ok(Restoration::Skipped { trip_id, status: trip.status });
        }
        if seats <= 0 {
            return Ok(Restoration::Applied(trip));
        }
        let trip = self.increment(tx, trip_id, seats).await?;
        Ok(Restoration::Applied(trip))
    }
}

/// Counters after removing `seats`, never below zero.
pub fn after_decrement(trip: &Trip, seats: i32) -> (i32, TripStatus) {
    let current = (trip.current_seats - seats).max(0);
    let status = if current == 0 { TripStatus::Full } else { trip.status };
    (current, status)
}

/// Counters after adding `seats`, never above `initial_seats`.
pub fn after_increment(trip: &Trip, seats: i32) -> (i32, TripStatus) {
    let current = (trip.current_seats + seats).min(trip.initial_seats);
    let status = if trip.status == TripStatus::Full && current > 0 {
        TripStatus::Scheduled
    } else {
        trip.status
    };
    (current, status)
}

fn ensure_positive(seats: i32) -> CoreResult<()> {
    if seats <= 0 {
        return Err(CoreError::bad_request(format!(
            "seat adjustment must be positive, got {}",
            seats
        )));
    }
    Ok(())
}

async fn lock(tx: &mut dyn StoreTx, trip_id: Uuid) -> CoreResult<Trip> {
    tx.lock_trip(trip_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("trip {} not found", trip_id)))
}

async fn write(tx: &mut dyn StoreTx, mut trip: Trip, current: i32, status: TripStatus) -> CoreResult<Trip> {
    let rows = tx.write_trip_capacity(trip.id, current, status).await?;
    if rows == 0 {
        // The row was locked by this transaction a moment ago.
        return Err(CoreError::internal(format!(
            "capacity update for trip {} affected no rows",
            trip.id
        )));
    }
    trip.current_seats = current;
    trip.status = status;
    Ok(trip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trip(initial: i32, current: i32, status: TripStatus) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            series_id: None,
            departure_time: Utc::now(),
            estimated_arrival_time: Utc::now(),
            price_per_seat_cents: 500,
            currency: "USD".to_string(),
            initial_seats: initial,
            current_seats: current,
            status,
            is_active: true,
        }
    }

    #[test]
    fn decrement_to_zero_marks_full() {
        let t = trip(10, 2, TripStatus::Scheduled);
        assert_eq!(after_decrement(&t, 2), (0, TripStatus::Full));
        assert_eq!(after_decrement(&t, 1), (1, TripStatus::Scheduled));
    }

    #[test]
    fn decrement_never_goes_negative() {
        let t = trip(10, 1, TripStatus::Delayed);
        assert_eq!(after_decrement(&t, 3), (0, TripStatus::Full));
    }

    #[test]
    fn increment_clamps_and_reopens() {
        let t = trip(4, 0, TripStatus::Full);
        assert_eq!(after_increment(&t, 2), (2, TripStatus::Scheduled));

        let t = trip(4, 3, TripStatus::Scheduled);
        assert_eq!(after_increment(&t, 5), (4, TripStatus::Scheduled));

        let t = trip(4, 1, TripStatus::Delayed);
        assert_eq!(after_increment(&t, 1), (2, TripStatus::Delayed));
    }
}
