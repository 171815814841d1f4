use shuttle_core::{CoreError, CoreResult, Stop, StoreTx, Trip};
use std::collections::HashSet;
use tracing::debug;

use crate::models::LegRequest;

/// A leg whose trip row is locked and whose stops and seats were accepted
#[derive(Debug, Clone)]
pub struct LockedLeg {
    pub trip: Trip,
    pub pickup: Stop,
    pub drop_off: Stop,
}

/// Checks stop membership/order and seat availability under the trip lock
#[derive(Debug, Clone, Copy, Default)]
pub struct StopSeatValidator;

impl StopSeatValidator {
    pub fn new() -> Self {
        Self
    }

    pub async fn validate_and_lock(&self, tx: &mut dyn StoreTx, leg: &LegRequest) -> CoreResult<LockedLeg> {
        // Serialization point: a concurrent booking for this trip waits here
        // until we commit or roll back.
        let trip = tx
            .lock_trip(leg.trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("trip {} not found", leg.trip_id)))?;

        if !trip.is_active {
            return Err(CoreError::bad_request("trip is not active"));
        }
        if !trip.status.is_bookable() {
            return Err(CoreError::bad_request(format!(
                "trip is not open for booking (status {})",
                trip.status
            )));
        }

        let stops = tx.route_stops(trip.route_id).await?;
        let (pickup, drop_off) = resolve_stops(&stops, leg)?;

        let held: HashSet<String> = tx.held_seat_ids(trip.id).await?.into_iter().collect();
        if let Some(taken) = leg.seat_ids.iter().find(|s| held.contains(s.as_str())) {
            return Err(CoreError::conflict(format!("seat {} already booked", taken)));
        }

        if leg.seat_count() > trip.current_seats {
            return Err(CoreError::conflict(format!(
                "not enough seats: requested {}, available {}",
                leg.seat_count(),
                trip.current_seats
            )));
        }

        debug!(trip_id = %trip.id, seats = leg.seat_count(), "leg validated under lock");
        Ok(LockedLeg { trip, pickup, drop_off })
    }
}

/// Find both stops on the route and check pickup precedes drop-off.
pub fn resolve_stops(stops: &[Stop], leg: &LegRequest) -> CoreResult<(Stop, Stop)> {
    let find = |id| stops.iter().find(|s| s.id == id).cloned();
    let pickup = find(leg.pickup_stop_id)
        .ok_or_else(|| CoreError::bad_request("pickup stop is not on this trip's route"))?;
    let drop_off = find(leg.drop_off_stop_id)
        .ok_or_else(|| CoreError::bad_request("drop-off stop is not on this trip's route"))?;
    if pickup.sequence >= drop_off.sequence {
        return Err(CoreError::bad_request("pickup stop must come before drop-off stop"));
    }
    Ok((pickup, drop_off))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn route(n: i32) -> (Uuid, Vec<Stop>) {
        let route_id = Uuid::new_v4();
        let stops = (1..=n)
            .map(|seq| Stop { id: Uuid::new_v4(), route_id, name: format!("Stop {}", seq), sequence: seq })
            .collect();
        (route_id, stops)
    }

    fn leg(pickup: Uuid, drop_off: Uuid) -> LegRequest {
        LegRequest {
            trip_id: Uuid::new_v4(),
            pickup_stop_id: pickup,
            drop_off_stop_id: drop_off,
            seat_ids: vec!["1A".to_string()],
        }
    }

    #[test]
    fn accepts_forward_pair() {
        let (_, stops) = route(3);
        let (p, d) = resolve_stops(&stops, &leg(stops[0].id, stops[2].id)).unwrap();
        assert_eq!(p.sequence, 1);
        assert_eq!(d.sequence, 3);
    }

    #[test]
    fn rejects_reversed_pair() {
        let (_, stops) = route(3);
        let err = resolve_stops(&stops, &leg(stops[2].id, stops[1].id)).unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
    }

    #[test]
    fn rejects_foreign_stop() {
        let (_, stops) = route(2);
        let err = resolve_stops(&stops, &leg(Uuid::new_v4(), stops[1].id)).unwrap_err();
        assert_eq!(err, CoreError::BadRequest("pickup stop is not on this trip's route".into()));
    }
}
