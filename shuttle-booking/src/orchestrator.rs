use chrono::{DateTime, Utc};
use shuttle_core::{Booking, BookingStatus, CoreError, CoreResult, StoreTx, User};
use tracing::{debug, info};
use uuid::Uuid;

use crate::boarding::BoardingCodes;
use crate::fare::FarePolicy;
use crate::ledger::CapacityLedger;
use crate::models::{BookingOutcome, BookingRequest, LegRequest, TripSelection};
use crate::payment::{PaymentRequest, PaymentResolver};
use crate::validator::{LockedLeg, StopSeatValidator};

/// Creates bookings for one or two legs as a single unit of work.
///
/// Lock order is fixed: the purchasing user's row, then every trip row in
/// ascending id order. Two purchases touching the same trips therefore queue
/// instead of deadlocking.
#[derive(Clone)]
pub struct BookingOrchestrator {
    validator: StopSeatValidator,
    ledger: CapacityLedger,
    resolver: PaymentResolver,
    fares: FarePolicy,
    codes: BoardingCodes,
}

impl BookingOrchestrator {
    pub fn new(resolver: PaymentResolver, fares: FarePolicy, codes: BoardingCodes) -> Self {
        Self {
            validator: StopSeatValidator::new(),
            ledger: CapacityLedger::new(),
            resolver,
            fares,
            codes,
        }
    }

    pub async fn book(
        &self,
        tx: &mut dyn StoreTx,
        user_id: Uuid,
        request: &BookingRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<BookingOutcome> {
        request.trip.check_shape()?;

        let user = self.lock_user(tx, user_id).await?;

        let key = request
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        if let Some(key) = key {
            let previous = tx.bookings_by_idempotency_key(user.id, key).await?;
            if !previous.is_empty() {
                return replay(previous, &request.trip);
            }
        }

        for trip_id in request.trip.lock_order() {
            tx.lock_trip(trip_id)
                .await?
                .ok_or_else(|| CoreError::not_found(format!("trip {} not found", trip_id)))?;
        }

        // Every leg is validated before anything is written.
        let mut locked = Vec::with_capacity(2);
        for leg in request.trip.legs() {
            locked.push((leg, self.validator.validate_and_lock(tx, leg).await?));
        }

        let round_trip_id = request.trip.return_leg().map(|_| Uuid::new_v4());
        let mut bookings = Vec::with_capacity(locked.len());
        for (leg, checked) in locked {
            let booking = self
                .reserve_leg(tx, &user, request, leg, checked, round_trip_id, key, now)
                .await?;
            bookings.push(booking);
        }

        let mut bookings = bookings.into_iter();
        let onward = bookings
            .next()
            .ok_or_else(|| CoreError::internal("no booking produced for onward leg"))?;
        Ok(BookingOutcome { onward, return_leg: bookings.next(), replayed: false })
    }

    async fn lock_user(&self, tx: &mut dyn StoreTx, user_id: Uuid) -> CoreResult<User> {
        let user = tx
            .lock_user(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("user {} not found", user_id)))?;
        if !user.is_active {
            return Err(CoreError::forbidden("user account is inactive"));
        }
        Ok(user)
    }

    #[allow(clippy::too_many_arguments)]
    async fn reserve_leg(
        &self,
        tx: &mut dyn StoreTx,
        user: &User,
        request: &BookingRequest,
        leg: &LegRequest,
        checked: LockedLeg,
        round_trip_id: Option<Uuid>,
        idempotency_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        let trip = checked.trip;
        let seats = leg.seat_count();
        let fare = self.fares.quote(trip.price_per_seat_cents, seats)?;

        let payment = self
            .resolver
            .resolve(
                tx,
                PaymentRequest {
                    user_id: user.id,
                    amount_cents: fare.total_cents,
                    currency: &trip.currency,
                    method: request.payment_method,
                    reference: request.payment_reference.as_deref(),
                },
            )
            .await?;

        let (boarding_code, boarding_code_expires_at) = self.codes.issue(trip.departure_time);
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: user.id,
            trip_id: trip.id,
            departure_time: trip.departure_time,
            pickup_stop_id: checked.pickup.id,
            drop_off_stop_id: checked.drop_off.id,
            booked_seat_ids: leg.seat_ids.clone(),
            number_of_seats_booked: seats,
            fare,
            payment,
            status: BookingStatus::Confirmed,
            round_trip_id,
            boarding_code,
            boarding_code_expires_at,
            cancellation_reason: None,
            driver_decline_reason: None,
            feedback: None,
            idempotency_key: idempotency_key.map(str::to_string),
            onboarded_at: None,
            cancelled_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        tx.insert_booking(&booking).await?;
        let trip = self.ledger.decrement(tx, trip.id, seats).await?;
        info!(
            booking_id = %booking.id,
            trip_id = %trip.id,
            seats,
            remaining = trip.current_seats,
            "seats reserved"
        );
        Ok(booking)
    }
}

/// Rebuild the earlier outcome for a repeated idempotency key, refusing keys
/// reused for a different purchase.
fn replay(previous: Vec<Booking>, selection: &TripSelection) -> CoreResult<BookingOutcome> {
    let reused = || CoreError::conflict("idempotency key reused with different parameters");

    let wanted = selection.legs();
    if previous.len() != wanted.len() {
        return Err(reused());
    }
    let mut previous = previous;
    let mut ordered = Vec::with_capacity(wanted.len());
    for leg in wanted {
        let pos = previous
            .iter()
            .position(|b| same_leg(b, leg))
            .ok_or_else(reused)?;
        ordered.push(previous.swap_remove(pos));
    }

    let mut ordered = ordered.into_iter();
    let onward = ordered.next().ok_or_else(reused)?;
    debug!(booking_id = %onward.id, "idempotent replay");
    Ok(BookingOutcome { onward, return_leg: ordered.next(), replayed: true })
}

/// Whether a stored booking was made for exactly this leg: same trip, stops
/// and seats (seat order ignored).
fn same_leg(booking: &Booking, leg: &LegRequest) -> bool {
    let mut held: Vec<&str> = booking.booked_seat_ids.iter().map(String::as_str).collect();
    let mut asked: Vec<&str> = leg.seat_ids.iter().map(String::as_str).collect();
    held.sort_unstable();
    asked.sort_unstable();
    booking.trip_id == leg.trip_id
        && booking.pickup_stop_id == leg.pickup_stop_id
        && booking.drop_off_stop_id == leg.drop_off_stop_id
        && held == asked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LegRequest;
    use shuttle_core::{FareBreakdown, PaymentMethod, SettlementRecord, SettlementStatus};
    use shuttle_shared::Masked;

    fn leg(trip_id: Uuid) -> LegRequest {
        LegRequest {
            trip_id,
            pickup_stop_id: Uuid::new_v4(),
            drop_off_stop_id: Uuid::new_v4(),
            seat_ids: vec!["1A".to_string()],
        }
    }

    fn booking_for(leg: &LegRequest) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            trip_id: leg.trip_id,
            departure_time: now,
            pickup_stop_id: leg.pickup_stop_id,
            drop_off_stop_id: leg.drop_off_stop_id,
            booked_seat_ids: leg.seat_ids.clone(),
            number_of_seats_booked: 1,
            fare: FareBreakdown::default(),
            payment: SettlementRecord {
                method: PaymentMethod::Cash,
                gateway: "cash".to_string(),
                transaction_reference: "CASH-1".to_string(),
                amount_cents: 0,
                currency: "USD".to_string(),
                status: SettlementStatus::Success,
                settled_at: now,
            },
            status: BookingStatus::Confirmed,
            round_trip_id: None,
            boarding_code: Masked::new("123456".to_string()),
            boarding_code_expires_at: now,
            cancellation_reason: None,
            driver_decline_reason: None,
            feedback: None,
            idempotency_key: Some("k".to_string()),
            onboarded_at: None,
            cancelled_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn replay_orders_legs_like_the_request() {
        let (onward, back) = (leg(Uuid::new_v4()), leg(Uuid::new_v4()));
        let previous = vec![booking_for(&back), booking_for(&onward)];
        let selection = TripSelection::RoundTrip { onward: onward.clone(), return_leg: back.clone() };
        let outcome = replay(previous, &selection).unwrap();
        assert!(outcome.replayed);
        assert_eq!(outcome.onward.trip_id, onward.trip_id);
        assert_eq!(outcome.return_leg.unwrap().trip_id, back.trip_id);
    }

    #[test]
    fn replay_ignores_seat_order() {
        let mut first = leg(Uuid::new_v4());
        first.seat_ids = vec!["1A".to_string(), "1B".to_string()];
        let mut again = first.clone();
        again.seat_ids.reverse();
        let outcome = replay(vec![booking_for(&first)], &TripSelection::OneWay { leg: again }).unwrap();
        assert!(outcome.replayed);
    }

    #[test]
    fn replay_rejects_key_reused_for_other_trip() {
        let selection = TripSelection::OneWay { leg: leg(Uuid::new_v4()) };
        let err = replay(vec![booking_for(&leg(Uuid::new_v4()))], &selection).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn replay_rejects_key_reused_for_other_seats_or_stops() {
        let original = leg(Uuid::new_v4());

        let mut other_seat = original.clone();
        other_seat.seat_ids = vec!["9Z".to_string()];
        let err = replay(vec![booking_for(&original)], &TripSelection::OneWay { leg: other_seat }).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let mut other_stop = original.clone();
        other_stop.drop_off_stop_id = Uuid::new_v4();
        let err = replay(vec![booking_for(&original)], &TripSelection::OneWay { leg: other_stop }).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }
}
