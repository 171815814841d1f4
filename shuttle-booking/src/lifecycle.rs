use chrono::{DateTime, Utc};
use shuttle_core::{Booking, BookingStatus, CoreError, CoreResult, Feedback, StoreTx, Trip};
use tracing::info;
use uuid::Uuid;

use crate::boarding::BoardingCodes;
use crate::ledger::{CapacityLedger, Restoration};
use crate::policy::CancellationPolicy;

/// Things that can happen to a booking after it is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SettlementSucceeded,
    Onboard,
    CancelByUser,
    CancelByAdmin,
    DeclineByDriver,
    Complete,
}

/// Work a transition must perform in the same transaction as the status flip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    RestoreSeats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: BookingStatus,
    pub effects: &'static [SideEffect],
}

const RESTORE: &[SideEffect] = &[SideEffect::RestoreSeats];
const NONE: &[SideEffect] = &[];

/// (current, event) -> (next, side effects)
const TRANSITIONS: &[(BookingStatus, LifecycleEvent, BookingStatus, &[SideEffect])] = &[
    (BookingStatus::PendingPayment, LifecycleEvent::SettlementSucceeded, BookingStatus::Confirmed, NONE),
    (BookingStatus::Confirmed, LifecycleEvent::Onboard, BookingStatus::Ongoing, NONE),
    (BookingStatus::Confirmed, LifecycleEvent::CancelByUser, BookingStatus::CancelledByUser, RESTORE),
    (BookingStatus::Confirmed, LifecycleEvent::CancelByAdmin, BookingStatus::CancelledByAdmin, RESTORE),
    (BookingStatus::Ongoing, LifecycleEvent::CancelByAdmin, BookingStatus::CancelledByAdmin, RESTORE),
    (BookingStatus::Confirmed, LifecycleEvent::DeclineByDriver, BookingStatus::DeclinedByDriver, RESTORE),
    (BookingStatus::Ongoing, LifecycleEvent::Complete, BookingStatus::Completed, NONE),
];

pub fn transition(current: BookingStatus, event: LifecycleEvent) -> Option<Transition> {
    TRANSITIONS
        .iter()
        .find(|(from, on, _, _)| *from == current && *on == event)
        .map(|(_, _, next, effects)| Transition { next: *next, effects: *effects })
}

/// Like [`transition`], failing with BadRequest when the event is illegal.
pub fn next_step(current: BookingStatus, event: LifecycleEvent) -> CoreResult<Transition> {
    transition(current, event).ok_or_else(|| {
        CoreError::bad_request(format!(
            "booking is {} and cannot be {}",
            current,
            describe(event)
        ))
    })
}

fn describe(event: LifecycleEvent) -> &'static str {
    match event {
        LifecycleEvent::SettlementSucceeded => "confirmed",
        LifecycleEvent::Onboard => "onboarded",
        LifecycleEvent::CancelByUser | LifecycleEvent::CancelByAdmin => "cancelled",
        LifecycleEvent::DeclineByDriver => "declined",
        LifecycleEvent::Complete => "completed",
    }
}

/// Booking after a lifecycle operation, with any capacity change it caused
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub booking: Booking,
    pub restoration: Option<Restoration>,
}

impl TransitionOutcome {
    pub fn seats_restored(&self) -> i32 {
        match self.restoration {
            Some(Restoration::Applied(_)) => self.booking.number_of_seats_booked,
            _ => 0,
        }
    }
}

/// Drives booking status changes and their capacity side effects
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingLifecycle {
    ledger: CapacityLedger,
    policy: CancellationPolicy,
    codes: BoardingCodes,
}

impl BookingLifecycle {
    pub fn new(ledger: CapacityLedger, policy: CancellationPolicy, codes: BoardingCodes) -> Self {
        Self { ledger, policy, codes }
    }

    pub fn policy(&self) -> &CancellationPolicy {
        &self.policy
    }

    pub async fn cancel_by_user(
        &self,
        tx: &mut dyn StoreTx,
        user_id: Uuid,
        booking_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<TransitionOutcome> {
        let mut booking = lock_booking(tx, booking_id).await?;
        if booking.user_id != user_id {
            return Err(CoreError::forbidden("booking belongs to another user"));
        }
        let step = next_step(booking.status, LifecycleEvent::CancelByUser)?;
        if !self.policy.window_open(booking.departure_time, now) {
            return Err(CoreError::bad_request(format!(
                "cancellation window closed: departure is less than {} minutes away",
                self.policy.min_notice.num_minutes()
            )));
        }
        booking.cancellation_reason = reason;
        self.apply(tx, booking, step, LifecycleEvent::CancelByUser, now).await
    }

    pub async fn cancel_by_admin(
        &self,
        tx: &mut dyn StoreTx,
        booking_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<TransitionOutcome> {
        let mut booking = lock_booking(tx, booking_id).await?;
        let step = next_step(booking.status, LifecycleEvent::CancelByAdmin)?;
        booking.cancellation_reason = reason.or_else(|| Some("removed by operator".to_string()));
        self.apply(tx, booking, step, LifecycleEvent::CancelByAdmin, now).await
    }

    pub async fn decline_by_driver(
        &self,
        tx: &mut dyn StoreTx,
        driver_id: Uuid,
        booking_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<TransitionOutcome> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::bad_request("a reason is required to decline a booking"));
        }
        let mut booking = lock_booking(tx, booking_id).await?;
        self.ensure_driver(tx, &booking, driver_id).await?;
        let step = next_step(booking.status, LifecycleEvent::DeclineByDriver)?;
        booking.driver_decline_reason = Some(reason.to_string());
        self.apply(tx, booking, step, LifecycleEvent::DeclineByDriver, now).await
    }

    pub async fn onboard(
        &self,
        tx: &mut dyn StoreTx,
        driver_id: Uuid,
        booking_id: Uuid,
        boarding_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<TransitionOutcome> {
        let booking = lock_booking(tx, booking_id).await?;
        self.ensure_driver(tx, &booking, driver_id).await?;
        let step = next_step(booking.status, LifecycleEvent::Onboard)?;
        if let Some(code) = boarding_code {
            self.codes.verify(&booking, code, now)?;
        }
        self.apply(tx, booking, step, LifecycleEvent::Onboard, now).await
    }

    pub async fn complete(
        &self,
        tx: &mut dyn StoreTx,
        driver_id: Uuid,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<TransitionOutcome> {
        let booking = lock_booking(tx, booking_id).await?;
        self.ensure_driver(tx, &booking, driver_id).await?;
        let step = next_step(booking.status, LifecycleEvent::Complete)?;
        self.apply(tx, booking, step, LifecycleEvent::Complete, now).await
    }

    /// Attach the passenger's rating to a completed booking, once.
    #[allow(clippy::too_many_arguments)]
    pub async fn leave_feedback(
        &self,
        tx: &mut dyn StoreTx,
        user_id: Uuid,
        booking_id: Uuid,
        rating: i16,
        comment: Option<String>,
        tip_cents: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        if !(1..=5).contains(&rating) {
            return Err(CoreError::bad_request("rating must be between 1 and 5"));
        }
        if tip_cents < 0 {
            return Err(CoreError::bad_request("tip cannot be negative"));
        }
        let mut booking = lock_booking(tx, booking_id).await?;
        if booking.user_id != user_id {
            return Err(CoreError::forbidden("booking belongs to another user"));
        }
        if booking.status != BookingStatus::Completed {
            return Err(CoreError::bad_request(format!(
                "feedback requires a completed booking, booking is {}",
                booking.status
            )));
        }
        if booking.feedback.is_some() {
            return Err(CoreError::conflict("booking has already been rated"));
        }
        booking.feedback = Some(Feedback { rating, comment, tip_cents, created_at: now });
        booking.updated_at = now;
        save(tx, &booking).await?;
        Ok(booking)
    }

    /// Physically remove a booking, giving its seats back first.
    pub async fn admin_delete(&self, tx: &mut dyn StoreTx, booking_id: Uuid) -> CoreResult<TransitionOutcome> {
        let booking = lock_booking(tx, booking_id).await?;
        let restoration = if booking.status.holds_seats() {
            Some(self.ledger.restore(tx, booking.trip_id, booking.number_of_seats_booked).await?)
        } else {
            None
        };
        if tx.delete_booking(booking.id).await? == 0 {
            return Err(CoreError::internal(format!("delete of booking {} affected no rows", booking.id)));
        }
        info!(booking_id = %booking.id, "booking hard-deleted");
        Ok(TransitionOutcome { booking, restoration })
    }

    async fn ensure_driver(&self, tx: &mut dyn StoreTx, booking: &Booking, driver_id: Uuid) -> CoreResult<Trip> {
        let trip = tx
            .lock_trip(booking.trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("trip {} not found", booking.trip_id)))?;
        if trip.driver_id != driver_id {
            return Err(CoreError::forbidden("driver is not assigned to this trip"));
        }
        Ok(trip)
    }

    async fn apply(
        &self,
        tx: &mut dyn StoreTx,
        mut booking: Booking,
        step: Transition,
        event: LifecycleEvent,
        now: DateTime<Utc>,
    ) -> CoreResult<TransitionOutcome> {
        let previous = booking.status;
        booking.update_status(step.next, now);
        match event {
            LifecycleEvent::CancelByUser | LifecycleEvent::CancelByAdmin | LifecycleEvent::DeclineByDriver => {
                booking.cancelled_at = Some(now)
            }
            LifecycleEvent::Onboard => booking.onboarded_at = Some(now),
            LifecycleEvent::Complete => booking.completed_at = Some(now),
            LifecycleEvent::SettlementSucceeded => {}
        }

        let mut restoration = None;
        for effect in step.effects {
            match effect {
                SideEffect::RestoreSeats => {
                    restoration = Some(
                        self.ledger
                            .restore(tx, booking.trip_id, booking.number_of_seats_booked)
                            .await?,
                    );
                }
            }
        }

        save(tx, &booking).await?;
        info!(
            booking_id = %booking.id,
            from = %previous,
            to = %booking.status,
            "booking transitioned"
        );
        Ok(TransitionOutcome { booking, restoration })
    }
}

async fn lock_booking(tx: &mut dyn StoreTx, booking_id: Uuid) -> CoreResult<Booking> {
    tx.lock_booking(booking_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("booking {} not found", booking_id)))
}

async fn save(tx: &mut dyn StoreTx, booking: &Booking) -> CoreResult<()> {
    if tx.update_booking(booking).await? == 0 {
        return Err(CoreError::internal(format!("update of booking {} affected no rows", booking.id)));
    }
    Ok(())
}
