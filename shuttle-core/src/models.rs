use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shuttle_shared::Masked;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::payment::SettlementRecord;

/// Trip status in the scheduling lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Scheduled,
    Full,
    Active,
    Completed,
    Cancelled,
    Delayed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "SCHEDULED",
            TripStatus::Full => "FULL",
            TripStatus::Active => "ACTIVE",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
            TripStatus::Delayed => "DELAYED",
        }
    }

    /// Statuses in which seats may still be sold or given back.
    pub fn is_bookable(&self) -> bool {
        matches!(self, TripStatus::Scheduled | TripStatus::Full | TripStatus::Delayed)
    }

    /// Statuses in which released seats go back on the counter. A started
    /// trip still takes them; a finished or cancelled one does not.
    pub fn takes_returned_seats(&self) -> bool {
        !matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(TripStatus::Scheduled),
            "FULL" => Ok(TripStatus::Full),
            "ACTIVE" => Ok(TripStatus::Active),
            "COMPLETED" => Ok(TripStatus::Completed),
            "CANCELLED" => Ok(TripStatus::Cancelled),
            "DELAYED" => Ok(TripStatus::Delayed),
            other => Err(format!("unknown trip status: {}", other)),
        }
    }
}

/// A stop on a route, ordered by `sequence`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stop {
    pub id: Uuid,
    pub route_id: Uuid,
    pub name: String,
    pub sequence: i32,
}

/// A dated instance of a route with finite seat inventory.
///
/// `current_seats` is only ever written by the capacity ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub route_id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    pub series_id: Option<Uuid>,
    pub departure_time: DateTime<Utc>,
    pub estimated_arrival_time: DateTime<Utc>,
    pub price_per_seat_cents: i64,
    pub currency: String,
    pub initial_seats: i32,
    pub current_seats: i32,
    pub status: TripStatus,
    pub is_active: bool,
}

/// Passenger account as seen by the booking core (owned by the users service)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub is_active: bool,
    pub wallet_balance_cents: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    Ongoing,
    Completed,
    CancelledByUser,
    CancelledByAdmin,
    DeclinedByDriver,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "PENDING_PAYMENT",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Ongoing => "ONGOING",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::CancelledByUser => "CANCELLED_BY_USER",
            BookingStatus::CancelledByAdmin => "CANCELLED_BY_ADMIN",
            BookingStatus::DeclinedByDriver => "DECLINED_BY_DRIVER",
            BookingStatus::NoShow => "NO_SHOW",
        }
    }

    /// Statuses whose seat ids are unavailable to other bookings on the trip.
    pub fn holds_seats(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Ongoing)
    }

    pub const SEAT_HOLDING: [BookingStatus; 2] = [BookingStatus::Confirmed, BookingStatus::Ongoing];
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(BookingStatus::PendingPayment),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "ONGOING" => Ok(BookingStatus::Ongoing),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "CANCELLED_BY_USER" => Ok(BookingStatus::CancelledByUser),
            "CANCELLED_BY_ADMIN" => Ok(BookingStatus::CancelledByAdmin),
            "DECLINED_BY_DRIVER" => Ok(BookingStatus::DeclinedByDriver),
            "NO_SHOW" => Ok(BookingStatus::NoShow),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// Fare components in minor currency units
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FareBreakdown {
    pub base_fare_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

/// Rating left by a passenger after a completed ride
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feedback {
    pub rating: i16,
    pub comment: Option<String>,
    pub tip_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// One leg of a purchase: a seat reservation on a single trip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trip_id: Uuid,
    /// Copied from the trip at booking time; the cancellation window is
    /// measured against this value even if the trip is rescheduled.
    pub departure_time: DateTime<Utc>,
    pub pickup_stop_id: Uuid,
    pub drop_off_stop_id: Uuid,
    pub booked_seat_ids: Vec<String>,
    pub number_of_seats_booked: i32,
    pub fare: FareBreakdown,
    pub payment: SettlementRecord,
    pub status: BookingStatus,
    pub round_trip_id: Option<Uuid>,
    pub boarding_code: Masked<String>,
    pub boarding_code_expires_at: DateTime<Utc>,
    pub cancellation_reason: Option<String>,
    pub driver_decline_reason: Option<String>,
    pub feedback: Option<Feedback>,
    pub idempotency_key: Option<String>,
    pub onboarded_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Update booking status
    pub fn update_status(&mut self, new_status: BookingStatus, at: DateTime<Utc>) {
        self.status = new_status;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_round_trip_through_strings() {
        for status in [
            TripStatus::Scheduled,
            TripStatus::Full,
            TripStatus::Active,
            TripStatus::Completed,
            TripStatus::Cancelled,
            TripStatus::Delayed,
        ] {
            assert_eq!(status.as_str().parse::<TripStatus>().unwrap(), status);
        }
        assert_eq!(
            "DECLINED_BY_DRIVER".parse::<BookingStatus>().unwrap(),
            BookingStatus::DeclinedByDriver
        );
        assert!("BOGUS".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn bookable_trip_statuses() {
        assert!(TripStatus::Scheduled.is_bookable());
        assert!(TripStatus::Full.is_bookable());
        assert!(TripStatus::Delayed.is_bookable());
        assert!(!TripStatus::Active.is_bookable());
        assert!(!TripStatus::Completed.is_bookable());
        assert!(!TripStatus::Cancelled.is_bookable());

        assert!(TripStatus::Active.takes_returned_seats());
        assert!(TripStatus::Full.takes_returned_seats());
        assert!(!TripStatus::Completed.takes_returned_seats());
        assert!(!TripStatus::Cancelled.takes_returned_seats());
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&BookingStatus::CancelledByAdmin).unwrap();
        assert_eq!(json, "\"CANCELLED_BY_ADMIN\"");
        assert!(BookingStatus::Ongoing.holds_seats());
        assert!(!BookingStatus::CancelledByUser.holds_seats());
    }
}
