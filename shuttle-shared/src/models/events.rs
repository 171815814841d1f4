use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notifications emitted after a booking transaction commits.
///
/// Consumers (push notifications, live tracking, reporting) subscribe to these;
/// they are never part of the transaction that produced them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    BookingConfirmed {
        booking_id: Uuid,
        trip_id: Uuid,
        user_id: Uuid,
        seats: i32,
        round_trip_id: Option<Uuid>,
        timestamp: i64,
    },
    BookingReleased {
        booking_id: Uuid,
        trip_id: Uuid,
        status: String,
        seats_restored: i32,
        timestamp: i64,
    },
    PassengerOnboarded {
        booking_id: Uuid,
        trip_id: Uuid,
        driver_id: Uuid,
        timestamp: i64,
    },
    BookingCompleted {
        booking_id: Uuid,
        trip_id: Uuid,
        timestamp: i64,
    },
    TripCapacityChanged {
        trip_id: Uuid,
        current_seats: i32,
        status: String,
        timestamp: i64,
    },
}

impl PlatformEvent {
    /// Routing key for the event (the trip it concerns).
    pub fn trip_id(&self) -> Uuid {
        match self {
            PlatformEvent::BookingConfirmed { trip_id, .. }
            | PlatformEvent::BookingReleased { trip_id, .. }
            | PlatformEvent::PassengerOnboarded { trip_id, .. }
            | PlatformEvent::BookingCompleted { trip_id, .. }
            | PlatformEvent::TripCapacityChanged { trip_id, .. } => *trip_id,
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            PlatformEvent::BookingConfirmed { .. } => "booking.confirmed",
            PlatformEvent::BookingReleased { .. } => "booking.released",
            PlatformEvent::PassengerOnboarded { .. } => "booking.onboarded",
            PlatformEvent::BookingCompleted { .. } => "booking.completed",
            PlatformEvent::TripCapacityChanged { .. } => "trip.capacity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let trip_id = Uuid::new_v4();
        let event = PlatformEvent::TripCapacityChanged {
            trip_id,
            current_seats: 0,
            status: "FULL".to_string(),
            timestamp: 1_700_000_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "trip_capacity_changed");
        assert_eq!(json["status"], "FULL");
        assert_eq!(event.trip_id(), trip_id);
        assert_eq!(event.topic(), "trip.capacity");
    }
}
