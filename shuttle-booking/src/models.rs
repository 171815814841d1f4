use serde::{Deserialize, Serialize};
use shuttle_core::{Booking, CoreError, CoreResult, PaymentMethod};
use std::collections::HashSet;
use uuid::Uuid;

/// Seats requested on one trip between two of its stops
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegRequest {
    pub trip_id: Uuid,
    pub pickup_stop_id: Uuid,
    pub drop_off_stop_id: Uuid,
    pub seat_ids: Vec<String>,
}

impl LegRequest {
    /// Shape checks that need no storage access.
    pub fn check_shape(&self) -> CoreResult<()> {
        if self.seat_ids.is_empty() {
            return Err(CoreError::bad_request("at least one seat id is required"));
        }
        let mut seen = HashSet::new();
        for seat in &self.seat_ids {
            if seat.trim().is_empty() {
                return Err(CoreError::bad_request("seat ids must not be blank"));
            }
            if !seen.insert(seat.as_str()) {
                return Err(CoreError::bad_request(format!("seat {} requested twice", seat)));
            }
        }
        if self.pickup_stop_id == self.drop_off_stop_id {
            return Err(CoreError::bad_request("pickup and drop-off stops must differ"));
        }
        Ok(())
    }

    pub fn seat_count(&self) -> i32 {
        self.seat_ids.len() as i32
    }
}

/// Which legs a purchase covers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripSelection {
    OneWay {
        leg: LegRequest,
    },
    RoundTrip {
        onward: LegRequest,
        #[serde(rename = "return")]
        return_leg: LegRequest,
    },
}

impl TripSelection {
    pub fn onward(&self) -> &LegRequest {
        match self {
            TripSelection::OneWay { leg } => leg,
            TripSelection::RoundTrip { onward, .. } => onward,
        }
    }

    pub fn return_leg(&self) -> Option<&LegRequest> {
        match self {
            TripSelection::OneWay { .. } => None,
            TripSelection::RoundTrip { return_leg, .. } => Some(return_leg),
        }
    }

    pub fn legs(&self) -> Vec<&LegRequest> {
        let mut legs = vec![self.onward()];
        legs.extend(self.return_leg());
        legs
    }

    /// Trip ids in canonical lock order (ascending, deduplicated).
    pub fn lock_order(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.legs().iter().map(|l| l.trip_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn check_shape(&self) -> CoreResult<()> {
        for leg in self.legs() {
            leg.check_shape()?;
        }
        if let TripSelection::RoundTrip { onward, return_leg } = self {
            if onward.trip_id == return_leg.trip_id {
                return Err(CoreError::bad_request(
                    "onward and return legs must be on different trips",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub trip: TripSelection,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Persisted legs of one purchase
#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    #[serde(rename = "onward_booking")]
    pub onward: Booking,
    #[serde(rename = "return_booking")]
    pub return_leg: Option<Booking>,
    /// True when an idempotency key matched an earlier purchase.
    #[serde(skip)]
    pub replayed: bool,
}

impl BookingOutcome {
    pub fn bookings(&self) -> Vec<&Booking> {
        let mut all = vec![&self.onward];
        all.extend(self.return_leg.as_ref());
        all
    }
}
