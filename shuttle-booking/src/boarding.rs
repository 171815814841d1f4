use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use shuttle_core::{Booking, CoreError, CoreResult};
use shuttle_shared::Masked;

/// Issues and checks the one-time codes passengers show at pickup
#[derive(Debug, Clone, Copy)]
pub struct BoardingCodes {
    pub length: usize,
    /// How long after departure a code stays valid.
    pub validity: Duration,
}

impl Default for BoardingCodes {
    fn default() -> Self {
        Self { length: 6, validity: Duration::minutes(120) }
    }
}

impl BoardingCodes {
    pub fn new(length: usize, validity: Duration) -> Self {
        Self { length: length.max(4), validity }
    }

    /// Generate a numeric code and its expiry for a trip departing at `departure`.
    pub fn issue(&self, departure: DateTime<Utc>) -> (Masked<String>, DateTime<Utc>) {
        let mut rng = rand::thread_rng();
        let code: String = (0..self.length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        (Masked::new(code), departure + self.validity)
    }

    pub fn verify(&self, booking: &Booking, presented: &str, now: DateTime<Utc>) -> CoreResult<()> {
        if now > booking.boarding_code_expires_at {
            return Err(CoreError::bad_request("boarding code has expired"));
        }
        if booking.boarding_code.expose() != presented.trim() {
            return Err(CoreError::bad_request("boarding code does not match"));
        }
        Ok(())
    }
}
