use chrono::Duration;
use shuttle_booking::{BookingRules, BookingService};
use shuttle_store::app_config::BusinessRules;
use shuttle_store::RedisClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: BookingService,
    /// `None` disables rate limiting.
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub rate_limit_per_minute: i64,
}

/// Translate configured business rules into booking-core rules.
pub fn booking_rules(rules: &BusinessRules) -> BookingRules {
    BookingRules {
        cancellation_notice: Duration::minutes(rules.cancellation_notice_minutes),
        boarding_code_length: rules.boarding_code_length,
        boarding_code_validity: Duration::minutes(rules.boarding_code_validity_minutes),
        tax_rate: rules.tax_rate,
    }
}
