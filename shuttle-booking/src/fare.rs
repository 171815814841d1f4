use shuttle_core::{CoreError, CoreResult, FareBreakdown};

/// Fare computation for a leg
#[derive(Debug, Clone, Copy)]
pub struct FarePolicy {
    /// Fraction of the base fare added as tax (0.05 = 5%).
    pub tax_rate: f64,
}

impl Default for FarePolicy {
    fn default() -> Self {
        Self { tax_rate: 0.0 }
    }
}

impl FarePolicy {
    pub fn new(tax_rate: f64) -> Self {
        Self { tax_rate }
    }

    pub fn quote(&self, price_per_seat_cents: i64, seats: i32) -> CoreResult<FareBreakdown> {
        let base = price_per_seat_cents
            .checked_mul(seats as i64)
            .ok_or_else(|| CoreError::internal("fare overflow"))?;
        let discount = 0;
        let tax = ((base - discount) as f64 * self.tax_rate).round() as i64;
        Ok(FareBreakdown {
            base_fare_cents: base,
            discount_cents: discount,
            tax_cents: tax,
            total_cents: base - discount + tax,
        })
    }
}
