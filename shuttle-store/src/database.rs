use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::{BusinessRules, DatabaseConfig};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rows of the `business_rules` table on top of `defaults`.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for (key, value) in rows {
            apply_rule(&mut rules, &key, &value);
        }
        Ok(rules)
    }
}

/// Apply one `{"value": ...}` override. Unknown keys and mistyped values are ignored.
pub fn apply_rule(rules: &mut BusinessRules, key: &str, value: &Value) {
    let Some(v) = value.get("value") else {
        warn!(rule_key = key, "business rule without a value field");
        return;
    };
    match key {
        "cancellation_notice_minutes" => {
            if let Some(n) = v.as_i64() {
                rules.cancellation_notice_minutes = n;
            }
        }
        "boarding_code_length" => {
            if let Some(n) = v.as_u64() {
                rules.boarding_code_length = n as usize;
            }
        }
        "boarding_code_validity_minutes" => {
            if let Some(n) = v.as_i64() {
                rules.boarding_code_validity_minutes = n;
            }
        }
        "tax_rate" => {
            if let Some(f) = v.as_f64() {
                rules.tax_rate = f;
            }
        }
        "rate_limit_per_minute" => {
            if let Some(n) = v.as_u64() {
                rules.rate_limit_per_minute = n;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_rules_override_defaults() {
        let mut rules = BusinessRules::default();
        apply_rule(&mut rules, "tax_rate", &json!({"value": 0.08}));
        apply_rule(&mut rules, "cancellation_notice_minutes", &json!({"value": 180}));
        assert_eq!(rules.tax_rate, 0.08);
        assert_eq!(rules.cancellation_notice_minutes, 180);
    }

    #[test]
    fn malformed_rules_are_ignored() {
        let mut rules = BusinessRules::default();
        apply_rule(&mut rules, "tax_rate", &json!({"value": "high"}));
        apply_rule(&mut rules, "tax_rate", &json!(0.5));
        apply_rule(&mut rules, "pricing_multiplier", &json!({"value": 2.0}));
        assert_eq!(rules, BusinessRules::default());
    }
}
