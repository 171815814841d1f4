use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    Cash,
    Card,
    Gateway,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Gateway => "gateway",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wallet" => Ok(PaymentMethod::Wallet),
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "gateway" => Ok(PaymentMethod::Gateway),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Success,
    Failed,
    Pending,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Success => "SUCCESS",
            SettlementStatus::Failed => "FAILED",
            SettlementStatus::Pending => "PENDING",
        }
    }
}

impl FromStr for SettlementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(SettlementStatus::Success),
            "FAILED" => Ok(SettlementStatus::Failed),
            "PENDING" => Ok(SettlementStatus::Pending),
            other => Err(format!("unknown settlement status: {}", other)),
        }
    }
}

/// Outcome of resolving a payment method for an amount. Immutable once
/// attached to a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettlementRecord {
    pub method: PaymentMethod,
    pub gateway: String,
    pub transaction_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: SettlementStatus,
    pub settled_at: DateTime<Utc>,
}

/// Result of an atomic wallet debit performed inside the booking transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletDebit {
    pub success: bool,
    pub message: String,
    pub balance_after_cents: i64,
}

impl WalletDebit {
    pub fn debited(balance_after_cents: i64) -> Self {
        Self { success: true, message: "debited".to_string(), balance_after_cents }
    }

    /// Refusal that leaves the balance untouched.
    pub fn insufficient(balance_cents: i64, requested_cents: i64) -> Self {
        Self {
            success: false,
            message: format!(
                "insufficient wallet balance: {} available, {} required",
                balance_cents, requested_cents
            ),
            balance_after_cents: balance_cents,
        }
    }
}

/// External card/gateway provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorize and capture `amount_cents` for the user, returning the
    /// provider's settlement record.
    async fn settle(
        &self,
        user_id: Uuid,
        method: PaymentMethod,
        amount_cents: i64,
        currency: &str,
        reference: Option<&str>,
    ) -> CoreResult<SettlementRecord>;
}
