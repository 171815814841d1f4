use async_trait::async_trait;
use chrono::Utc;
use shuttle_core::payment::PaymentGateway;
use shuttle_core::{CoreError, CoreResult, PaymentMethod, SettlementRecord, SettlementStatus, StoreTx};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// What is being paid for one leg
#[derive(Debug, Clone, Copy)]
pub struct PaymentRequest<'a> {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub method: PaymentMethod,
    pub reference: Option<&'a str>,
}

/// Dispatches a payment method to the right settlement strategy.
///
/// Failures leave no trace of their own: the enclosing transaction is rolled
/// back by the caller.
#[derive(Clone)]
pub struct PaymentResolver {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentResolver {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    pub async fn resolve(&self, tx: &mut dyn StoreTx, req: PaymentRequest<'_>) -> CoreResult<SettlementRecord> {
        if req.amount_cents <= 0 {
            return Ok(settled(req.method, "promotional", local_reference("PROMO"), 0, req.currency));
        }

        match req.method {
            PaymentMethod::Wallet => {
                let debit = tx.debit_wallet(req.user_id, req.amount_cents).await?;
                if !debit.success {
                    return Err(CoreError::Forbidden(debit.message));
                }
                info!(
                    user_id = %req.user_id,
                    amount = req.amount_cents,
                    balance_after = debit.balance_after_cents,
                    "wallet debited"
                );
                Ok(settled(req.method, "wallet", local_reference("WALLET"), req.amount_cents, req.currency))
            }
            // Collected by the driver at pickup.
            PaymentMethod::Cash => {
                Ok(settled(req.method, "cash", local_reference("CASH"), req.amount_cents, req.currency))
            }
            PaymentMethod::Card | PaymentMethod::Gateway => {
                let record = self
                    .gateway
                    .settle(req.user_id, req.method, req.amount_cents, req.currency, req.reference)
                    .await?;
                if record.status != SettlementStatus::Success {
                    return Err(CoreError::forbidden(format!(
                        "payment was not authorized (status {})",
                        record.status.as_str()
                    )));
                }
                Ok(record)
            }
        }
    }
}

/// Gateway branch that records the caller's reference as a successful
/// settlement without contacting a provider. Replace with a real adapter
/// before taking card payments.
pub struct PassthroughGateway;

#[async_trait]
impl PaymentGateway for PassthroughGateway {
    async fn settle(
        &self,
        _user_id: Uuid,
        method: PaymentMethod,
        amount_cents: i64,
        currency: &str,
        reference: Option<&str>,
    ) -> CoreResult<SettlementRecord> {
        let reference = match reference.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => r.to_string(),
            None => {
                warn!("no gateway reference supplied, generating placeholder");
                local_reference("GW")
            }
        };
        Ok(settled(method, "external", reference, amount_cents, currency))
    }
}

fn settled(method: PaymentMethod, gateway: &str, reference: String, amount_cents: i64, currency: &str) -> SettlementRecord {
    SettlementRecord {
        method,
        gateway: gateway.to_string(),
        transaction_reference: reference,
        amount_cents,
        currency: currency.to_string(),
        status: SettlementStatus::Success,
        settled_at: Utc::now(),
    }
}

fn local_reference(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple().to_string().to_uppercase())
}
