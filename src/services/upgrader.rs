//! Payment ledger and plan upgrader.

use std::sync::Arc;

use rust_decimal::Decimal;
use time::{Duration, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use super::EntitlementError;
use crate::db::payment_repository::{PaymentApplication, PaymentRepository};
use crate::models::payment::{NewPaymentRecord, PaymentRecord, PAYMENT_STATUS_APPROVED};
use crate::utils::plan_catalog::grant_for;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Applied(PaymentRecord),
    /// The provider payment id was already in the ledger; nothing changed.
    Duplicate,
}

#[derive(Clone)]
pub struct PlanUpgrader {
    payments: Arc<dyn PaymentRepository>,
}

impl PlanUpgrader {
    pub fn new(payments: Arc<dyn PaymentRepository>) -> Self {
        Self { payments }
    }

    pub async fn handle_payment_approved(
        &self,
        provider_payment_id: &str,
        user_id: Uuid,
        purchased_plan_id: &str,
        transaction_amount: Decimal,
    ) -> Result<PaymentOutcome, EntitlementError> {
        self.handle_payment_approved_at(
            provider_payment_id,
            user_id,
            purchased_plan_id,
            transaction_amount,
            OffsetDateTime::now_utc(),
        )
        .await
    }

    pub async fn handle_payment_approved_at(
        &self,
        provider_payment_id: &str,
        user_id: Uuid,
        purchased_plan_id: &str,
        transaction_amount: Decimal,
        now: OffsetDateTime,
    ) -> Result<PaymentOutcome, EntitlementError> {
        if self
            .payments
            .find_by_provider_payment_id(provider_payment_id)
            .await?
            .is_some()
        {
            info!(%provider_payment_id, %user_id, "payment already applied");
            return Ok(PaymentOutcome::Duplicate);
        }

        let grant = grant_for(purchased_plan_id)
            .ok_or_else(|| EntitlementError::UnknownPlan(purchased_plan_id.to_string()))?;
        let expiry = now + Duration::days(grant.renewal_days);

        let record = NewPaymentRecord {
            user_id,
            provider_payment_id: provider_payment_id.to_string(),
            status: PAYMENT_STATUS_APPROVED.to_string(),
            plan_id: purchased_plan_id.to_string(),
            amount: transaction_amount,
            created_at: now,
        };

        match self
            .payments
            .apply_approved_payment(&record, &grant, expiry)
            .await?
        {
            PaymentApplication::Applied(payment) => {
                info!(
                    %provider_payment_id,
                    %user_id,
                    plan = %grant.plan,
                    daily_quota = grant.daily_quota,
                    "payment applied"
                );
                Ok(PaymentOutcome::Applied(payment))
            }
            // a concurrent delivery won between the lookup and the insert
            PaymentApplication::Duplicate => Ok(PaymentOutcome::Duplicate),
            PaymentApplication::UserMissing => Err(EntitlementError::UserNotFound),
        }
    }
}
