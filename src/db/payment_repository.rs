use async_trait::async_trait;
use time::OffsetDateTime;

use crate::models::payment::{NewPaymentRecord, PaymentRecord};
use crate::models::plan::PlanGrant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentApplication {
    Applied(PaymentRecord),
    Duplicate,
    UserMissing,
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;

    /// Appends the ledger row and applies the grant to the user atomically.
    /// A provider payment id that is already recorded yields `Duplicate` and
    /// leaves the user untouched.
    async fn apply_approved_payment(
        &self,
        record: &NewPaymentRecord,
        grant: &PlanGrant,
        subscription_expiry: OffsetDateTime,
    ) -> Result<PaymentApplication, sqlx::Error>;
}
