use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const PAYMENT_STATUS_APPROVED: &str = "approved";

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_payment_id: String,
    pub status: String,
    pub plan_id: String,
    pub amount: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub user_id: Uuid,
    pub provider_payment_id: String,
    pub status: String,
    pub plan_id: String,
    pub amount: Decimal,
    pub created_at: OffsetDateTime,
}
