use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::plan::BillingPeriod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "provider_status")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Authorized,
    Cancelled,
    Paused,
    Rejected,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Authorized => "authorized",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Rejected => "rejected",
        }
    }

    /// Statuses that stamp `cancelled_at` when entered.
    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Paused | SubscriptionStatus::Rejected
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown subscription status: {0}")]
pub struct UnknownSubscriptionStatus(pub String);

impl FromStr for SubscriptionStatus {
    type Err = UnknownSubscriptionStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(SubscriptionStatus::Pending),
            "authorized" => Ok(SubscriptionStatus::Authorized),
            // the provider spells it both ways depending on the endpoint
            "cancelled" | "canceled" => Ok(SubscriptionStatus::Cancelled),
            "paused" => Ok(SubscriptionStatus::Paused),
            "rejected" => Ok(SubscriptionStatus::Rejected),
            other => Err(UnknownSubscriptionStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub provider_subscription_id: String,
    pub provider_status: SubscriptionStatus,
    pub billing_period: BillingPeriod,
    pub amount: Decimal,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPendingSubscription {
    pub user_id: Uuid,
    pub plan_id: String,
    pub provider_subscription_id: String,
    pub billing_period: BillingPeriod,
    pub amount: Decimal,
    pub now: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_spellings() {
        assert_eq!(
            "authorized".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::Authorized
        );
        assert_eq!(
            "Canceled".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::Cancelled
        );
        assert!("finished".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn only_terminal_like_statuses_are_stopped() {
        assert!(!SubscriptionStatus::Pending.is_stopped());
        assert!(!SubscriptionStatus::Authorized.is_stopped());
        assert!(SubscriptionStatus::Cancelled.is_stopped());
        assert!(SubscriptionStatus::Paused.is_stopped());
        assert!(SubscriptionStatus::Rejected.is_stopped());
    }
}
