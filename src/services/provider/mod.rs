//! External payment provider (recurring preapprovals and one-off payments).
//!
//! Every response here is the provider's current truth; callers never trust
//! webhook bodies for anything beyond the id to re-read.
use std::fmt;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::subscription::SubscriptionStatus;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(String),
    #[error("provider request timed out")]
    Timeout,
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("could not decode provider response: {0}")]
    Decode(String),
    #[error("provider reported unknown status: {0}")]
    UnknownStatus(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

/// The `external_reference` stamped on a preapproval. The provider copies it
/// onto every payment the preapproval produces, so it carries both the user
/// and the purchased plan: `<user id>:<plan id>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalReference {
    pub user_id: Uuid,
    pub plan_id: Option<String>,
}

impl ExternalReference {
    pub fn new(user_id: Uuid, plan_id: &str) -> Self {
        Self {
            user_id,
            plan_id: Some(plan_id.to_string()),
        }
    }

    /// Accepts `<user id>:<plan id>` as well as a bare user id.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (user, plan) = match raw.split_once(':') {
            Some((user, plan)) => (user, Some(plan.trim())),
            None => (raw, None),
        };
        Some(Self {
            user_id: Uuid::parse_str(user.trim()).ok()?,
            plan_id: plan.filter(|p| !p.is_empty()).map(|p| p.to_string()),
        })
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.plan_id {
            Some(plan_id) => write!(f, "{}:{}", self.user_id, plan_id),
            None => write!(f, "{}", self.user_id),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreapprovalRequest {
    pub reason: String,
    pub payer_email: String,
    pub back_url: String,
    pub user_id: Uuid,
    pub plan_id: String,
    pub amount: Decimal,
    pub frequency_months: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPreapproval {
    pub provider_subscription_id: String,
    pub checkout_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreapprovalState {
    pub provider_subscription_id: String,
    pub status: SubscriptionStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub provider_payment_id: String,
    pub status: String,
    pub external_reference: Option<String>,
    pub amount: Decimal,
    pub purchased_plan_id: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_preapproval(
        &self,
        req: &PreapprovalRequest,
    ) -> Result<CreatedPreapproval, ProviderError>;

    async fn get_preapproval(
        &self,
        provider_subscription_id: &str,
    ) -> Result<PreapprovalState, ProviderError>;

    async fn cancel_preapproval(&self, provider_subscription_id: &str)
        -> Result<(), ProviderError>;

    async fn get_payment(&self, provider_payment_id: &str) -> Result<PaymentInfo, ProviderError>;
}

mod live;
mod mock;

pub use live::LivePaymentProvider;
#[allow(unused_imports)]
pub use mock::MockPaymentProvider;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_reference_carries_user_and_plan() {
        let user_id = Uuid::new_v4();
        let encoded = ExternalReference::new(user_id, "premium_annual").to_string();
        assert_eq!(encoded, format!("{user_id}:premium_annual"));
        assert_eq!(
            ExternalReference::parse(&encoded),
            Some(ExternalReference::new(user_id, "premium_annual"))
        );
    }

    #[test]
    fn external_reference_accepts_bare_user_id() {
        let user_id = Uuid::new_v4();
        let parsed = ExternalReference::parse(&user_id.to_string()).unwrap();
        assert_eq!(parsed.user_id, user_id);
        assert!(parsed.plan_id.is_none());

        assert!(ExternalReference::parse("not-a-user:premium_annual").is_none());
        assert!(ExternalReference::parse(&format!("{user_id}:"))
            .unwrap()
            .plan_id
            .is_none());
    }
}
