pub mod calendar;
pub mod provider;
pub mod quota;
pub mod reconciler;
pub mod subscriptions;
pub mod upgrader;

use crate::services::provider::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    #[error("daily download quota exhausted")]
    QuotaExhausted,
    #[error("user already holds an authorized subscription")]
    AlreadySubscribed,
    #[error("no authorized subscription for user")]
    SubscriptionNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("resource not found")]
    ResourceNotFound,
    #[error("unknown plan: {0}")]
    UnknownPlan(String),
    #[error("invalid provider event: {0}")]
    InvalidEvent(String),
    #[error("payment provider unavailable: {0}")]
    ExternalProviderUnavailable(#[from] ProviderError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
