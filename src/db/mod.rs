pub mod mock_db;
pub mod payment_repository;
pub mod postgres_payment_repository;
pub mod postgres_quota_repository;
pub mod postgres_subscription_repository;
pub mod postgres_user_repository;
pub mod quota_repository;
pub mod subscription_repository;
pub mod user_repository;

/// Column list shared by every query that materialises a [`crate::models::user::User`].
pub(crate) const USER_COLUMNS: &str = r#"
    id,
    email,
    role,
    plan,
    quota_used,
    quota_total,
    last_quota_reset_date,
    auto_renew,
    subscription_expiry
"#;

pub(crate) const SUBSCRIPTION_COLUMNS: &str = r#"
    id,
    user_id,
    plan_id,
    provider_subscription_id,
    provider_status,
    billing_period,
    amount,
    started_at,
    cancelled_at,
    created_at,
    updated_at
"#;

pub(crate) const PAYMENT_COLUMNS: &str = r#"
    id,
    user_id,
    provider_payment_id,
    status,
    plan_id,
    amount,
    created_at
"#;
