use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "user_role")] // Matches the Postgres enum name
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Member,
    Admin,
}

/// The slice of the user record this service reads and mutates.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub plan: String,
    pub quota_used: i32,
    pub quota_total: i32,
    pub last_quota_reset_date: Date,
    pub auto_renew: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_expiry: Option<OffsetDateTime>,
}
