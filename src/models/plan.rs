use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "billing_period")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Annual,
    None,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Annual => "annual",
            BillingPeriod::None => "none",
        }
    }

    /// Days of access one approved payment buys.
    pub fn renewal_days(&self) -> i64 {
        match self {
            BillingPeriod::Monthly => 30,
            BillingPeriod::Annual => 365,
            BillingPeriod::None => 0,
        }
    }

    /// Months between provider charges, `None` for one-off plans.
    pub fn frequency_months(&self) -> Option<u32> {
        match self {
            BillingPeriod::Monthly => Some(1),
            BillingPeriod::Annual => Some(12),
            BillingPeriod::None => None,
        }
    }
}

/// A purchasable offer. `id` is the exact identifier the provider echoes back
/// on payments; `tier` is what gets stored on the user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: &'static str,
    pub tier: &'static str,
    pub daily_quota: i32,
    pub price: Decimal,
    pub billing_period: BillingPeriod,
    pub active: bool,
}

/// What an approved payment for a plan grants to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanGrant {
    pub plan: String,
    pub daily_quota: i32,
    pub renewal_days: i64,
}
