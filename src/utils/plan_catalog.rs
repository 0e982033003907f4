use once_cell::sync::Lazy;
use rust_decimal::Decimal;

use crate::models::plan::{BillingPeriod, Plan, PlanGrant};

pub const FREE_PLAN_ID: &str = "free";
pub const FREE_DAILY_QUOTA: i32 = 3;

static PLANS: Lazy<Vec<Plan>> = Lazy::new(|| {
    vec![
        Plan {
            id: FREE_PLAN_ID,
            tier: FREE_PLAN_ID,
            daily_quota: FREE_DAILY_QUOTA,
            price: Decimal::ZERO,
            billing_period: BillingPeriod::None,
            active: true,
        },
        Plan {
            id: "premium_monthly",
            tier: "premium",
            daily_quota: 20,
            price: Decimal::new(2990, 2),
            billing_period: BillingPeriod::Monthly,
            active: true,
        },
        Plan {
            id: "premium_annual",
            tier: "premium",
            daily_quota: 20,
            price: Decimal::new(29999, 2),
            billing_period: BillingPeriod::Annual,
            active: true,
        },
        Plan {
            id: "ministry_monthly",
            tier: "ministry",
            daily_quota: 50,
            price: Decimal::new(4990, 2),
            billing_period: BillingPeriod::Monthly,
            active: true,
        },
        Plan {
            id: "ministry_annual",
            tier: "ministry",
            daily_quota: 50,
            price: Decimal::new(49990, 2),
            billing_period: BillingPeriod::Annual,
            active: true,
        },
    ]
});

pub fn all_plans() -> &'static [Plan] {
    PLANS.as_slice()
}

/// Exact-match lookup. Identifiers are never normalised or substring-matched.
pub fn find_plan(id: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|plan| plan.id == id)
}

pub fn free_plan() -> &'static Plan {
    // the free entry is the first element of the static table above
    &PLANS[0]
}

/// Resolves the recurring offer a subscription request refers to. Accepts either
/// a tier (`"ministry"`, paired with `period`) or a full plan id (`"ministry_monthly"`).
pub fn recurring_offer(plan_id: &str, period: BillingPeriod) -> Option<&'static Plan> {
    let plan = find_plan(plan_id).or_else(|| {
        PLANS
            .iter()
            .find(|plan| plan.tier == plan_id && plan.billing_period == period)
    })?;
    if !plan.active || plan.billing_period == BillingPeriod::None {
        return None;
    }
    Some(plan)
}

/// Maps the plan id echoed back on an approved payment to the entitlement it buys.
/// Inactive plans still resolve so in-flight renewals of retired offers are honoured.
pub fn grant_for(purchased_plan_id: &str) -> Option<PlanGrant> {
    let plan = find_plan(purchased_plan_id)?;
    if plan.billing_period == BillingPeriod::None {
        return None;
    }
    Some(PlanGrant {
        plan: plan.tier.to_string(),
        daily_quota: plan.daily_quota,
        renewal_days: plan.billing_period.renewal_days(),
    })
}

pub fn is_paid_tier(tier: &str) -> bool {
    tier != FREE_PLAN_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_lookup_is_exact() {
        let grant = grant_for("premium_annual").expect("annual grant");
        assert_eq!(grant.plan, "premium");
        assert_eq!(grant.daily_quota, 20);
        assert_eq!(grant.renewal_days, 365);

        // no fuzzy matching on ids that merely contain a plan name
        assert!(grant_for("Premium Annual").is_none());
        assert!(grant_for("premium_annual_promo").is_none());
        assert!(grant_for("premium").is_none());
    }

    #[test]
    fn free_plan_is_not_purchasable() {
        assert!(grant_for(FREE_PLAN_ID).is_none());
        assert!(recurring_offer(FREE_PLAN_ID, BillingPeriod::Monthly).is_none());
        assert_eq!(free_plan().daily_quota, FREE_DAILY_QUOTA);
    }

    #[test]
    fn recurring_offer_accepts_tier_and_period() {
        let offer = recurring_offer("ministry", BillingPeriod::Monthly).unwrap();
        assert_eq!(offer.id, "ministry_monthly");
        assert_eq!(offer.price, Decimal::new(4990, 2));

        let exact = recurring_offer("premium_annual", BillingPeriod::Monthly).unwrap();
        assert_eq!(exact.billing_period, BillingPeriod::Annual);

        assert!(recurring_offer("gold", BillingPeriod::Monthly).is_none());
    }

    #[test]
    fn catalog_ids_are_unique() {
        let mut ids: Vec<_> = all_plans().iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), all_plans().len());
    }
}
