use axum::{response::IntoResponse, Json};

use crate::utils::plan_catalog::all_plans;

// GET /api/plans
pub async fn list_plans() -> impl IntoResponse {
    let plans: Vec<_> = all_plans().iter().filter(|plan| plan.active).collect();
    Json(plans)
}
