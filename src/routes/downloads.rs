use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::errors::entitlement_error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub user_id: Uuid,
    pub resource_id: Uuid,
}

// POST /api/downloads
pub async fn authorize_download(
    State(app_state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> Response {
    match app_state
        .quota
        .authorize_download(payload.user_id, payload.resource_id)
        .await
    {
        Ok(grant) => Json(grant).into_response(),
        Err(err) => entitlement_error_response(err),
    }
}

// GET /api/quota/{user_id}
pub async fn quota_status(
    State(app_state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Response {
    match app_state.quota.quota_status(user_id).await {
        Ok(status) => Json(status).into_response(),
        Err(err) => entitlement_error_response(err),
    }
}
