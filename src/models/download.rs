use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resource_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub downloaded_at: OffsetDateTime,
}
