use async_trait::async_trait;
use uuid::Uuid;

use crate::models::user::User;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;

    /// Returns `false` when no such user exists.
    async fn set_auto_renew(&self, user_id: Uuid, auto_renew: bool) -> Result<bool, sqlx::Error>;
}
