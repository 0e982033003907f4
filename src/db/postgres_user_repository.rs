use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{user_repository::UserRepository, USER_COLUMNS};
use crate::models::user::User;

pub struct PostgresUserRepository {
    pub pool: PgPool,
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn set_auto_renew(&self, user_id: Uuid, auto_renew: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET auto_renew = $2 WHERE id = $1")
            .bind(user_id)
            .bind(auto_renew)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
