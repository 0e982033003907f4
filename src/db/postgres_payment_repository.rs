use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::payment_repository::{PaymentApplication, PaymentRepository};
use crate::db::PAYMENT_COLUMNS;
use crate::models::payment::{NewPaymentRecord, PaymentRecord};
use crate::models::plan::PlanGrant;

pub struct PostgresPaymentRepository {
    pub pool: PgPool,
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment_records WHERE provider_payment_id = $1"
        );
        sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(provider_payment_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn apply_approved_payment(
        &self,
        record: &NewPaymentRecord,
        grant: &PlanGrant,
        subscription_expiry: OffsetDateTime,
    ) -> Result<PaymentApplication, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // quota_used only moves when a smaller plan would leave it above the new ceiling
        let upgraded = sqlx::query(
            r#"
            UPDATE users
            SET plan = $2,
                quota_total = $3,
                quota_used = LEAST(quota_used, $3),
                subscription_expiry = $4,
                auto_renew = TRUE
            WHERE id = $1
            "#,
        )
        .bind(record.user_id)
        .bind(&grant.plan)
        .bind(grant.daily_quota)
        .bind(subscription_expiry)
        .execute(&mut *tx)
        .await?;

        if upgraded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(PaymentApplication::UserMissing);
        }

        let sql = format!(
            r#"
            INSERT INTO payment_records (
                id,
                user_id,
                provider_payment_id,
                status,
                plan_id,
                amount,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (provider_payment_id) DO NOTHING
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(record.user_id)
            .bind(&record.provider_payment_id)
            .bind(&record.status)
            .bind(&record.plan_id)
            .bind(record.amount)
            .bind(record.created_at)
            .fetch_optional(&mut *tx)
            .await?;

        match inserted {
            Some(payment) => {
                tx.commit().await?;
                Ok(PaymentApplication::Applied(payment))
            }
            None => {
                // a concurrent delivery won the insert; undo our user update
                tx.rollback().await?;
                Ok(PaymentApplication::Duplicate)
            }
        }
    }
}
