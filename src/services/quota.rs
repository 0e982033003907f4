//! Quota ledger: per-user daily download allowance with same-day re-download amnesty.

use std::sync::Arc;

use serde::Serialize;
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::calendar::{reset_due, ProviderCalendar};
use super::EntitlementError;
use crate::db::quota_repository::{DownloadConsumption, QuotaRepository};
use crate::models::user::User;
use crate::utils::plan_catalog::{free_plan, is_paid_tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadGrant {
    pub granted: bool,
    pub quota_used: i32,
    /// Same resource already fetched today; no quota consumed.
    pub free_redownload: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub plan: String,
    pub quota_used: i32,
    pub quota_total: i32,
    pub remaining: i32,
    pub resets_on: Date,
}

#[derive(Clone)]
pub struct QuotaLedger {
    repo: Arc<dyn QuotaRepository>,
    calendar: ProviderCalendar,
}

impl QuotaLedger {
    pub fn new(repo: Arc<dyn QuotaRepository>, calendar: ProviderCalendar) -> Self {
        Self { repo, calendar }
    }

    pub async fn authorize_download(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> Result<DownloadGrant, EntitlementError> {
        self.authorize_download_at(user_id, resource_id, OffsetDateTime::now_utc())
            .await
    }

    pub async fn authorize_download_at(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<DownloadGrant, EntitlementError> {
        let account = self.find_account(user_id).await?;
        if lapsed(&account, now) {
            self.revert_to_free(account, now).await?;
        }

        let window = self.calendar.window(now);
        let outcome = self
            .repo
            .try_consume_download(user_id, resource_id, &window, now)
            .await?;

        match outcome {
            DownloadConsumption::Consumed { quota_used } => {
                info!(%user_id, %resource_id, quota_used, "download granted");
                Ok(DownloadGrant {
                    granted: true,
                    quota_used,
                    free_redownload: false,
                })
            }
            DownloadConsumption::AlreadyDownloadedToday { quota_used } => {
                debug!(%user_id, %resource_id, "same-day re-download");
                Ok(DownloadGrant {
                    granted: true,
                    quota_used,
                    free_redownload: true,
                })
            }
            DownloadConsumption::Exhausted {
                quota_used,
                quota_total,
            } => {
                warn!(%user_id, %resource_id, quota_used, quota_total, "daily quota exhausted");
                Err(EntitlementError::QuotaExhausted)
            }
            DownloadConsumption::UserMissing => Err(EntitlementError::UserNotFound),
            DownloadConsumption::ResourceMissing => Err(EntitlementError::ResourceNotFound),
        }
    }

    pub async fn quota_status(&self, user_id: Uuid) -> Result<QuotaStatus, EntitlementError> {
        self.quota_status_at(user_id, OffsetDateTime::now_utc()).await
    }

    /// Effective allowance after the calendar gate and plan lapse. Read-only:
    /// neither the rollover nor the lapse is written back.
    pub async fn quota_status_at(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<QuotaStatus, EntitlementError> {
        let mut user = self.find_account(user_id).await?;
        if lapsed(&user, now) {
            let free = free_plan();
            user.plan = free.tier.to_string();
            user.quota_total = free.daily_quota;
            user.quota_used = user.quota_used.min(free.daily_quota);
        }
        let today = self.calendar.today(now);

        let quota_used = if reset_due(user.last_quota_reset_date, today) {
            0
        } else {
            user.quota_used
        };

        Ok(QuotaStatus {
            plan: user.plan,
            quota_used,
            quota_total: user.quota_total,
            remaining: (user.quota_total - quota_used).max(0),
            resets_on: today.next_day().unwrap_or(today),
        })
    }

    async fn find_account(&self, user_id: Uuid) -> Result<User, EntitlementError> {
        self.repo
            .find_quota_account(user_id)
            .await?
            .ok_or(EntitlementError::UserNotFound)
    }

    /// Drops lapsed paid access back to the free plan.
    async fn revert_to_free(&self, user: User, now: OffsetDateTime) -> Result<User, EntitlementError> {
        let free = free_plan();
        match self
            .repo
            .revert_lapsed_plan(user.id, free.tier, free.daily_quota, now)
            .await?
        {
            Some(reverted) => {
                info!(user_id = %user.id, previous_plan = %user.plan, "paid access lapsed, reverted to free plan");
                Ok(reverted)
            }
            None => Ok(user),
        }
    }
}

fn lapsed(user: &User, now: OffsetDateTime) -> bool {
    is_paid_tier(&user.plan) && user.subscription_expiry.is_some_and(|expiry| expiry <= now)
}
