use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity};
use crate::domain::value_objects::{
    enums::subscription_statuses::SubscriptionStatus,
    subscriptions::{ProviderLinkage, SubscriptionPeriod},
};

#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: String,
    ) -> Result<Option<SubscriptionEntity>>;

    /// Idempotent per user: returns the existing record untouched when one
    /// already exists, so a second call never re-grants a trial window.
    async fn create_trial(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity>;

    async fn attach_provider_subscription(
        &self,
        subscription_id: Uuid,
        linkage: ProviderLinkage,
    ) -> Result<()>;

    async fn clear_provider_linkage(&self, subscription_id: Uuid) -> Result<()>;

    /// Moves the record to `status` and applies period fields under the
    /// forward-only rule: an update may never pull `period_end` or
    /// `next_billing_at` backward.
    async fn transition(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        period: SubscriptionPeriod,
    ) -> Result<SubscriptionEntity>;

    async fn mark_cancelled(
        &self,
        subscription_id: Uuid,
        reason: Option<String>,
        cancelled_at: DateTime<Utc>,
    ) -> Result<()>;
}
