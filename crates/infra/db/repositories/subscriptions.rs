use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions},
};
use domain::{
    entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::{
        enums::subscription_statuses::SubscriptionStatus,
        subscriptions::{ProviderLinkage, SubscriptionPeriod, monotonic_forward},
    },
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: String,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = subscriptions::table
            .filter(subscriptions::provider_subscription_id.eq(provider_subscription_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn create_trial(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let user_id = insert_subscription_entity.user_id;

        // One record per user: a concurrent or repeated call hits the unique
        // index and falls through to the existing row untouched.
        let inserted = insert_into(subscriptions::table)
            .values(&insert_subscription_entity)
            .on_conflict(subscriptions::user_id)
            .do_nothing()
            .returning(SubscriptionEntity::as_select())
            .get_result::<SubscriptionEntity>(&mut conn)
            .optional()?;

        if let Some(created) = inserted {
            return Ok(created);
        }

        let existing = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)?;

        Ok(existing)
    }

    async fn attach_provider_subscription(
        &self,
        subscription_id: Uuid,
        linkage: ProviderLinkage,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table)
            .filter(subscriptions::id.eq(subscription_id))
            .set((
                subscriptions::provider_subscription_id.eq(linkage.provider_subscription_id),
                subscriptions::provider_plan_id.eq(linkage.provider_plan_id),
                subscriptions::provider_customer_id.eq(linkage.provider_customer_id),
                subscriptions::status.eq(SubscriptionStatus::Created.to_string()),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn clear_provider_linkage(&self, subscription_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table)
            .filter(subscriptions::id.eq(subscription_id))
            .set((
                subscriptions::provider_subscription_id.eq(None::<String>),
                subscriptions::provider_plan_id.eq(None::<String>),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn transition(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        period: SubscriptionPeriod,
    ) -> Result<SubscriptionEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<SubscriptionEntity, anyhow::Error, _>(|conn| {
            let existing = subscriptions::table
                .filter(subscriptions::id.eq(subscription_id))
                .select(SubscriptionEntity::as_select())
                .for_update()
                .first::<SubscriptionEntity>(conn)?;

            // Period fields never move backward (I3); candidates are clamped
            // against the locked row inside the same transaction.
            let (period_start, period_end, next_billing_at) = if period.clear_period {
                (None, None, None)
            } else {
                let period_start = period.period_start.or(existing.period_start);
                let period_end = match period.period_end {
                    Some(candidate) => Some(monotonic_forward(existing.period_end, candidate)),
                    None => existing.period_end,
                };
                let next_billing_at = match period.next_billing_at {
                    Some(candidate) => {
                        Some(monotonic_forward(existing.next_billing_at, candidate))
                    }
                    None => existing.next_billing_at,
                };
                (period_start, period_end, next_billing_at)
            };

            let updated = update(subscriptions::table)
                .filter(subscriptions::id.eq(subscription_id))
                .set((
                    subscriptions::status.eq(status.to_string()),
                    subscriptions::period_start.eq(period_start),
                    subscriptions::period_end.eq(period_end),
                    subscriptions::next_billing_at.eq(next_billing_at),
                    subscriptions::updated_at.eq(Utc::now()),
                ))
                .returning(SubscriptionEntity::as_select())
                .get_result::<SubscriptionEntity>(conn)?;

            Ok(updated)
        })
    }

    async fn mark_cancelled(
        &self,
        subscription_id: Uuid,
        reason: Option<String>,
        cancelled_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table)
            .filter(subscriptions::id.eq(subscription_id))
            .set((
                subscriptions::status.eq(SubscriptionStatus::Cancelled.to_string()),
                subscriptions::cancelled_at.eq(Some(cancelled_at)),
                subscriptions::cancel_reason.eq(reason),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
