//! In-memory repository fakes mirroring the Postgres implementations'
//! semantics (keyed upsert merge, monotonic period clamp) closely enough to
//! exercise idempotency and race properties without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crates::domain::{
    entities::{
        payments::PaymentEntity,
        subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    },
    repositories::{payments::PaymentRepository, subscriptions::SubscriptionRepository},
    value_objects::{
        enums::{
            payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus,
        },
        payments::PaymentUpsert,
        subscriptions::{ProviderLinkage, SubscriptionPeriod, monotonic_forward},
    },
};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    rows: Mutex<HashMap<Uuid, SubscriptionEntity>>,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, entity: SubscriptionEntity) {
        self.rows.lock().unwrap().insert(entity.id, entity);
    }

    pub fn get(&self, id: Uuid) -> Option<SubscriptionEntity> {
        self.rows.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepo {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|row| row.user_id == user_id)
            .cloned())
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: String,
    ) -> Result<Option<SubscriptionEntity>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|row| {
                row.provider_subscription_id.as_deref() == Some(provider_subscription_id.as_str())
            })
            .cloned())
    }

    async fn create_trial(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows
            .values()
            .find(|row| row.user_id == insert_subscription_entity.user_id)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let entity = SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: insert_subscription_entity.user_id,
            external_user_id: insert_subscription_entity.external_user_id,
            status: insert_subscription_entity.status,
            trial_start: insert_subscription_entity.trial_start,
            trial_end: insert_subscription_entity.trial_end,
            trial_used: insert_subscription_entity.trial_used,
            provider_subscription_id: None,
            provider_plan_id: None,
            provider_customer_id: None,
            period_start: None,
            period_end: None,
            next_billing_at: None,
            cancelled_at: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        };
        rows.insert(entity.id, entity.clone());
        Ok(entity)
    }

    async fn attach_provider_subscription(
        &self,
        subscription_id: Uuid,
        linkage: ProviderLinkage,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&subscription_id)
            .ok_or_else(|| anyhow::anyhow!("subscription not found"))?;
        row.provider_subscription_id = Some(linkage.provider_subscription_id);
        row.provider_plan_id = Some(linkage.provider_plan_id);
        row.provider_customer_id = linkage.provider_customer_id;
        row.status = SubscriptionStatus::Created.to_string();
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn clear_provider_linkage(&self, subscription_id: Uuid) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&subscription_id)
            .ok_or_else(|| anyhow::anyhow!("subscription not found"))?;
        row.provider_subscription_id = None;
        row.provider_plan_id = None;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn transition(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        period: SubscriptionPeriod,
    ) -> Result<SubscriptionEntity> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&subscription_id)
            .ok_or_else(|| anyhow::anyhow!("subscription not found"))?;

        row.status = status.to_string();
        if period.clear_period {
            row.period_start = None;
            row.period_end = None;
            row.next_billing_at = None;
        } else {
            if let Some(period_start) = period.period_start {
                row.period_start = Some(period_start);
            }
            if let Some(candidate) = period.period_end {
                row.period_end = Some(monotonic_forward(row.period_end, candidate));
            }
            if let Some(candidate) = period.next_billing_at {
                row.next_billing_at = Some(monotonic_forward(row.next_billing_at, candidate));
            }
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn mark_cancelled(
        &self,
        subscription_id: Uuid,
        reason: Option<String>,
        cancelled_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&subscription_id)
            .ok_or_else(|| anyhow::anyhow!("subscription not found"))?;
        row.status = SubscriptionStatus::Cancelled.to_string();
        row.cancelled_at = Some(cancelled_at);
        row.cancel_reason = reason;
        row.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPaymentRepo {
    rows: Mutex<HashMap<String, PaymentEntity>>,
}

impl InMemoryPaymentRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get(&self, provider_payment_id: &str) -> Option<PaymentEntity> {
        self.rows.lock().unwrap().get(provider_payment_id).cloned()
    }

    fn entity_from_upsert(upsert: &PaymentUpsert, now: DateTime<Utc>) -> PaymentEntity {
        let amount_minor = upsert.amount_minor.unwrap_or(0);
        PaymentEntity {
            id: Uuid::new_v4(),
            provider_payment_id: upsert.provider_payment_id.clone(),
            subscription_id: upsert.subscription_id,
            user_id: upsert.user_id,
            provider_order_id: upsert.provider_order_id.clone(),
            provider_subscription_id: upsert.provider_subscription_id.clone(),
            amount_minor,
            amount_major: amount_minor as f64 / 100.0,
            currency: upsert.currency.clone().unwrap_or_else(|| "INR".to_string()),
            status: upsert.status.to_string(),
            method: upsert.method.clone(),
            failure_reason: upsert.failure_reason.clone(),
            failure_code: upsert.failure_code.clone(),
            paid_at: upsert.paid_at,
            refunded_at: upsert.refunded_at,
            received_via_webhook: upsert.received_via_webhook,
            processed_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepo {
    async fn upsert_by_provider_payment_id(
        &self,
        upsert: PaymentUpsert,
    ) -> Result<PaymentEntity> {
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();

        let merged = match rows.get(&upsert.provider_payment_id) {
            Some(existing) => existing.merge(&upsert, now),
            None => Self::entity_from_upsert(&upsert, now),
        };
        rows.insert(merged.provider_payment_id.clone(), merged.clone());
        Ok(merged)
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: String,
        statuses: Option<Vec<PaymentStatus>>,
    ) -> Result<Vec<PaymentEntity>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|row| {
                row.provider_subscription_id.as_deref()
                    == Some(provider_subscription_id.as_str())
            })
            .filter(|row| match statuses.as_ref() {
                Some(statuses) => statuses.contains(&row.payment_status()),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn exists(&self, provider_payment_id: String) -> Result<bool> {
        Ok(self.rows.lock().unwrap().contains_key(&provider_payment_id))
    }
}

/// A subscription row in `created`, linked to `sub_Nx01`, ready to activate.
pub fn created_subscription(user_id: Uuid) -> SubscriptionEntity {
    let now = Utc::now();
    SubscriptionEntity {
        id: Uuid::new_v4(),
        user_id,
        external_user_id: user_id.to_string(),
        status: SubscriptionStatus::Created.to_string(),
        trial_start: now - chrono::Duration::days(20),
        trial_end: now - chrono::Duration::days(6),
        trial_used: true,
        provider_subscription_id: Some("sub_Nx01".to_string()),
        provider_plan_id: Some("plan_monthly".to_string()),
        provider_customer_id: Some("cust_77".to_string()),
        period_start: None,
        period_end: None,
        next_billing_at: None,
        cancelled_at: None,
        cancel_reason: None,
        created_at: now,
        updated_at: now,
    }
}
