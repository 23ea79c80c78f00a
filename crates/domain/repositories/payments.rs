use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::payments::PaymentEntity;
use crate::domain::value_objects::{
    enums::payment_statuses::PaymentStatus, payments::PaymentUpsert,
};

#[async_trait]
#[automock]
pub trait PaymentRepository {
    /// Atomic find-or-create-then-merge keyed on `provider_payment_id`.
    /// Duplicate deliveries and racing code paths land on the same row.
    async fn upsert_by_provider_payment_id(&self, upsert: PaymentUpsert)
    -> Result<PaymentEntity>;

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: String,
        statuses: Option<Vec<PaymentStatus>>,
    ) -> Result<Vec<PaymentEntity>>;

    async fn exists(&self, provider_payment_id: String) -> Result<bool>;
}
