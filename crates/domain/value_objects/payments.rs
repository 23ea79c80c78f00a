use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::value_objects::enums::payment_statuses::PaymentStatus;
use crate::domain::value_objects::provider_webhook::{ProviderPaymentResource, ts_to_datetime};

/// One observation of a payment, from either the webhook path or the client
/// confirmation path. All ledger writes funnel through
/// `PaymentRepository::upsert_by_provider_payment_id` with one of these, so
/// `provider_payment_id` acts as the idempotency key for every caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpsert {
    pub provider_payment_id: String,
    pub subscription_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub provider_order_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub failure_reason: Option<String>,
    pub failure_code: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub received_via_webhook: bool,
}

impl PaymentUpsert {
    pub fn new(provider_payment_id: impl Into<String>, status: PaymentStatus) -> Self {
        Self {
            provider_payment_id: provider_payment_id.into(),
            subscription_id: None,
            user_id: None,
            provider_order_id: None,
            provider_subscription_id: None,
            amount_minor: None,
            currency: None,
            status,
            method: None,
            failure_reason: None,
            failure_code: None,
            paid_at: None,
            refunded_at: None,
            received_via_webhook: false,
        }
    }

    /// Builds an upsert from the provider's payment object. Never trusts a
    /// caller-asserted status; the caller passes the status it has verified.
    pub fn from_provider_resource(
        resource: &ProviderPaymentResource,
        status: PaymentStatus,
        received_via_webhook: bool,
    ) -> Self {
        let mut upsert = Self::new(resource.id.clone(), status);
        upsert.provider_order_id = resource.order_id.clone();
        upsert.amount_minor = resource.amount;
        upsert.currency = resource.currency.clone();
        upsert.method = resource.method.clone();
        upsert.failure_reason = resource.error_description.clone();
        upsert.failure_code = resource.error_code.clone();
        upsert.received_via_webhook = received_via_webhook;
        if status.is_corroborating() {
            upsert.paid_at = resource.created_at.and_then(ts_to_datetime);
        }
        upsert
    }
}
