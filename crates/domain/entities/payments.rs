use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::payment_statuses::PaymentStatus, payments::PaymentUpsert,
};
use crate::infra::db::postgres::schema::payments;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable, AsChangeset)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub provider_payment_id: String,
    pub subscription_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub provider_order_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub amount_minor: i64,
    pub amount_major: f64,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
    pub failure_reason: Option<String>,
    pub failure_code: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub received_via_webhook: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub provider_payment_id: String,
    pub subscription_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub provider_order_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub amount_minor: i64,
    pub amount_major: f64,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
    pub failure_reason: Option<String>,
    pub failure_code: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub received_via_webhook: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

impl InsertPaymentEntity {
    pub fn from_upsert(upsert: &PaymentUpsert, now: DateTime<Utc>) -> Self {
        let amount_minor = upsert.amount_minor.unwrap_or(0);
        Self {
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
        }
    }
}

impl PaymentEntity {
    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.status).unwrap_or(PaymentStatus::Created)
    }

    /// Merges a later observation of the same provider payment into this row.
    /// Status only moves to an equal or higher rank; link and detail fields
    /// are back-filled when absent, never blanked by a sparser duplicate.
    pub fn merge(&self, incoming: &PaymentUpsert, now: DateTime<Utc>) -> PaymentEntity {
        let mut merged = self.clone();

        if incoming.status.rank() >= merged.payment_status().rank() {
            merged.status = incoming.status.to_string();
            if incoming.paid_at.is_some() {
                merged.paid_at = incoming.paid_at;
            }
            if incoming.refunded_at.is_some() {
                merged.refunded_at = incoming.refunded_at;
            }
            if incoming.failure_reason.is_some() {
                merged.failure_reason = incoming.failure_reason.clone();
            }
            if incoming.failure_code.is_some() {
                merged.failure_code = incoming.failure_code.clone();
            }
        }

        merged.subscription_id = merged.subscription_id.or(incoming.subscription_id);
        merged.user_id = merged.user_id.or(incoming.user_id);
        merged.provider_order_id = merged
            .provider_order_id
            .take()
            .or_else(|| incoming.provider_order_id.clone());
        merged.provider_subscription_id = merged
            .provider_subscription_id
            .take()
            .or_else(|| incoming.provider_subscription_id.clone());
        merged.method = merged.method.take().or_else(|| incoming.method.clone());

        if merged.amount_minor == 0 {
            if let Some(amount) = incoming.amount_minor {
                merged.amount_minor = amount;
                merged.amount_major = amount as f64 / 100.0;
            }
        }
        if let Some(currency) = incoming.currency.clone() {
            if merged.currency.is_empty() {
                merged.currency = currency;
            }
        }

        merged.received_via_webhook = merged.received_via_webhook || incoming.received_via_webhook;
        merged.processed_at = Some(now);
        merged.updated_at = now;
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured_row(now: DateTime<Utc>) -> PaymentEntity {
        PaymentEntity {
            id: Uuid::new_v4(),
            provider_payment_id: "pay_Ab99".to_string(),
            subscription_id: None,
            user_id: None,
            provider_order_id: None,
            provider_subscription_id: Some("sub_Nx01".to_string()),
            amount_minor: 49900,
            amount_major: 499.0,
            currency: "INR".to_string(),
            status: PaymentStatus::Captured.to_string(),
            method: None,
            failure_reason: None,
            failure_code: None,
            paid_at: Some(now),
            refunded_at: None,
            received_via_webhook: true,
            processed_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stale_authorized_duplicate_cannot_regress_captured() {
        let now = Utc::now();
        let row = captured_row(now);
        let stale = PaymentUpsert::new("pay_Ab99", PaymentStatus::Authorized);

        let merged = row.merge(&stale, now);
        assert_eq!(merged.payment_status(), PaymentStatus::Captured);
        assert_eq!(merged.paid_at, Some(now));
    }

    #[test]
    fn merge_backfills_missing_link_fields_without_blanking() {
        let now = Utc::now();
        let row = captured_row(now);
        let user_id = Uuid::new_v4();
        let subscription_id = Uuid::new_v4();

        let mut incoming = PaymentUpsert::new("pay_Ab99", PaymentStatus::Captured);
        incoming.subscription_id = Some(subscription_id);
        incoming.user_id = Some(user_id);
        incoming.provider_subscription_id = None;

        let merged = row.merge(&incoming, now);
        assert_eq!(merged.subscription_id, Some(subscription_id));
        assert_eq!(merged.user_id, Some(user_id));
        assert_eq!(
            merged.provider_subscription_id,
            Some("sub_Nx01".to_string())
        );
    }

    #[test]
    fn refund_supersedes_capture() {
        let now = Utc::now();
        let row = captured_row(now);

        let mut refund = PaymentUpsert::new("pay_Ab99", PaymentStatus::Refunded);
        refund.refunded_at = Some(now);

        let merged = row.merge(&refund, now);
        assert_eq!(merged.payment_status(), PaymentStatus::Refunded);
        assert_eq!(merged.refunded_at, Some(now));
    }

    #[test]
    fn webhook_flag_is_sticky_across_merges() {
        let now = Utc::now();
        let row = captured_row(now);
        let confirmation = PaymentUpsert::new("pay_Ab99", PaymentStatus::Captured);

        let merged = row.merge(&confirmation, now);
        assert!(merged.received_via_webhook);
    }
}
