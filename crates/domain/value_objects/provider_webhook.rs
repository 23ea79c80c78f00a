use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::enums::provider_subscription_statuses::ProviderSubscriptionStatus;

/// Provider timestamps are Unix seconds.
pub fn ts_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

/// Razorpay webhook envelope. The event name is a closed union so unknown
/// events are accepted and ignored by construction instead of failing parse.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderWebhookEvent {
    pub event: ProviderEventKind,
    #[serde(default)]
    pub payload: ProviderEventPayload,
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ProviderEventKind {
    #[serde(rename = "payment.captured")]
    PaymentCaptured,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "subscription.activated")]
    SubscriptionActivated,
    #[serde(rename = "subscription.charged")]
    SubscriptionCharged,
    #[serde(rename = "subscription.cancelled")]
    SubscriptionCancelled,
    #[serde(rename = "subscription.paused")]
    SubscriptionPaused,
    #[serde(rename = "subscription.resumed")]
    SubscriptionResumed,
    #[serde(other)]
    Unknown,
}

impl Display for ProviderEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderEventKind::PaymentCaptured => "payment.captured",
            ProviderEventKind::PaymentFailed => "payment.failed",
            ProviderEventKind::SubscriptionActivated => "subscription.activated",
            ProviderEventKind::SubscriptionCharged => "subscription.charged",
            ProviderEventKind::SubscriptionCancelled => "subscription.cancelled",
            ProviderEventKind::SubscriptionPaused => "subscription.paused",
            ProviderEventKind::SubscriptionResumed => "subscription.resumed",
            ProviderEventKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderEventPayload {
    pub payment: Option<EntityWrapper<ProviderPaymentResource>>,
    pub subscription: Option<EntityWrapper<ProviderSubscriptionResource>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityWrapper<T> {
    pub entity: T,
}

/// Payment object as the provider sends it, in webhooks and fetch responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderPaymentResource {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub method: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    pub created_at: Option<i64>,
}

/// Subscription object as the provider sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSubscriptionResource {
    pub id: String,
    pub plan_id: Option<String>,
    pub customer_id: Option<String>,
    #[serde(default)]
    pub status: ProviderSubscriptionStatus,
    pub current_start: Option<i64>,
    pub current_end: Option<i64>,
    pub charge_at: Option<i64>,
    pub start_at: Option<i64>,
    pub total_count: Option<i32>,
    pub paid_count: Option<i32>,
    pub created_at: Option<i64>,
    pub notes: Option<SubscriptionNotes>,
}

/// Correlation metadata attached to provider subscriptions. The provider
/// accepts arbitrary scalars here; anything non-scalar fails deserialization
/// rather than being smuggled through as an open dictionary.
pub type SubscriptionNotes = BTreeMap<String, NoteValue>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NoteValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl NoteValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NoteValue::String(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_subscription_charged_envelope() {
        let body = serde_json::json!({
            "event": "subscription.charged",
            "created_at": 1714988000,
            "payload": {
                "subscription": {
                    "entity": {
                        "id": "sub_Nx01",
                        "plan_id": "plan_monthly",
                        "status": "active",
                        "current_start": 1714988000,
                        "current_end": 1717580000,
                        "notes": {"external_user_id": "usr_42", "retries": 2}
                    }
                },
                "payment": {
                    "entity": {
                        "id": "pay_Ab99",
                        "amount": 49900,
                        "currency": "INR",
                        "status": "captured"
                    }
                }
            }
        });

        let event: ProviderWebhookEvent = serde_json::from_value(body).unwrap();
        assert_eq!(event.event, ProviderEventKind::SubscriptionCharged);

        let subscription = event.payload.subscription.unwrap().entity;
        assert_eq!(subscription.id, "sub_Nx01");
        assert_eq!(subscription.status, ProviderSubscriptionStatus::Active);
        let notes = subscription.notes.unwrap();
        assert_eq!(
            notes.get("external_user_id"),
            Some(&NoteValue::String("usr_42".to_string()))
        );
        assert_eq!(notes.get("retries"), Some(&NoteValue::Integer(2)));

        let payment = event.payload.payment.unwrap().entity;
        assert_eq!(payment.id, "pay_Ab99");
        assert_eq!(payment.amount, Some(49900));
    }

    #[test]
    fn unknown_event_names_parse_to_unknown() {
        let body = serde_json::json!({
            "event": "invoice.generated",
            "payload": {}
        });

        let event: ProviderWebhookEvent = serde_json::from_value(body).unwrap();
        assert_eq!(event.event, ProviderEventKind::Unknown);
    }

    #[test]
    fn missing_payload_defaults_to_empty() {
        let event: ProviderWebhookEvent =
            serde_json::from_value(serde_json::json!({"event": "subscription.paused"})).unwrap();
        assert!(event.payload.payment.is_none());
        assert!(event.payload.subscription.is_none());
    }
}
