use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

/// Period fields accompanying a status transition. `None` leaves the stored
/// value untouched; `clear_period` wipes all three (drift downgrade only).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionPeriod {
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub next_billing_at: Option<DateTime<Utc>>,
    pub clear_period: bool,
}

impl SubscriptionPeriod {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn cleared() -> Self {
        Self {
            clear_period: true,
            ..Self::default()
        }
    }
}

/// `period_end`/`next_billing_at` only ever move forward. A charge or
/// activation event carrying an older timestamp must not shrink the window
/// the user already paid for.
pub fn monotonic_forward(
    existing: Option<DateTime<Utc>>,
    candidate: DateTime<Utc>,
) -> DateTime<Utc> {
    match existing {
        Some(current) if current > candidate => current,
        _ => candidate,
    }
}

/// Provider-side identifiers attached to a subscription at checkout time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderLinkage {
    pub provider_subscription_id: String,
    pub provider_plan_id: String,
    pub provider_customer_id: Option<String>,
}

/// The entire billing surface the rest of the application may depend on.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingStatusDto {
    pub has_access: bool,
    /// Derived status string; `"none"` when the user has no record.
    pub status: String,
    pub is_trial: bool,
    pub trial_end: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub next_billing_at: Option<DateTime<Utc>>,
    pub provider_subscription_id: Option<String>,
    pub is_free_access: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginCheckoutDto {
    pub ok: bool,
    pub provider_subscription_id: String,
    pub provider_key_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmCheckoutRequest {
    pub provider_payment_id: String,
    pub provider_subscription_id: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmCheckoutDto {
    pub ok: bool,
    pub subscription_status: SubscriptionStatus,
    pub has_access: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelSubscriptionRequest {
    pub reason: Option<String>,
}
