use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Razorpay's subscription status vocabulary, kept as an explicit external
/// enum rather than inferred from loose strings. Anything outside the
/// published set lands on `Unknown` and is treated as not-paid.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSubscriptionStatus {
    Created,
    Authenticated,
    Active,
    Pending,
    Halted,
    Cancelled,
    Completed,
    Expired,
    Paused,
    #[serde(other)]
    #[default]
    Unknown,
}

impl ProviderSubscriptionStatus {
    /// Statuses the provider reports for a subscription it considers paid-up.
    pub fn is_paid_active(&self) -> bool {
        matches!(
            self,
            ProviderSubscriptionStatus::Active | ProviderSubscriptionStatus::Authenticated
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderSubscriptionStatus::Created => "created",
            ProviderSubscriptionStatus::Authenticated => "authenticated",
            ProviderSubscriptionStatus::Active => "active",
            ProviderSubscriptionStatus::Pending => "pending",
            ProviderSubscriptionStatus::Halted => "halted",
            ProviderSubscriptionStatus::Cancelled => "cancelled",
            ProviderSubscriptionStatus::Completed => "completed",
            ProviderSubscriptionStatus::Expired => "expired",
            ProviderSubscriptionStatus::Paused => "paused",
            ProviderSubscriptionStatus::Unknown => "unknown",
        }
    }
}

impl Display for ProviderSubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
