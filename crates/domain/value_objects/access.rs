use std::fmt::Display;

use serde::Serialize;

use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessReason {
    Free,
    Trial,
    Paid,
    None,
}

impl Display for AccessReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            AccessReason::Free => "free",
            AccessReason::Trial => "trial",
            AccessReason::Paid => "paid",
            AccessReason::None => "none",
        };
        f.write_str(reason)
    }
}

/// Entitlement verdict the UI layer consumes. `derived_status` surfaces what
/// the record effectively is right now (an elapsed trial reads as expired
/// even while the stored row still says trial); `None` means the user has no
/// subscription record at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessDecision {
    pub has_access: bool,
    pub reason: AccessReason,
    pub derived_status: Option<SubscriptionStatus>,
}

impl AccessDecision {
    pub fn denied(derived_status: Option<SubscriptionStatus>) -> Self {
        Self {
            has_access: false,
            reason: AccessReason::None,
            derived_status,
        }
    }
}
