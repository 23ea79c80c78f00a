use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Created,
    Authorized,
    Failed,
    Captured,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "created" => Some(PaymentStatus::Created),
            "authorized" => Some(PaymentStatus::Authorized),
            "failed" => Some(PaymentStatus::Failed),
            "captured" => Some(PaymentStatus::Captured),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// Monotonic merge rank. Duplicate or out-of-order deliveries may only
    /// move a payment to an equal or higher rank, so `captured` can never be
    /// regressed to `created`/`authorized` by a stale event.
    pub fn rank(&self) -> u8 {
        match self {
            PaymentStatus::Created => 0,
            PaymentStatus::Authorized => 1,
            PaymentStatus::Failed => 2,
            PaymentStatus::Captured => 3,
            PaymentStatus::Refunded => 4,
        }
    }

    /// A payment in this status proves paid access for its subscription.
    pub fn is_corroborating(&self) -> bool {
        matches!(self, PaymentStatus::Captured | PaymentStatus::Authorized)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
