use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::infra::db::postgres::schema::subscriptions;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub external_user_id: String,
    pub status: String,
    pub trial_start: DateTime<Utc>,
    pub trial_end: DateTime<Utc>,
    pub trial_used: bool,
    pub provider_subscription_id: Option<String>,
    pub provider_plan_id: Option<String>,
    pub provider_customer_id: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub next_billing_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct InsertSubscriptionEntity {
    pub user_id: Uuid,
    pub external_user_id: String,
    pub status: String,
    pub trial_start: DateTime<Utc>,
    pub trial_end: DateTime<Utc>,
    pub trial_used: bool,
}

impl InsertSubscriptionEntity {
    pub fn trial(
        user_id: Uuid,
        external_user_id: String,
        now: DateTime<Utc>,
        trial_end: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            external_user_id,
            status: SubscriptionStatus::Trial.to_string(),
            trial_start: now,
            trial_end,
            trial_used: true,
        }
    }
}

impl SubscriptionEntity {
    pub fn subscription_status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_str(&self.status)
    }

    pub fn trial_active(&self, now: DateTime<Utc>) -> bool {
        self.subscription_status() == SubscriptionStatus::Trial && now < self.trial_end
    }

    /// True when the provider-side subscription was created with a start time
    /// that has already elapsed. The provider rejects resuming such a
    /// subscription, so checkout has to cancel and recreate it.
    pub fn provider_start_is_stale(
        &self,
        provider_start_at: Option<i64>,
        now: DateTime<Utc>,
    ) -> bool {
        match provider_start_at {
            Some(start_at) => start_at < now.timestamp(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn trial_row(now: DateTime<Utc>, trial_end: DateTime<Utc>) -> SubscriptionEntity {
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            external_user_id: "usr_42".to_string(),
            status: SubscriptionStatus::Trial.to_string(),
            trial_start: now,
            trial_end,
            trial_used: true,
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
        }
    }

    #[test]
    fn trial_is_active_until_trial_end() {
        let now = Utc::now();
        let row = trial_row(now, now + Duration::days(14));
        assert!(row.trial_active(now));
        assert!(!row.trial_active(now + Duration::days(15)));
    }

    #[test]
    fn stale_provider_start_detection() {
        let now = Utc::now();
        let row = trial_row(now, now + Duration::days(14));
        assert!(row.provider_start_is_stale(Some((now - Duration::hours(1)).timestamp()), now));
        assert!(!row.provider_start_is_stale(Some((now + Duration::hours(1)).timestamp()), now));
        assert!(!row.provider_start_is_stale(None, now));
    }
}
