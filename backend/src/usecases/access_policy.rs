use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crates::domain::{
    entities::subscriptions::SubscriptionEntity,
    repositories::{payments::PaymentRepository, subscriptions::SubscriptionRepository},
    value_objects::{
        access::{AccessDecision, AccessReason},
        enums::{
            payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus,
        },
        subscriptions::BillingStatusDto,
    },
};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use super::reconciliation::ReconciliationUseCase;

/// Ordered bypass rules, injected rather than read from ambient globals:
/// user-id allow-list, then email allow-list, then the "no payment keys
/// configured" environment signal.
#[derive(Debug, Clone, Default)]
pub struct AccessBypassPolicy {
    allowed_user_ids: HashSet<String>,
    allowed_emails: HashSet<String>,
    provider_unconfigured: bool,
}

impl AccessBypassPolicy {
    pub fn new(
        allowed_user_ids: Vec<String>,
        allowed_emails: Vec<String>,
        provider_unconfigured: bool,
    ) -> Self {
        Self {
            allowed_user_ids: allowed_user_ids.into_iter().collect(),
            allowed_emails: allowed_emails
                .into_iter()
                .map(|email| email.to_lowercase())
                .collect(),
            provider_unconfigured,
        }
    }

    pub fn grants(&self, user_id: Uuid, email: Option<&str>) -> bool {
        if self.allowed_user_ids.contains(&user_id.to_string()) {
            return true;
        }
        if let Some(email) = email {
            if self.allowed_emails.contains(&email.to_lowercase()) {
                return true;
            }
        }
        self.provider_unconfigured
    }
}

/// Pure entitlement computation. Rule order is load-bearing: bypass first,
/// then trial, then paid-with-corroboration, then everything else denied.
/// `corroborated` is the caller's ledger lookup result; a failed lookup must
/// be passed as `false` so an unverifiable claim never grants access.
pub fn evaluate(
    subscription: Option<&SubscriptionEntity>,
    bypass: bool,
    corroborated: bool,
    now: DateTime<Utc>,
) -> AccessDecision {
    if bypass {
        return AccessDecision {
            has_access: true,
            reason: AccessReason::Free,
            derived_status: subscription.map(SubscriptionEntity::subscription_status),
        };
    }

    let Some(subscription) = subscription else {
        return AccessDecision::denied(None);
    };

    let status = subscription.subscription_status();

    if subscription.trial_active(now) {
        return AccessDecision {
            has_access: true,
            reason: AccessReason::Trial,
            derived_status: Some(SubscriptionStatus::Trial),
        };
    }

    if status == SubscriptionStatus::Active
        && subscription.period_end.is_some_and(|period_end| now < period_end)
        && corroborated
    {
        return AccessDecision {
            has_access: true,
            reason: AccessReason::Paid,
            derived_status: Some(SubscriptionStatus::Active),
        };
    }

    let derived = if status == SubscriptionStatus::Trial {
        SubscriptionStatus::Expired
    } else {
        status
    };
    AccessDecision::denied(Some(derived))
}

#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EntitlementError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Serves the status endpoint. Performs the corroborating ledger read for
/// rule (d) and, when an `active` record cannot be corroborated, requests an
/// eventual local downgrade instead of trusting the flag.
pub struct EntitlementUseCase {
    subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync>,
    payment_repo: Arc<dyn PaymentRepository + Send + Sync>,
    bypass: AccessBypassPolicy,
    reconciliation: Arc<ReconciliationUseCase>,
}

impl EntitlementUseCase {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync>,
        payment_repo: Arc<dyn PaymentRepository + Send + Sync>,
        bypass: AccessBypassPolicy,
        reconciliation: Arc<ReconciliationUseCase>,
    ) -> Self {
        Self {
            subscription_repo,
            payment_repo,
            bypass,
            reconciliation,
        }
    }

    pub async fn billing_status(
        &self,
        user_id: Uuid,
        email: Option<String>,
    ) -> Result<BillingStatusDto, EntitlementError> {
        let now = Utc::now();
        let subscription = self.subscription_repo.find_by_user_id(user_id).await?;
        let bypass = self.bypass.grants(user_id, email.as_deref());

        let corroborated = match subscription.as_ref() {
            Some(subscription)
                if subscription.subscription_status() == SubscriptionStatus::Active =>
            {
                self.corroborated(subscription).await
            }
            _ => false,
        };

        let decision = evaluate(subscription.as_ref(), bypass, corroborated, now);

        if let Some(subscription) = subscription.as_ref() {
            self.request_eventual_repair(subscription, corroborated, now);
        }

        let dto = BillingStatusDto {
            has_access: decision.has_access,
            status: decision
                .derived_status
                .map(|status| status.to_string())
                .unwrap_or_else(|| "none".to_string()),
            is_trial: decision.reason == AccessReason::Trial,
            trial_end: subscription.as_ref().map(|sub| sub.trial_end),
            period_end: subscription.as_ref().and_then(|sub| sub.period_end),
            next_billing_at: subscription.as_ref().and_then(|sub| sub.next_billing_at),
            provider_subscription_id: subscription
                .as_ref()
                .and_then(|sub| sub.provider_subscription_id.clone()),
            is_free_access: decision.reason == AccessReason::Free,
        };

        Ok(dto)
    }

    async fn corroborated(&self, subscription: &SubscriptionEntity) -> bool {
        let Some(provider_subscription_id) = subscription.provider_subscription_id.clone() else {
            return false;
        };

        match self
            .payment_repo
            .find_by_provider_subscription_id(
                provider_subscription_id,
                Some(vec![PaymentStatus::Captured, PaymentStatus::Authorized]),
            )
            .await
        {
            Ok(payments) => !payments.is_empty(),
            Err(err) => {
                // An unverifiable claim is treated as not paid.
                warn!(
                    subscription_id = %subscription.id,
                    error = ?err,
                    "billing status: corroboration lookup failed"
                );
                false
            }
        }
    }

    /// Write-backs happen off the read path: an uncorroborated `active`
    /// record gets a downgrade request, a lapsed trial gets its stored
    /// status expired. Both are best-effort; the denial already happened.
    fn request_eventual_repair(
        &self,
        subscription: &SubscriptionEntity,
        corroborated: bool,
        now: DateTime<Utc>,
    ) {
        let status = subscription.subscription_status();

        if status == SubscriptionStatus::Active && !corroborated {
            let reconciliation = Arc::clone(&self.reconciliation);
            let subscription = subscription.clone();
            tokio::spawn(async move {
                if let Err(err) = reconciliation.downgrade_uncorroborated(&subscription).await {
                    error!(
                        subscription_id = %subscription.id,
                        error = ?err,
                        "billing status: async downgrade failed"
                    );
                }
            });
            return;
        }

        if status == SubscriptionStatus::Trial && now >= subscription.trial_end {
            let subscription_repo = Arc::clone(&self.subscription_repo);
            let subscription_id = subscription.id;
            tokio::spawn(async move {
                if let Err(err) = subscription_repo
                    .transition(
                        subscription_id,
                        SubscriptionStatus::Expired,
                        crates::domain::value_objects::subscriptions::SubscriptionPeriod::unchanged(),
                    )
                    .await
                {
                    error!(
                        %subscription_id,
                        error = ?err,
                        "billing status: trial expiry write-back failed"
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription_with(
        status: SubscriptionStatus,
        trial_end: DateTime<Utc>,
        period_end: Option<DateTime<Utc>>,
    ) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            external_user_id: "usr_42".to_string(),
            status: status.to_string(),
            trial_start: now - Duration::days(30),
            trial_end,
            trial_used: true,
            provider_subscription_id: Some("sub_Nx01".to_string()),
            provider_plan_id: Some("plan_monthly".to_string()),
            provider_customer_id: Some("cust_77".to_string()),
            period_start: None,
            period_end,
            next_billing_at: period_end,
            cancelled_at: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn bypass_wins_over_everything() {
        let now = Utc::now();
        let decision = evaluate(None, true, false, now);
        assert!(decision.has_access);
        assert_eq!(decision.reason, AccessReason::Free);
    }

    #[test]
    fn no_subscription_denies() {
        let decision = evaluate(None, false, false, Utc::now());
        assert!(!decision.has_access);
        assert_eq!(decision.reason, AccessReason::None);
        assert_eq!(decision.derived_status, None);
    }

    #[test]
    fn running_trial_grants_access() {
        let now = Utc::now();
        let subscription = subscription_with(
            SubscriptionStatus::Trial,
            now + Duration::days(3),
            None,
        );
        let decision = evaluate(Some(&subscription), false, false, now);
        assert!(decision.has_access);
        assert_eq!(decision.reason, AccessReason::Trial);
    }

    #[test]
    fn elapsed_trial_surfaces_as_expired() {
        let now = Utc::now();
        let subscription = subscription_with(
            SubscriptionStatus::Trial,
            now - Duration::days(1),
            None,
        );
        let decision = evaluate(Some(&subscription), false, false, now);
        assert!(!decision.has_access);
        assert_eq!(decision.reason, AccessReason::None);
        assert_eq!(decision.derived_status, Some(SubscriptionStatus::Expired));
    }

    #[test]
    fn active_without_corroboration_never_reports_paid() {
        let now = Utc::now();
        let subscription = subscription_with(
            SubscriptionStatus::Active,
            now - Duration::days(20),
            Some(now + Duration::days(20)),
        );
        let decision = evaluate(Some(&subscription), false, false, now);
        assert!(!decision.has_access);
        assert_ne!(decision.reason, AccessReason::Paid);
    }

    #[test]
    fn active_with_corroboration_and_running_period_is_paid() {
        let now = Utc::now();
        let subscription = subscription_with(
            SubscriptionStatus::Active,
            now - Duration::days(20),
            Some(now + Duration::days(20)),
        );
        let decision = evaluate(Some(&subscription), false, true, now);
        assert!(decision.has_access);
        assert_eq!(decision.reason, AccessReason::Paid);
    }

    #[test]
    fn active_with_lapsed_period_denies_even_when_corroborated() {
        let now = Utc::now();
        let subscription = subscription_with(
            SubscriptionStatus::Active,
            now - Duration::days(60),
            Some(now - Duration::days(1)),
        );
        let decision = evaluate(Some(&subscription), false, true, now);
        assert!(!decision.has_access);
    }

    #[test]
    fn bypass_policy_rule_order() {
        let user_id = Uuid::new_v4();
        let policy = AccessBypassPolicy::new(
            vec![user_id.to_string()],
            vec!["Friend@Example.com".to_string()],
            false,
        );

        assert!(policy.grants(user_id, None));
        assert!(policy.grants(Uuid::new_v4(), Some("friend@example.com")));
        assert!(!policy.grants(Uuid::new_v4(), Some("stranger@example.com")));

        let unconfigured = AccessBypassPolicy::new(vec![], vec![], true);
        assert!(unconfigured.grants(Uuid::new_v4(), None));
    }

    mod entitlement {
        use super::*;
        use crate::usecases::gateway::MockProviderGateway;
        use crate::usecases::test_support::{
            InMemoryPaymentRepo, InMemorySubscriptionRepo, created_subscription,
        };
        use crates::domain::value_objects::payments::PaymentUpsert;

        fn entitlement(
            subscription_repo: Arc<InMemorySubscriptionRepo>,
            payment_repo: Arc<InMemoryPaymentRepo>,
        ) -> EntitlementUseCase {
            let reconciliation = Arc::new(ReconciliationUseCase::new(
                Arc::clone(&subscription_repo) as Arc<dyn SubscriptionRepository + Send + Sync>,
                Arc::clone(&payment_repo) as Arc<dyn PaymentRepository + Send + Sync>,
                Arc::new(MockProviderGateway::new()),
                30,
            ));
            EntitlementUseCase::new(
                subscription_repo,
                payment_repo,
                AccessBypassPolicy::default(),
                reconciliation,
            )
        }

        #[tokio::test]
        async fn corroborated_active_subscription_reports_access() {
            let subscription_repo = Arc::new(InMemorySubscriptionRepo::new());
            let payment_repo = Arc::new(InMemoryPaymentRepo::new());
            let user_id = Uuid::new_v4();
            let mut seeded = created_subscription(user_id);
            seeded.status = SubscriptionStatus::Active.to_string();
            seeded.period_end = Some(Utc::now() + Duration::days(20));
            subscription_repo.seed(seeded);

            let mut upsert = PaymentUpsert::new("pay_Ab99", PaymentStatus::Captured);
            upsert.provider_subscription_id = Some("sub_Nx01".to_string());
            payment_repo
                .upsert_by_provider_payment_id(upsert)
                .await
                .unwrap();

            let use_case = entitlement(
                Arc::clone(&subscription_repo),
                Arc::clone(&payment_repo),
            );
            let dto = use_case.billing_status(user_id, None).await.unwrap();

            assert!(dto.has_access);
            assert_eq!(dto.status, "active");
            assert!(!dto.is_free_access);
        }

        #[tokio::test]
        async fn uncorroborated_active_is_denied_and_self_heals() {
            let subscription_repo = Arc::new(InMemorySubscriptionRepo::new());
            let payment_repo = Arc::new(InMemoryPaymentRepo::new());
            let user_id = Uuid::new_v4();
            let mut seeded = created_subscription(user_id);
            seeded.status = SubscriptionStatus::Active.to_string();
            seeded.period_end = Some(Utc::now() + Duration::days(20));
            let subscription_id = seeded.id;
            subscription_repo.seed(seeded);

            let use_case = entitlement(
                Arc::clone(&subscription_repo),
                Arc::clone(&payment_repo),
            );
            let dto = use_case.billing_status(user_id, None).await.unwrap();
            assert!(!dto.has_access);

            // The downgrade was requested off the read path; give the
            // spawned task a chance to run.
            for _ in 0..64 {
                tokio::task::yield_now().await;
                let row = subscription_repo.get(subscription_id).unwrap();
                if row.subscription_status() != SubscriptionStatus::Active {
                    break;
                }
            }

            let row = subscription_repo.get(subscription_id).unwrap();
            assert_eq!(row.subscription_status(), SubscriptionStatus::Created);
            assert_eq!(row.period_end, None);
        }

        #[tokio::test]
        async fn missing_record_reports_none() {
            let use_case = entitlement(
                Arc::new(InMemorySubscriptionRepo::new()),
                Arc::new(InMemoryPaymentRepo::new()),
            );
            let dto = use_case.billing_status(Uuid::new_v4(), None).await.unwrap();

            assert!(!dto.has_access);
            assert_eq!(dto.status, "none");
            assert_eq!(dto.provider_subscription_id, None);
        }
    }
}
