use std::sync::Arc;

use anyhow::Result as AnyResult;
use chrono::{Duration, Utc};
use crates::domain::{
    entities::{payments::PaymentEntity, subscriptions::SubscriptionEntity},
    repositories::{payments::PaymentRepository, subscriptions::SubscriptionRepository},
    value_objects::{
        enums::{
            payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus,
        },
        payments::PaymentUpsert,
        provider_webhook::{ProviderPaymentResource, ts_to_datetime},
        subscriptions::SubscriptionPeriod,
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{activation::activate_with_payment, gateway::ProviderGateway};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no subscription to sync")]
    NoSubscriptionToSync,
    #[error("payment provider unavailable")]
    ProviderUnavailable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SyncError::NoSubscriptionToSync => StatusCode::NOT_FOUND,
            SyncError::ProviderUnavailable => StatusCode::BAD_GATEWAY,
            SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::NoSubscriptionToSync => "NoSubscriptionToSync",
            SyncError::ProviderUnavailable => "ProviderUnavailable",
            SyncError::Internal(_) => "Internal",
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// On-demand repair of local drift against the provider's source of truth.
/// Idempotent; safe to run repeatedly or concurrently with webhook handling.
pub struct ReconciliationUseCase {
    subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync>,
    payment_repo: Arc<dyn PaymentRepository + Send + Sync>,
    gateway: Arc<dyn ProviderGateway>,
    billing_cycle_days: i64,
}

impl ReconciliationUseCase {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync>,
        payment_repo: Arc<dyn PaymentRepository + Send + Sync>,
        gateway: Arc<dyn ProviderGateway>,
        billing_cycle_days: i64,
    ) -> Self {
        Self {
            subscription_repo,
            payment_repo,
            gateway,
            billing_cycle_days,
        }
    }

    fn billing_cycle(&self) -> Duration {
        Duration::days(self.billing_cycle_days)
    }

    pub async fn sync_for_user(&self, user_id: Uuid) -> SyncResult<SubscriptionStatus> {
        let subscription = self
            .subscription_repo
            .find_by_user_id(user_id)
            .await?
            .ok_or(SyncError::NoSubscriptionToSync)?;

        let Some(provider_subscription_id) = subscription.provider_subscription_id.clone() else {
            // Nothing at the provider to reconcile against. An `active`
            // record with no linkage can never be corroborated; downgrade it.
            if subscription.subscription_status() == SubscriptionStatus::Active {
                let updated = self.apply_downgrade(&subscription).await?;
                return Ok(updated.subscription_status());
            }
            return Ok(subscription.subscription_status());
        };

        // Provider fetch failures abort before any local mutation: a
        // downgrade must never be decided on incomplete information.
        let resource = self
            .gateway
            .fetch_subscription(&provider_subscription_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    provider_subscription_id = %provider_subscription_id,
                    error = ?err,
                    "billing sync: failed to fetch subscription from provider"
                );
                SyncError::ProviderUnavailable
            })?;

        let corroborating = self.local_corroborating_payment(&subscription).await?;

        if resource.status.is_paid_active() {
            if let Some(payment) = corroborating {
                if subscription.subscription_status() == SubscriptionStatus::Active {
                    info!(
                        %user_id,
                        provider_subscription_id = %provider_subscription_id,
                        "billing sync: local state already matches provider"
                    );
                    return Ok(SubscriptionStatus::Active);
                }

                // Provider activated this subscription while the local record
                // was still `created`; repair using the payment we hold.
                let paid_at = payment.paid_at.unwrap_or_else(Utc::now);
                let period_end = resource
                    .current_end
                    .and_then(ts_to_datetime)
                    .unwrap_or(paid_at + self.billing_cycle());
                let updated = self
                    .subscription_repo
                    .transition(
                        subscription.id,
                        SubscriptionStatus::Active,
                        SubscriptionPeriod {
                            period_start: resource
                                .current_start
                                .and_then(ts_to_datetime)
                                .or(Some(paid_at)),
                            period_end: Some(period_end),
                            next_billing_at: Some(period_end),
                            clear_period: false,
                        },
                    )
                    .await
                    .map_err(SyncError::Internal)?;
                info!(
                    %user_id,
                    provider_subscription_id = %provider_subscription_id,
                    "billing sync: local record promoted to active"
                );
                return Ok(updated.subscription_status());
            }

            let provider_payments = self
                .gateway
                .list_payments_for_subscription(&provider_subscription_id)
                .await
                .map_err(|err| {
                    error!(
                        %user_id,
                        provider_subscription_id = %provider_subscription_id,
                        error = ?err,
                        "billing sync: failed to list provider payments"
                    );
                    SyncError::ProviderUnavailable
                })?;

            if let Some((payment_resource, status)) =
                Self::first_corroborating(&provider_payments)
            {
                let paid_at = payment_resource
                    .created_at
                    .and_then(ts_to_datetime)
                    .unwrap_or_else(Utc::now);
                let mut upsert =
                    PaymentUpsert::from_provider_resource(payment_resource, status, false);
                upsert.provider_subscription_id = Some(provider_subscription_id.clone());
                upsert.paid_at = Some(paid_at);

                let updated = activate_with_payment(
                    &self.subscription_repo,
                    &self.payment_repo,
                    &subscription,
                    upsert,
                    self.billing_cycle(),
                    paid_at,
                )
                .await?;
                info!(
                    %user_id,
                    provider_subscription_id = %provider_subscription_id,
                    "billing sync: imported provider payment and activated"
                );
                return Ok(updated.subscription_status());
            }

            // Provider calls the subscription active yet shows no captured
            // payment. Without corroboration the local `active` flag is drift.
            if subscription.subscription_status() == SubscriptionStatus::Active {
                let updated = self.apply_downgrade(&subscription).await?;
                return Ok(updated.subscription_status());
            }

            warn!(
                %user_id,
                provider_subscription_id = %provider_subscription_id,
                provider_status = %resource.status,
                "billing sync: provider reports active but no captured payment exists"
            );
            return Ok(subscription.subscription_status());
        }

        // Provider does not consider this subscription paid.
        if subscription.subscription_status() == SubscriptionStatus::Active
            && corroborating.is_none()
        {
            let updated = self.apply_downgrade(&subscription).await?;
            return Ok(updated.subscription_status());
        }

        info!(
            %user_id,
            provider_subscription_id = %provider_subscription_id,
            provider_status = %resource.status,
            "billing sync: no repair needed"
        );
        Ok(subscription.subscription_status())
    }

    /// Local-only drift correction: an `active` record with no corroborating
    /// captured/authorized payment is downgraded and its period cleared, so a
    /// partial failure can never grant access forever. Re-checks the ledger
    /// first, which makes it safe to call from a stale snapshot.
    pub async fn downgrade_uncorroborated(
        &self,
        subscription: &SubscriptionEntity,
    ) -> AnyResult<()> {
        if subscription.subscription_status() != SubscriptionStatus::Active {
            return Ok(());
        }
        if self
            .local_corroborating_payment(subscription)
            .await?
            .is_some()
        {
            return Ok(());
        }

        self.apply_downgrade(subscription).await?;
        Ok(())
    }

    async fn apply_downgrade(
        &self,
        subscription: &SubscriptionEntity,
    ) -> AnyResult<SubscriptionEntity> {
        let target = if subscription.provider_subscription_id.is_some() {
            SubscriptionStatus::Created
        } else {
            SubscriptionStatus::Expired
        };

        warn!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            target_status = %target,
            "billing sync: downgrading uncorroborated active subscription"
        );

        let updated = self
            .subscription_repo
            .transition(subscription.id, target, SubscriptionPeriod::cleared())
            .await?;
        Ok(updated)
    }

    async fn local_corroborating_payment(
        &self,
        subscription: &SubscriptionEntity,
    ) -> AnyResult<Option<PaymentEntity>> {
        let Some(provider_subscription_id) = subscription.provider_subscription_id.clone() else {
            return Ok(None);
        };

        let payments = self
            .payment_repo
            .find_by_provider_subscription_id(
                provider_subscription_id,
                Some(vec![PaymentStatus::Captured, PaymentStatus::Authorized]),
            )
            .await?;

        Ok(payments.into_iter().next())
    }

    fn first_corroborating(
        payments: &[ProviderPaymentResource],
    ) -> Option<(&ProviderPaymentResource, PaymentStatus)> {
        payments.iter().find_map(|payment| {
            payment
                .status
                .as_deref()
                .and_then(PaymentStatus::from_str)
                .filter(PaymentStatus::is_corroborating)
                .map(|status| (payment, status))
        })
    }
}
