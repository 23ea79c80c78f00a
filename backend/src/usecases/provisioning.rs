use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use crates::domain::{
    entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::{
        enums::{
            provider_subscription_statuses::ProviderSubscriptionStatus,
            subscription_statuses::SubscriptionStatus,
        },
        provider_webhook::NoteValue,
        subscriptions::{BeginCheckoutDto, ProviderLinkage},
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::gateway::ProviderGateway;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("user email is required for checkout")]
    MissingEmail,
    #[error("subscription is already active")]
    AlreadyActive,
    #[error("no subscription record for user")]
    SubscriptionNotFound,
    #[error("payment provider unavailable")]
    ProviderUnavailable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ProvisioningError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ProvisioningError::MissingEmail | ProvisioningError::AlreadyActive => {
                StatusCode::BAD_REQUEST
            }
            ProvisioningError::SubscriptionNotFound => StatusCode::NOT_FOUND,
            ProvisioningError::ProviderUnavailable => StatusCode::BAD_GATEWAY,
            ProvisioningError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ProvisioningError::MissingEmail => "MissingEmail",
            ProvisioningError::AlreadyActive => "AlreadyActive",
            ProvisioningError::SubscriptionNotFound => "SubscriptionNotFound",
            ProvisioningError::ProviderUnavailable => "ProviderUnavailable",
            ProvisioningError::Internal(_) => "Internal",
        }
    }
}

pub type ProvisioningResult<T> = std::result::Result<T, ProvisioningError>;

pub struct ProvisioningUseCase {
    subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync>,
    gateway: Arc<dyn ProviderGateway>,
    plan_id: String,
    trial_days: i64,
    subscription_total_count: u32,
    checkout_start_lead_secs: i64,
}

impl ProvisioningUseCase {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync>,
        gateway: Arc<dyn ProviderGateway>,
        plan_id: String,
        trial_days: i64,
        subscription_total_count: u32,
        checkout_start_lead_secs: i64,
    ) -> Self {
        Self {
            subscription_repo,
            gateway,
            plan_id,
            trial_days,
            subscription_total_count,
            checkout_start_lead_secs,
        }
    }

    /// Creates the trial record for a new user. Idempotent: the unique
    /// user index means repeat calls return the existing record, so a trial
    /// window is granted exactly once per user.
    pub async fn ensure_trial(
        &self,
        user_id: Uuid,
        external_user_id: String,
    ) -> ProvisioningResult<SubscriptionEntity> {
        let now = Utc::now();
        let trial_end = now + Duration::days(self.trial_days);

        let subscription = self
            .subscription_repo
            .create_trial(InsertSubscriptionEntity::trial(
                user_id,
                external_user_id,
                now,
                trial_end,
            ))
            .await?;

        info!(
            %user_id,
            subscription_id = %subscription.id,
            trial_end = %subscription.trial_end,
            "billing provisioning: trial record ensured"
        );

        Ok(subscription)
    }

    /// Creates the provider-side subscription a client checks out against.
    /// Local state is only written after the provider call succeeds, so a
    /// timeout leaves no half-provisioned record behind.
    pub async fn begin_checkout(
        &self,
        user_id: Uuid,
        email: Option<String>,
        external_user_id: String,
    ) -> ProvisioningResult<BeginCheckoutDto> {
        let email = email.ok_or_else(|| {
            warn!(%user_id, "billing provisioning: missing email for checkout");
            ProvisioningError::MissingEmail
        })?;

        let subscription = self
            .ensure_trial(user_id, external_user_id.clone())
            .await?;

        if subscription.subscription_status() == SubscriptionStatus::Active {
            warn!(%user_id, "billing provisioning: checkout attempted on active subscription");
            return Err(ProvisioningError::AlreadyActive);
        }

        if let Some(existing_provider_id) = subscription.provider_subscription_id.clone() {
            match self.reuse_or_discard(&subscription, &existing_provider_id).await? {
                Some(dto) => return Ok(dto),
                None => {}
            }
        }

        let customer_id = match subscription.provider_customer_id.clone() {
            Some(customer_id) => customer_id,
            None => self
                .gateway
                .create_customer(&email, &external_user_id)
                .await
                .map_err(|err| {
                    error!(%user_id, error = ?err, "billing provisioning: create customer failed");
                    ProvisioningError::ProviderUnavailable
                })?,
        };

        let start_at = (Utc::now() + Duration::seconds(self.checkout_start_lead_secs)).timestamp();
        let notes = BTreeMap::from([
            (
                "external_user_id".to_string(),
                NoteValue::String(external_user_id.clone()),
            ),
            ("user_id".to_string(), NoteValue::String(user_id.to_string())),
        ]);

        let resource = self
            .gateway
            .create_subscription(
                &self.plan_id,
                start_at,
                self.subscription_total_count,
                notes,
            )
            .await
            .map_err(|err| {
                error!(%user_id, error = ?err, "billing provisioning: create subscription failed");
                ProvisioningError::ProviderUnavailable
            })?;

        self.subscription_repo
            .attach_provider_subscription(
                subscription.id,
                ProviderLinkage {
                    provider_subscription_id: resource.id.clone(),
                    provider_plan_id: self.plan_id.clone(),
                    provider_customer_id: Some(customer_id),
                },
            )
            .await?;

        info!(
            %user_id,
            subscription_id = %subscription.id,
            provider_subscription_id = %resource.id,
            "billing provisioning: provider subscription created"
        );

        Ok(BeginCheckoutDto {
            ok: true,
            provider_subscription_id: resource.id,
            provider_key_id: self.gateway.key_id(),
        })
    }

    /// User-initiated cancellation: cancel at the provider when linkage
    /// exists, then mark the local record.
    pub async fn cancel(&self, user_id: Uuid, reason: Option<String>) -> ProvisioningResult<()> {
        let subscription = self
            .subscription_repo
            .find_by_user_id(user_id)
            .await?
            .ok_or(ProvisioningError::SubscriptionNotFound)?;

        if let Some(provider_subscription_id) = subscription.provider_subscription_id.as_deref() {
            self.gateway
                .cancel_subscription(provider_subscription_id)
                .await
                .map_err(|err| {
                    error!(
                        %user_id,
                        provider_subscription_id,
                        error = ?err,
                        "billing provisioning: provider cancel failed"
                    );
                    ProvisioningError::ProviderUnavailable
                })?;
        }

        self.subscription_repo
            .mark_cancelled(
                subscription.id,
                Some(reason.unwrap_or_else(|| "user_requested".to_string())),
                Utc::now(),
            )
            .await?;

        info!(%user_id, subscription_id = %subscription.id, "billing provisioning: subscription cancelled");

        Ok(())
    }

    /// A `created` provider subscription whose scheduled start has already
    /// elapsed cannot be checked out again; the provider rejects it. Cancel
    /// it remotely and clear the local linkage so a fresh one gets created.
    /// A still-fresh pending subscription is reused as-is.
    async fn reuse_or_discard(
        &self,
        subscription: &SubscriptionEntity,
        existing_provider_id: &str,
    ) -> ProvisioningResult<Option<BeginCheckoutDto>> {
        let resource = self
            .gateway
            .fetch_subscription(existing_provider_id)
            .await
            .map_err(|err| {
                error!(
                    subscription_id = %subscription.id,
                    provider_subscription_id = existing_provider_id,
                    error = ?err,
                    "billing provisioning: failed to inspect existing provider subscription"
                );
                ProvisioningError::ProviderUnavailable
            })?;

        let now = Utc::now();
        let stale = subscription.provider_start_is_stale(resource.start_at, now);

        if resource.status == ProviderSubscriptionStatus::Created && !stale {
            info!(
                subscription_id = %subscription.id,
                provider_subscription_id = existing_provider_id,
                "billing provisioning: reusing pending provider subscription"
            );
            return Ok(Some(BeginCheckoutDto {
                ok: true,
                provider_subscription_id: existing_provider_id.to_string(),
                provider_key_id: self.gateway.key_id(),
            }));
        }

        warn!(
            subscription_id = %subscription.id,
            provider_subscription_id = existing_provider_id,
            provider_status = %resource.status,
            stale,
            "billing provisioning: discarding stale provider subscription"
        );

        if let Err(err) = self.gateway.cancel_subscription(existing_provider_id).await {
            // The provider may have expired it already; clearing the local
            // linkage is what unblocks checkout either way.
            warn!(
                provider_subscription_id = existing_provider_id,
                error = ?err,
                "billing provisioning: cancel of stale subscription failed"
            );
        }

        self.subscription_repo
            .clear_provider_linkage(subscription.id)
            .await?;

        Ok(None)
    }
}
