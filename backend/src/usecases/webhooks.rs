use std::sync::Arc;

use anyhow::Result as AnyResult;
use chrono::{Duration, Utc};
use crates::domain::{
    repositories::{payments::PaymentRepository, subscriptions::SubscriptionRepository},
    value_objects::{
        enums::{
            payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus,
        },
        payments::PaymentUpsert,
        provider_webhook::{
            ProviderEventKind, ProviderPaymentResource, ProviderSubscriptionResource,
            ProviderWebhookEvent, ts_to_datetime,
        },
        subscriptions::SubscriptionPeriod,
    },
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::stage::Stage;

use super::{activation::activate_with_payment, gateway::ProviderGateway};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    SignatureInvalid,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl WebhookError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            WebhookError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            WebhookError::SignatureInvalid => "SignatureInvalid",
            WebhookError::MalformedPayload(_) => "MalformedPayload",
        }
    }
}

pub type WebhookResult<T> = std::result::Result<T, WebhookError>;

pub struct WebhookUseCase {
    subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync>,
    payment_repo: Arc<dyn PaymentRepository + Send + Sync>,
    gateway: Arc<dyn ProviderGateway>,
    billing_cycle_days: i64,
    stage: Stage,
}

impl WebhookUseCase {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync>,
        payment_repo: Arc<dyn PaymentRepository + Send + Sync>,
        gateway: Arc<dyn ProviderGateway>,
        billing_cycle_days: i64,
        stage: Stage,
    ) -> Self {
        Self {
            subscription_repo,
            payment_repo,
            gateway,
            billing_cycle_days,
            stage,
        }
    }

    fn billing_cycle(&self) -> Duration {
        Duration::days(self.billing_cycle_days)
    }

    /// Entry point for provider webhook deliveries. Signature and JSON
    /// failures surface to the router (401/400); everything past that point
    /// is acknowledged regardless of handler outcome so the provider never
    /// enters a retry storm over a bug on our side.
    pub async fn handle_provider_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> WebhookResult<()> {
        if self.gateway.webhook_secret_configured() {
            let signature = signature.ok_or_else(|| {
                warn!("billing webhook: missing signature header");
                WebhookError::SignatureInvalid
            })?;
            self.gateway
                .verify_webhook_signature(payload, signature)
                .map_err(|err| {
                    warn!(error = %err, "billing webhook: signature verification failed");
                    WebhookError::SignatureInvalid
                })?;
        } else if self.stage == Stage::Local {
            warn!(
                "billing webhook: no webhook secret configured, skipping signature verification (local stage)"
            );
        } else {
            error!(
                "billing webhook: no webhook secret configured outside local stage, rejecting delivery"
            );
            return Err(WebhookError::SignatureInvalid);
        }

        let event: ProviderWebhookEvent = serde_json::from_slice(payload).map_err(|err| {
            warn!(error = %err, "billing webhook: unparsable payload");
            WebhookError::MalformedPayload(err.to_string())
        })?;

        let event_kind = event.event;
        info!(event = %event_kind, "billing webhook: dispatching event");

        let outcome = match event_kind {
            ProviderEventKind::PaymentCaptured => self.handle_payment_captured(&event).await,
            ProviderEventKind::PaymentFailed => self.handle_payment_failed(&event).await,
            ProviderEventKind::SubscriptionActivated => {
                self.handle_subscription_activated(&event).await
            }
            ProviderEventKind::SubscriptionCharged => {
                self.handle_subscription_charged(&event).await
            }
            ProviderEventKind::SubscriptionCancelled => {
                self.handle_subscription_cancelled(&event, "cancelled_at_provider")
                    .await
            }
            ProviderEventKind::SubscriptionPaused => {
                // Paused means no access; locally it is treated as cancelled.
                self.handle_subscription_cancelled(&event, "paused_at_provider")
                    .await
            }
            ProviderEventKind::SubscriptionResumed => {
                self.handle_subscription_resumed(&event).await
            }
            ProviderEventKind::Unknown => {
                debug!("billing webhook: unhandled provider event type");
                Ok(())
            }
        };

        if let Err(err) = outcome {
            error!(
                event = %event_kind,
                provider_payment_id = ?event.payload.payment.as_ref().map(|p| p.entity.id.as_str()),
                provider_subscription_id = ?event.payload.subscription.as_ref().map(|s| s.entity.id.as_str()),
                error = ?err,
                "billing webhook: handler failed; acknowledging delivery for manual replay"
            );
        }

        Ok(())
    }

    fn payment_entity<'a>(
        event: &'a ProviderWebhookEvent,
    ) -> Option<&'a ProviderPaymentResource> {
        event.payload.payment.as_ref().map(|wrapper| &wrapper.entity)
    }

    fn subscription_entity<'a>(
        event: &'a ProviderWebhookEvent,
    ) -> Option<&'a ProviderSubscriptionResource> {
        event
            .payload
            .subscription
            .as_ref()
            .map(|wrapper| &wrapper.entity)
    }

    async fn handle_payment_captured(&self, event: &ProviderWebhookEvent) -> AnyResult<()> {
        let Some(payment) = Self::payment_entity(event) else {
            warn!("billing webhook: payment.captured without payment entity, ignoring");
            return Ok(());
        };

        let provider_subscription_id =
            Self::subscription_entity(event).map(|entity| entity.id.clone());
        let paid_at = payment
            .created_at
            .and_then(ts_to_datetime)
            .unwrap_or_else(Utc::now);

        let mut upsert =
            PaymentUpsert::from_provider_resource(payment, PaymentStatus::Captured, true);
        upsert.provider_subscription_id = provider_subscription_id.clone();
        upsert.paid_at = Some(paid_at);

        let subscription = match provider_subscription_id.as_ref() {
            Some(id) => {
                self.subscription_repo
                    .find_by_provider_subscription_id(id.clone())
                    .await?
            }
            None => None,
        };

        match subscription {
            Some(subscription) => {
                activate_with_payment(
                    &self.subscription_repo,
                    &self.payment_repo,
                    &subscription,
                    upsert,
                    self.billing_cycle(),
                    paid_at,
                )
                .await?;
            }
            None => {
                // Record the payment fact anyway; reconciliation back-fills
                // the subscription link once the record turns up.
                self.payment_repo.upsert_by_provider_payment_id(upsert).await?;
                warn!(
                    provider_payment_id = %payment.id,
                    provider_subscription_id = ?provider_subscription_id,
                    "billing webhook: captured payment has no matching subscription"
                );
            }
        }

        Ok(())
    }

    async fn handle_payment_failed(&self, event: &ProviderWebhookEvent) -> AnyResult<()> {
        let Some(payment) = Self::payment_entity(event) else {
            warn!("billing webhook: payment.failed without payment entity, ignoring");
            return Ok(());
        };

        let provider_subscription_id =
            Self::subscription_entity(event).map(|entity| entity.id.clone());

        let mut upsert =
            PaymentUpsert::from_provider_resource(payment, PaymentStatus::Failed, true);
        upsert.provider_subscription_id = provider_subscription_id.clone();
        self.payment_repo.upsert_by_provider_payment_id(upsert).await?;

        let Some(provider_subscription_id) = provider_subscription_id else {
            warn!(
                provider_payment_id = %payment.id,
                "billing webhook: failed payment carries no subscription id"
            );
            return Ok(());
        };

        match self
            .subscription_repo
            .find_by_provider_subscription_id(provider_subscription_id.clone())
            .await?
        {
            Some(subscription) => {
                self.subscription_repo
                    .transition(
                        subscription.id,
                        SubscriptionStatus::PastDue,
                        SubscriptionPeriod::unchanged(),
                    )
                    .await?;
                info!(
                    subscription_id = %subscription.id,
                    provider_payment_id = %payment.id,
                    "billing webhook: subscription marked past_due after failed payment"
                );
            }
            None => {
                warn!(
                    provider_subscription_id = %provider_subscription_id,
                    "billing webhook: payment.failed for unknown subscription"
                );
            }
        }

        Ok(())
    }

    async fn handle_subscription_activated(&self, event: &ProviderWebhookEvent) -> AnyResult<()> {
        let Some(resource) = Self::subscription_entity(event) else {
            warn!("billing webhook: subscription.activated without subscription entity, ignoring");
            return Ok(());
        };

        let Some(subscription) = self
            .subscription_repo
            .find_by_provider_subscription_id(resource.id.clone())
            .await?
        else {
            warn!(
                provider_subscription_id = %resource.id,
                "billing webhook: subscription.activated for unknown subscription"
            );
            return Ok(());
        };

        let now = Utc::now();
        let period_start = resource
            .current_start
            .or(resource.created_at)
            .and_then(ts_to_datetime)
            .unwrap_or(now);
        let period_end = resource
            .current_end
            .and_then(ts_to_datetime)
            .unwrap_or(period_start + self.billing_cycle());
        let next_billing_at = resource
            .charge_at
            .and_then(ts_to_datetime)
            .unwrap_or(period_end);

        self.subscription_repo
            .transition(
                subscription.id,
                SubscriptionStatus::Active,
                SubscriptionPeriod {
                    period_start: Some(period_start),
                    period_end: Some(period_end),
                    next_billing_at: Some(next_billing_at),
                    clear_period: false,
                },
            )
            .await?;

        info!(
            subscription_id = %subscription.id,
            provider_subscription_id = %resource.id,
            "billing webhook: subscription activated"
        );

        Ok(())
    }

    async fn handle_subscription_charged(&self, event: &ProviderWebhookEvent) -> AnyResult<()> {
        let Some(resource) = Self::subscription_entity(event) else {
            warn!("billing webhook: subscription.charged without subscription entity, ignoring");
            return Ok(());
        };

        let Some(subscription) = self
            .subscription_repo
            .find_by_provider_subscription_id(resource.id.clone())
            .await?
        else {
            warn!(
                provider_subscription_id = %resource.id,
                "billing webhook: subscription.charged for unknown subscription"
            );
            return Ok(());
        };

        // One more cycle, anchored on whichever is later: the current paid-up
        // window or now. Out-of-order deliveries can only extend the window.
        let now = Utc::now();
        let base = match subscription.period_end {
            Some(period_end) if period_end > now => period_end,
            _ => now,
        };
        let period_end = base + self.billing_cycle();
        let next_billing_at = resource
            .charge_at
            .and_then(ts_to_datetime)
            .unwrap_or(period_end);

        self.subscription_repo
            .transition(
                subscription.id,
                SubscriptionStatus::Active,
                SubscriptionPeriod {
                    period_start: subscription.period_start.or(Some(now)),
                    period_end: Some(period_end),
                    next_billing_at: Some(next_billing_at),
                    clear_period: false,
                },
            )
            .await?;

        info!(
            subscription_id = %subscription.id,
            provider_subscription_id = %resource.id,
            period_end = %period_end,
            "billing webhook: subscription charged, period extended"
        );

        Ok(())
    }

    async fn handle_subscription_cancelled(
        &self,
        event: &ProviderWebhookEvent,
        reason: &str,
    ) -> AnyResult<()> {
        let Some(resource) = Self::subscription_entity(event) else {
            warn!("billing webhook: cancellation event without subscription entity, ignoring");
            return Ok(());
        };

        let Some(subscription) = self
            .subscription_repo
            .find_by_provider_subscription_id(resource.id.clone())
            .await?
        else {
            warn!(
                provider_subscription_id = %resource.id,
                "billing webhook: cancellation event for unknown subscription"
            );
            return Ok(());
        };

        self.subscription_repo
            .mark_cancelled(subscription.id, Some(reason.to_string()), Utc::now())
            .await?;

        info!(
            subscription_id = %subscription.id,
            provider_subscription_id = %resource.id,
            reason,
            "billing webhook: subscription cancelled"
        );

        Ok(())
    }

    async fn handle_subscription_resumed(&self, event: &ProviderWebhookEvent) -> AnyResult<()> {
        let Some(resource) = Self::subscription_entity(event) else {
            warn!("billing webhook: subscription.resumed without subscription entity, ignoring");
            return Ok(());
        };

        let Some(subscription) = self
            .subscription_repo
            .find_by_provider_subscription_id(resource.id.clone())
            .await?
        else {
            warn!(
                provider_subscription_id = %resource.id,
                "billing webhook: subscription.resumed for unknown subscription"
            );
            return Ok(());
        };

        let now = Utc::now();
        let period = match subscription.period_end {
            // The old paid-up window is still running; just flip the status.
            Some(period_end) if period_end > now => SubscriptionPeriod::unchanged(),
            _ => {
                let period_end = now + self.billing_cycle();
                SubscriptionPeriod {
                    period_start: Some(now),
                    period_end: Some(period_end),
                    next_billing_at: Some(period_end),
                    clear_period: false,
                }
            }
        };

        self.subscription_repo
            .transition(subscription.id, SubscriptionStatus::Active, period)
            .await?;

        info!(
            subscription_id = %subscription.id,
            provider_subscription_id = %resource.id,
            "billing webhook: subscription resumed"
        );

        Ok(())
    }
}
