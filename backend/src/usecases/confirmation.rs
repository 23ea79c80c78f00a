use std::sync::Arc;

use chrono::{Duration, Utc};
use crates::domain::{
    repositories::{payments::PaymentRepository, subscriptions::SubscriptionRepository},
    value_objects::{
        enums::payment_statuses::PaymentStatus,
        payments::PaymentUpsert,
        provider_webhook::ts_to_datetime,
        subscriptions::{ConfirmCheckoutDto, ConfirmCheckoutRequest},
    },
};
use thiserror::Error;
use tracing::{error, info, warn};

use super::{activation::activate_with_payment, gateway::ProviderGateway};

#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("invalid checkout signature")]
    InvalidSignature,
    #[error("no subscription matches the confirmed checkout")]
    SubscriptionNotFound,
    #[error("provider does not report the payment as captured or authorized")]
    PaymentVerificationFailed,
    #[error("payment provider unavailable")]
    ProviderUnavailable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ConfirmationError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ConfirmationError::InvalidSignature
            | ConfirmationError::PaymentVerificationFailed => StatusCode::BAD_REQUEST,
            ConfirmationError::SubscriptionNotFound => StatusCode::NOT_FOUND,
            ConfirmationError::ProviderUnavailable => StatusCode::BAD_GATEWAY,
            ConfirmationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ConfirmationError::InvalidSignature => "InvalidSignature",
            ConfirmationError::SubscriptionNotFound => "SubscriptionNotFound",
            ConfirmationError::PaymentVerificationFailed => "PaymentVerificationFailed",
            ConfirmationError::ProviderUnavailable => "ProviderUnavailable",
            ConfirmationError::Internal(_) => "Internal",
        }
    }
}

pub type ConfirmationResult<T> = std::result::Result<T, ConfirmationError>;

/// Synchronous checkout confirmation, for the window before the captured
/// webhook lands. The client is untrusted, so the submitted ids are checked
/// against a provider-issued signature and the payment status is re-fetched
/// from the provider rather than believed.
pub struct ConfirmationUseCase {
    subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync>,
    payment_repo: Arc<dyn PaymentRepository + Send + Sync>,
    gateway: Arc<dyn ProviderGateway>,
    billing_cycle_days: i64,
}

impl ConfirmationUseCase {
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

    pub async fn confirm_checkout(
        &self,
        request: ConfirmCheckoutRequest,
    ) -> ConfirmationResult<ConfirmCheckoutDto> {
        self.gateway
            .verify_checkout_signature(
                &request.provider_subscription_id,
                &request.provider_payment_id,
                &request.signature,
            )
            .map_err(|err| {
                warn!(
                    provider_payment_id = %request.provider_payment_id,
                    provider_subscription_id = %request.provider_subscription_id,
                    error = %err,
                    "billing confirmation: checkout signature rejected"
                );
                ConfirmationError::InvalidSignature
            })?;

        let subscription = self
            .subscription_repo
            .find_by_provider_subscription_id(request.provider_subscription_id.clone())
            .await?
            .ok_or_else(|| {
                warn!(
                    provider_subscription_id = %request.provider_subscription_id,
                    "billing confirmation: no local subscription for confirmed checkout"
                );
                ConfirmationError::SubscriptionNotFound
            })?;

        let resource = self
            .gateway
            .fetch_payment(&request.provider_payment_id)
            .await
            .map_err(|err| {
                error!(
                    provider_payment_id = %request.provider_payment_id,
                    error = ?err,
                    "billing confirmation: failed to fetch payment from provider"
                );
                ConfirmationError::ProviderUnavailable
            })?;

        let status = resource
            .status
            .as_deref()
            .and_then(PaymentStatus::from_str)
            .filter(PaymentStatus::is_corroborating)
            .ok_or_else(|| {
                warn!(
                    provider_payment_id = %request.provider_payment_id,
                    provider_status = ?resource.status,
                    "billing confirmation: provider payment is not captured or authorized"
                );
                ConfirmationError::PaymentVerificationFailed
            })?;

        let paid_at = resource
            .created_at
            .and_then(ts_to_datetime)
            .unwrap_or_else(Utc::now);

        let mut upsert = PaymentUpsert::from_provider_resource(&resource, status, false);
        upsert.provider_subscription_id = Some(request.provider_subscription_id.clone());
        upsert.paid_at = Some(paid_at);

        let updated = activate_with_payment(
            &self.subscription_repo,
            &self.payment_repo,
            &subscription,
            upsert,
            Duration::days(self.billing_cycle_days),
            paid_at,
        )
        .await?;

        info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            provider_payment_id = %request.provider_payment_id,
            "billing confirmation: checkout confirmed"
        );

        Ok(ConfirmCheckoutDto {
            ok: true,
            subscription_status: updated.subscription_status(),
            has_access: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::stage::Stage;
    use crate::usecases::gateway::MockProviderGateway;
    use crate::usecases::test_support::{
        InMemoryPaymentRepo, InMemorySubscriptionRepo, created_subscription,
    };
    use crate::usecases::webhooks::WebhookUseCase;
    use crates::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
    use crates::domain::value_objects::provider_webhook::ProviderPaymentResource;
    use uuid::Uuid;

    fn provider_payment(status: &str) -> ProviderPaymentResource {
        ProviderPaymentResource {
            id: "pay_Ab99".to_string(),
            order_id: Some("order_11".to_string()),
            amount: Some(49900),
            currency: Some("INR".to_string()),
            status: Some(status.to_string()),
            method: Some("card".to_string()),
            error_code: None,
            error_description: None,
            created_at: Some(Utc::now().timestamp()),
        }
    }

    fn confirm_gateway(payment_status: &'static str) -> MockProviderGateway {
        let mut gateway = MockProviderGateway::new();
        gateway
            .expect_verify_checkout_signature()
            .returning(|_, _, _| Ok(()));
        gateway
            .expect_fetch_payment()
            .returning(move |_| Ok(provider_payment(payment_status)));
        gateway
    }

    fn request() -> ConfirmCheckoutRequest {
        ConfirmCheckoutRequest {
            provider_payment_id: "pay_Ab99".to_string(),
            provider_subscription_id: "sub_Nx01".to_string(),
            signature: "cafe".to_string(),
        }
    }

    fn webhook_payload() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_Ab99",
                        "amount": 49900,
                        "currency": "INR",
                        "status": "captured",
                        "created_at": Utc::now().timestamp()
                    }
                },
                "subscription": {
                    "entity": { "id": "sub_Nx01", "status": "active" }
                }
            }
        }))
        .unwrap()
    }

    fn webhook_use_case(
        subscription_repo: Arc<InMemorySubscriptionRepo>,
        payment_repo: Arc<InMemoryPaymentRepo>,
    ) -> WebhookUseCase {
        let mut gateway = MockProviderGateway::new();
        gateway
            .expect_webhook_secret_configured()
            .return_const(false);
        WebhookUseCase::new(
            subscription_repo,
            payment_repo,
            Arc::new(gateway),
            30,
            Stage::Local,
        )
    }

    #[tokio::test]
    async fn webhook_and_confirmation_converge_in_either_order() {
        for confirmation_first in [true, false] {
            let subscription_repo = Arc::new(InMemorySubscriptionRepo::new());
            let payment_repo = Arc::new(InMemoryPaymentRepo::new());
            let seeded = created_subscription(Uuid::new_v4());
            let subscription_id = seeded.id;
            subscription_repo.seed(seeded);

            let confirmation = ConfirmationUseCase::new(
                Arc::clone(&subscription_repo) as Arc<dyn SubscriptionRepository + Send + Sync>,
                Arc::clone(&payment_repo) as Arc<dyn PaymentRepository + Send + Sync>,
                Arc::new(confirm_gateway("captured")),
                30,
            );
            let webhook = webhook_use_case(
                Arc::clone(&subscription_repo),
                Arc::clone(&payment_repo),
            );

            if confirmation_first {
                confirmation.confirm_checkout(request()).await.unwrap();
                webhook
                    .handle_provider_webhook(&webhook_payload(), None)
                    .await
                    .unwrap();
            } else {
                webhook
                    .handle_provider_webhook(&webhook_payload(), None)
                    .await
                    .unwrap();
                confirmation.confirm_checkout(request()).await.unwrap();
            }

            assert_eq!(payment_repo.len(), 1, "exactly one ledger row per payment id");
            let payment = payment_repo.get("pay_Ab99").unwrap();
            assert_eq!(payment.payment_status(), PaymentStatus::Captured);
            assert!(payment.received_via_webhook);

            let subscription = subscription_repo.get(subscription_id).unwrap();
            assert_eq!(
                subscription.subscription_status(),
                SubscriptionStatus::Active
            );
        }
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected_before_any_lookup() {
        let mut gateway = MockProviderGateway::new();
        gateway
            .expect_verify_checkout_signature()
            .returning(|_, _, _| Err(anyhow::anyhow!("invalid checkout signature")));

        let confirmation = ConfirmationUseCase::new(
            Arc::new(InMemorySubscriptionRepo::new()),
            Arc::new(InMemoryPaymentRepo::new()),
            Arc::new(gateway),
            30,
        );

        let err = confirmation.confirm_checkout(request()).await.unwrap_err();
        assert!(matches!(err, ConfirmationError::InvalidSignature));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_subscription_is_a_404() {
        let confirmation = ConfirmationUseCase::new(
            Arc::new(InMemorySubscriptionRepo::new()),
            Arc::new(InMemoryPaymentRepo::new()),
            Arc::new(confirm_gateway("captured")),
            30,
        );

        let err = confirmation.confirm_checkout(request()).await.unwrap_err();
        assert!(matches!(err, ConfirmationError::SubscriptionNotFound));
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn client_asserted_status_is_not_trusted() {
        let subscription_repo = Arc::new(InMemorySubscriptionRepo::new());
        let payment_repo = Arc::new(InMemoryPaymentRepo::new());
        subscription_repo.seed(created_subscription(Uuid::new_v4()));

        // The provider reports the payment as failed; confirmation must not
        // activate no matter what the client claims.
        let confirmation = ConfirmationUseCase::new(
            Arc::clone(&subscription_repo) as Arc<dyn SubscriptionRepository + Send + Sync>,
            Arc::clone(&payment_repo) as Arc<dyn PaymentRepository + Send + Sync>,
            Arc::new(confirm_gateway("failed")),
            30,
        );

        let err = confirmation.confirm_checkout(request()).await.unwrap_err();
        assert!(matches!(err, ConfirmationError::PaymentVerificationFailed));
        assert_eq!(payment_repo.len(), 0);
    }
}
