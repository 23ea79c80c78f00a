use anyhow::Result as AnyResult;
use async_trait::async_trait;
use crates::{
    domain::value_objects::provider_webhook::{
        ProviderPaymentResource, ProviderSubscriptionResource, SubscriptionNotes,
    },
    payments::razorpay_client::RazorpayClient,
};

/// Seam over the provider SDK so use cases can be exercised against a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    fn key_id(&self) -> String;

    fn webhook_secret_configured(&self) -> bool;

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<()>;

    fn verify_checkout_signature(
        &self,
        provider_subscription_id: &str,
        provider_payment_id: &str,
        signature: &str,
    ) -> AnyResult<()>;

    async fn create_customer(&self, email: &str, external_user_id: &str) -> AnyResult<String>;

    async fn create_subscription(
        &self,
        plan_id: &str,
        start_at: i64,
        total_count: u32,
        notes: SubscriptionNotes,
    ) -> AnyResult<ProviderSubscriptionResource>;

    async fn cancel_subscription(&self, provider_subscription_id: &str) -> AnyResult<()>;

    async fn fetch_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> AnyResult<ProviderSubscriptionResource>;

    async fn fetch_payment(&self, provider_payment_id: &str)
    -> AnyResult<ProviderPaymentResource>;

    async fn list_payments_for_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> AnyResult<Vec<ProviderPaymentResource>>;
}

#[async_trait]
impl ProviderGateway for RazorpayClient {
    fn key_id(&self) -> String {
        RazorpayClient::key_id(self).to_string()
    }

    fn webhook_secret_configured(&self) -> bool {
        RazorpayClient::webhook_secret_configured(self)
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<()> {
        RazorpayClient::verify_webhook_signature(self, payload, signature)
    }

    fn verify_checkout_signature(
        &self,
        provider_subscription_id: &str,
        provider_payment_id: &str,
        signature: &str,
    ) -> AnyResult<()> {
        RazorpayClient::verify_checkout_signature(
            self,
            provider_subscription_id,
            provider_payment_id,
            signature,
        )
    }

    async fn create_customer(&self, email: &str, external_user_id: &str) -> AnyResult<String> {
        RazorpayClient::create_customer(self, email, external_user_id).await
    }

    async fn create_subscription(
        &self,
        plan_id: &str,
        start_at: i64,
        total_count: u32,
        notes: SubscriptionNotes,
    ) -> AnyResult<ProviderSubscriptionResource> {
        RazorpayClient::create_subscription(self, plan_id, start_at, total_count, notes).await
    }

    async fn cancel_subscription(&self, provider_subscription_id: &str) -> AnyResult<()> {
        RazorpayClient::cancel_subscription(self, provider_subscription_id).await
    }

    async fn fetch_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> AnyResult<ProviderSubscriptionResource> {
        RazorpayClient::fetch_subscription(self, provider_subscription_id).await
    }

    async fn fetch_payment(
        &self,
        provider_payment_id: &str,
    ) -> AnyResult<ProviderPaymentResource> {
        RazorpayClient::fetch_payment(self, provider_payment_id).await
    }

    async fn list_payments_for_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> AnyResult<Vec<ProviderPaymentResource>> {
        RazorpayClient::list_payments_for_subscription(self, provider_subscription_id).await
    }
}
