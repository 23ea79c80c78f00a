use std::time::Duration;

use anyhow::Result;
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use sha2::Sha256;
use tracing::error;

use crate::domain::value_objects::provider_webhook::{
    ProviderPaymentResource, ProviderSubscriptionResource, SubscriptionNotes,
};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.razorpay.com/v1";

/// Minimal Razorpay client built on reqwest. Every call carries a bounded
/// timeout so a slow provider cannot pin a request handler.
pub struct RazorpayClient {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorEnvelope {
    error: RazorpayErrorDetails,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetails {
    code: Option<String>,
    description: Option<String>,
    field: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default)]
    items: Vec<T>,
}

impl RazorpayClient {
    pub fn new(
        key_id: String,
        key_secret: String,
        webhook_secret: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            key_id,
            key_secret,
            webhook_secret,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn webhook_secret_configured(&self) -> bool {
        self.webhook_secret
            .as_deref()
            .is_some_and(|secret| !secret.is_empty())
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (provider_error_code, provider_error_description, provider_error_field) =
            match serde_json::from_str::<RazorpayErrorEnvelope>(&body) {
                Ok(envelope) => (
                    envelope.error.code,
                    envelope.error.description,
                    envelope.error.field,
                ),
                Err(_) => (None, None, None),
            };

        error!(
            status = %status,
            provider_error_code = ?provider_error_code,
            provider_error_description = ?provider_error_description,
            provider_error_field = ?provider_error_field,
            response_body = %body,
            context = %context,
            "razorpay api request failed"
        );

        anyhow::bail!(
            "Razorpay API request failed: {} (status {})",
            context,
            status
        );
    }

    /// Creates (or reuses, via fail_existing=0) a customer for the email.
    /// https://razorpay.com/docs/api/customers
    pub async fn create_customer(&self, email: &str, external_user_id: &str) -> Result<String> {
        let body = serde_json::json!({
            "email": email,
            "fail_existing": "0",
            "notes": { "external_user_id": external_user_id },
        });

        let resp = self
            .http
            .post(format!("{API_BASE}/customers"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create customer").await?;

        #[derive(Deserialize)]
        struct CustomerResp {
            id: String,
        }

        let parsed: CustomerResp = resp.json().await?;
        Ok(parsed.id)
    }

    /// https://razorpay.com/docs/api/plans
    pub async fn create_plan(
        &self,
        period: &str,
        interval: u32,
        item_name: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<String> {
        let body = serde_json::json!({
            "period": period,
            "interval": interval,
            "item": {
                "name": item_name,
                "amount": amount_minor,
                "currency": currency,
            },
        });

        let resp = self
            .http
            .post(format!("{API_BASE}/plans"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create plan").await?;

        #[derive(Deserialize)]
        struct PlanResp {
            id: String,
        }

        let parsed: PlanResp = resp.json().await?;
        Ok(parsed.id)
    }

    pub async fn fetch_plan(&self, plan_id: &str) -> Result<serde_json::Value> {
        let resp = self
            .http
            .get(format!("{API_BASE}/plans/{plan_id}"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "fetch plan").await?;

        Ok(resp.json().await?)
    }

    /// https://razorpay.com/docs/api/subscriptions#create-a-subscription
    pub async fn create_subscription(
        &self,
        plan_id: &str,
        start_at: i64,
        total_count: u32,
        notes: SubscriptionNotes,
    ) -> Result<ProviderSubscriptionResource> {
        let body = serde_json::json!({
            "plan_id": plan_id,
            "total_count": total_count,
            "start_at": start_at,
            "customer_notify": 1,
            "notes": notes,
        });

        let resp = self
            .http
            .post(format!("{API_BASE}/subscriptions"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create subscription").await?;

        Ok(resp.json().await?)
    }

    pub async fn cancel_subscription(&self, provider_subscription_id: &str) -> Result<()> {
        let body = serde_json::json!({ "cancel_at_cycle_end": 0 });

        let resp = self
            .http
            .post(format!(
                "{API_BASE}/subscriptions/{provider_subscription_id}/cancel"
            ))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(resp, "cancel subscription").await?;

        Ok(())
    }

    pub async fn fetch_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> Result<ProviderSubscriptionResource> {
        let resp = self
            .http
            .get(format!(
                "{API_BASE}/subscriptions/{provider_subscription_id}"
            ))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "fetch subscription").await?;

        Ok(resp.json().await?)
    }

    pub async fn fetch_payment(
        &self,
        provider_payment_id: &str,
    ) -> Result<ProviderPaymentResource> {
        let resp = self
            .http
            .get(format!("{API_BASE}/payments/{provider_payment_id}"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "fetch payment").await?;

        Ok(resp.json().await?)
    }

    pub async fn list_payments_for_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Vec<ProviderPaymentResource>> {
        let resp = self
            .http
            .get(format!("{API_BASE}/payments"))
            .query(&[("subscription_id", provider_subscription_id)])
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "list payments for subscription").await?;

        let parsed: Collection<ProviderPaymentResource> = resp.json().await?;
        Ok(parsed.items)
    }

    /// Verifies the webhook body signature (`x-razorpay-signature`):
    /// hex(HMAC-SHA256(webhook_secret, raw_body)). Comparison happens inside
    /// `verify_slice`, which is constant-time.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature_header: &str) -> Result<()> {
        let secret = self
            .webhook_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| anyhow::anyhow!("webhook secret is not configured"))?;

        let provided = hex::decode(signature_header.trim())
            .map_err(|_| anyhow::anyhow!("signature header is not valid hex"))?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
        mac.update(payload);
        mac.verify_slice(&provided)
            .map_err(|_| anyhow::anyhow!("invalid webhook signature"))?;

        Ok(())
    }

    /// Verifies the signature a client submits after checkout:
    /// hex(HMAC-SHA256(key_secret, subscription_id + "|" + payment_id)).
    pub fn verify_checkout_signature(
        &self,
        provider_subscription_id: &str,
        provider_payment_id: &str,
        signature: &str,
    ) -> Result<()> {
        let provided = hex::decode(signature.trim())
            .map_err(|_| anyhow::anyhow!("checkout signature is not valid hex"))?;

        let signed_payload = format!("{provider_subscription_id}|{provider_payment_id}");
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())?;
        mac.update(signed_payload.as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| anyhow::anyhow!("invalid checkout signature"))?;

        Ok(())
    }
}
