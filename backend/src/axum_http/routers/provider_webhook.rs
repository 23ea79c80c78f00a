use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use crates::{
    domain::repositories::{
        payments::PaymentRepository, subscriptions::SubscriptionRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{payments::PaymentPostgres, subscriptions::SubscriptionPostgres},
    },
    payments::razorpay_client::RazorpayClient,
};
use serde_json::json;

use crate::{
    axum_http::error_responses::error_response,
    config::{config_loader, config_model::DotEnvyConfig},
    usecases::webhooks::WebhookUseCase,
};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    config: Arc<DotEnvyConfig>,
    razorpay_client: Arc<RazorpayClient>,
) -> Router {
    let subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync> =
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let payment_repo: Arc<dyn PaymentRepository + Send + Sync> =
        Arc::new(PaymentPostgres::new(Arc::clone(&db_pool)));

    let webhook_usecase = WebhookUseCase::new(
        subscription_repo,
        payment_repo,
        razorpay_client,
        config.razorpay.billing_cycle_days,
        config_loader::get_stage(),
    );

    Router::new()
        .route("/razorpay", post(handle_provider_webhook))
        .with_state(Arc::new(webhook_usecase))
}

/// The raw body must reach the use case unparsed; the signature is computed
/// over the exact bytes the provider sent.
pub async fn handle_provider_webhook(
    State(webhook_usecase): State<Arc<WebhookUseCase>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match webhook_usecase
        .handle_provider_webhook(&body, signature)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(err) => error_response(err.status_code(), err.error_code()),
    }
}
