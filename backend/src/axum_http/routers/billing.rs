use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use crates::{
    domain::{
        repositories::{payments::PaymentRepository, subscriptions::SubscriptionRepository},
        value_objects::subscriptions::{CancelSubscriptionRequest, ConfirmCheckoutRequest},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{payments::PaymentPostgres, subscriptions::SubscriptionPostgres},
    },
    payments::razorpay_client::RazorpayClient,
};
use serde_json::json;

use crate::{
    auth::AuthUser,
    axum_http::error_responses::error_response,
    config::config_model::DotEnvyConfig,
    usecases::{
        access_policy::{AccessBypassPolicy, EntitlementUseCase},
        confirmation::ConfirmationUseCase,
        gateway::ProviderGateway,
        provisioning::ProvisioningUseCase,
        reconciliation::ReconciliationUseCase,
    },
};

pub struct BillingState {
    entitlement: EntitlementUseCase,
    provisioning: ProvisioningUseCase,
    confirmation: ConfirmationUseCase,
    reconciliation: Arc<ReconciliationUseCase>,
}

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    config: Arc<DotEnvyConfig>,
    razorpay_client: Arc<RazorpayClient>,
) -> Router {
    let subscription_repo: Arc<dyn SubscriptionRepository + Send + Sync> =
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let payment_repo: Arc<dyn PaymentRepository + Send + Sync> =
        Arc::new(PaymentPostgres::new(Arc::clone(&db_pool)));
    let gateway: Arc<dyn ProviderGateway> = razorpay_client;

    let reconciliation = Arc::new(ReconciliationUseCase::new(
        Arc::clone(&subscription_repo),
        Arc::clone(&payment_repo),
        Arc::clone(&gateway),
        config.razorpay.billing_cycle_days,
    ));

    let bypass = AccessBypassPolicy::new(
        config.free_access.user_ids.clone(),
        config.free_access.emails.clone(),
        !config.razorpay.keys_configured(),
    );

    let entitlement = EntitlementUseCase::new(
        Arc::clone(&subscription_repo),
        Arc::clone(&payment_repo),
        bypass,
        Arc::clone(&reconciliation),
    );

    let provisioning = ProvisioningUseCase::new(
        Arc::clone(&subscription_repo),
        Arc::clone(&gateway),
        config.razorpay.plan_id.clone(),
        config.razorpay.trial_days,
        config.razorpay.subscription_total_count,
        config.razorpay.checkout_start_lead_secs,
    );

    let confirmation = ConfirmationUseCase::new(
        Arc::clone(&subscription_repo),
        Arc::clone(&payment_repo),
        Arc::clone(&gateway),
        config.razorpay.billing_cycle_days,
    );

    Router::new()
        .route("/status", get(billing_status))
        .route("/trial", post(ensure_trial))
        .route("/checkout", post(begin_checkout))
        .route("/confirm", post(confirm_checkout))
        .route("/sync", post(sync_subscription))
        .route("/cancel", post(cancel_subscription))
        .with_state(Arc::new(BillingState {
            entitlement,
            provisioning,
            confirmation,
            reconciliation,
        }))
}

pub async fn billing_status(
    State(state): State<Arc<BillingState>>,
    auth: AuthUser,
) -> impl IntoResponse {
    match state
        .entitlement
        .billing_status(auth.user_id, auth.email.clone())
        .await
    {
        Ok(dto) => (StatusCode::OK, Json(dto)).into_response(),
        Err(err) => error_response(err.status_code(), "Internal"),
    }
}

pub async fn ensure_trial(
    State(state): State<Arc<BillingState>>,
    auth: AuthUser,
) -> impl IntoResponse {
    match state
        .provisioning
        .ensure_trial(auth.user_id, auth.external_user_id())
        .await
    {
        Ok(subscription) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "status": subscription.status,
                "trialEnd": subscription.trial_end,
            })),
        )
            .into_response(),
        Err(err) => error_response(err.status_code(), err.error_code()),
    }
}

pub async fn begin_checkout(
    State(state): State<Arc<BillingState>>,
    auth: AuthUser,
) -> impl IntoResponse {
    match state
        .provisioning
        .begin_checkout(auth.user_id, auth.email.clone(), auth.external_user_id())
        .await
    {
        Ok(dto) => (StatusCode::OK, Json(dto)).into_response(),
        Err(err) => error_response(err.status_code(), err.error_code()),
    }
}

pub async fn confirm_checkout(
    State(state): State<Arc<BillingState>>,
    _auth: AuthUser,
    Json(request): Json<ConfirmCheckoutRequest>,
) -> impl IntoResponse {
    match state.confirmation.confirm_checkout(request).await {
        Ok(dto) => (StatusCode::OK, Json(dto)).into_response(),
        Err(err) => error_response(err.status_code(), err.error_code()),
    }
}

pub async fn sync_subscription(
    State(state): State<Arc<BillingState>>,
    auth: AuthUser,
) -> impl IntoResponse {
    match state.reconciliation.sync_for_user(auth.user_id).await {
        Ok(status) => (
            StatusCode::OK,
            Json(json!({ "ok": true, "status": status.to_string() })),
        )
            .into_response(),
        Err(err) => error_response(err.status_code(), err.error_code()),
    }
}

pub async fn cancel_subscription(
    State(state): State<Arc<BillingState>>,
    auth: AuthUser,
    body: Option<Json<CancelSubscriptionRequest>>,
) -> impl IntoResponse {
    let reason = body.and_then(|Json(request)| request.reason);
    match state.provisioning.cancel(auth.user_id, reason).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))).into_response(),
        Err(err) => error_response(err.status_code(), err.error_code()),
    }
}
