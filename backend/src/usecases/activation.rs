use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use crates::domain::{
    entities::subscriptions::SubscriptionEntity,
    repositories::{payments::PaymentRepository, subscriptions::SubscriptionRepository},
    value_objects::{
        enums::subscription_statuses::SubscriptionStatus, payments::PaymentUpsert,
        subscriptions::SubscriptionPeriod,
    },
};
use tracing::info;

/// The single activation routine behind both `payment.captured` webhooks and
/// client checkout confirmations. The two paths race; because this writes
/// through the keyed payment upsert and the monotonic transition, either
/// arrival order converges on one captured Payment row and one `active`
/// Subscription.
pub async fn activate_with_payment(
    subscription_repo: &Arc<dyn SubscriptionRepository + Send + Sync>,
    payment_repo: &Arc<dyn PaymentRepository + Send + Sync>,
    subscription: &SubscriptionEntity,
    mut payment: PaymentUpsert,
    billing_cycle: Duration,
    paid_at: DateTime<Utc>,
) -> Result<SubscriptionEntity> {
    payment.subscription_id = Some(subscription.id);
    payment.user_id = Some(subscription.user_id);
    if payment.provider_subscription_id.is_none() {
        payment.provider_subscription_id = subscription.provider_subscription_id.clone();
    }
    if payment.paid_at.is_none() {
        payment.paid_at = Some(paid_at);
    }

    let provider_payment_id = payment.provider_payment_id.clone();
    payment_repo.upsert_by_provider_payment_id(payment).await?;

    let period_end = paid_at + billing_cycle;
    let updated = subscription_repo
        .transition(
            subscription.id,
            SubscriptionStatus::Active,
            SubscriptionPeriod {
                period_start: Some(paid_at),
                period_end: Some(period_end),
                next_billing_at: Some(period_end),
                clear_period: false,
            },
        )
        .await?;

    info!(
        subscription_id = %subscription.id,
        user_id = %subscription.user_id,
        provider_payment_id = %provider_payment_id,
        period_end = %updated.period_end.unwrap_or(period_end),
        "billing: subscription activated from payment"
    );

    Ok(updated)
}
