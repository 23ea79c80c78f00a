pub mod payment_statuses;
pub mod provider_subscription_statuses;
pub mod subscription_statuses;
