use crate::config::stage::Stage;
use anyhow::{Ok, Result};

use super::config_model::DotEnvyConfig;

fn csv_env(name: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = super::config_model::BackendServer {
        port: std::env::var("SERVER_PORT_BACKEND")
            .expect("SERVER_PORT_BACKEND is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let database = super::config_model::Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let auth = super::config_model::Auth {
        jwt_secret: std::env::var("JWT_USER_SECRET").expect("JWT_USER_SECRET is invalid"),
    };

    let razorpay = super::config_model::Razorpay {
        key_id: std::env::var("RAZORPAY_KEY_ID").unwrap_or_default(),
        key_secret: std::env::var("RAZORPAY_KEY_SECRET").unwrap_or_default(),
        webhook_secret: std::env::var("RAZORPAY_WEBHOOK_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty()),
        plan_id: std::env::var("RAZORPAY_PLAN_ID").unwrap_or_default(),
        trial_days: std::env::var("TRIAL_DAYS")
            .unwrap_or_else(|_| "14".to_string())
            .parse()?,
        billing_cycle_days: std::env::var("BILLING_CYCLE_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?,
        subscription_total_count: std::env::var("SUBSCRIPTION_TOTAL_COUNT")
            .unwrap_or_else(|_| "12".to_string())
            .parse()?,
        checkout_start_lead_secs: std::env::var("CHECKOUT_START_LEAD_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()?,
        request_timeout_secs: std::env::var("PROVIDER_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()?,
    };

    let free_access = super::config_model::FreeAccess {
        user_ids: csv_env("FREE_ACCESS_USER_IDS"),
        emails: csv_env("FREE_ACCESS_EMAILS"),
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        auth,
        razorpay,
        free_access,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or("".to_string());
    Stage::try_from(&stage_str).unwrap_or_default()
}

pub fn get_jwt_secret() -> Result<String> {
    dotenvy::dotenv().ok();

    Ok(std::env::var("JWT_USER_SECRET").expect("JWT_USER_SECRET is invalid"))
}
