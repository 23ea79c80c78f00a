#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub auth: Auth,
    pub razorpay: Razorpay,
    pub free_access: FreeAccess,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Auth {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct Razorpay {
    /// Empty key id/secret means the provider is not configured for this
    /// deployment; the access policy then grants free access.
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: Option<String>,
    pub plan_id: String,
    pub trial_days: i64,
    pub billing_cycle_days: i64,
    pub subscription_total_count: u32,
    pub checkout_start_lead_secs: i64,
    pub request_timeout_secs: u64,
}

impl Razorpay {
    pub fn keys_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FreeAccess {
    pub user_ids: Vec<String>,
    pub emails: Vec<String>,
}
