pub mod access_policy;
pub mod activation;
pub mod confirmation;
pub mod gateway;
pub mod provisioning;
pub mod reconciliation;
pub mod webhooks;

#[cfg(test)]
pub mod test_support;
