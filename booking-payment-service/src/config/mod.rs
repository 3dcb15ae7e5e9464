use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::error::AppError;
use std::time::Duration;

/// Environment variable prefix, e.g. `PAYMENTS__GATEWAY__KEY_ID`.
pub const CONFIG_PREFIX: &str = "PAYMENTS";

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub cash: CashCollectionConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_database_url")]
    pub url: Secret<String>,
    #[serde(default = "default_db_name")]
    pub db_name: String,
}

/// Gateway credentials, injected into the adapter at construction.
#[derive(Deserialize, Clone, Debug)]
pub struct GatewayConfig {
    #[serde(default)]
    pub key_id: String,
    #[serde(default = "empty_secret")]
    pub key_secret: Secret<String>,
    #[serde(default = "empty_secret")]
    pub webhook_secret: Secret<String>,
    #[serde(default = "default_gateway_url")]
    pub api_base_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.expose_secret().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct CashCollectionConfig {
    #[serde(default = "default_otp_ttl_secs")]
    pub otp_ttl_secs: i64,
    #[serde(default = "default_otp_max_attempts")]
    pub otp_max_attempts: u32,
    /// Dues above which a vendor is suspended from new bookings.
    #[serde(default = "default_cash_limit")]
    pub default_cash_limit: i64,
}

/// Commission and worker split, in basis points.
#[derive(Deserialize, Clone, Debug)]
pub struct PricingConfig {
    #[serde(default = "default_commission_bps")]
    pub online_commission_bps: u32,
    #[serde(default = "default_commission_bps")]
    pub cash_commission_bps: u32,
    #[serde(default = "default_commission_bps")]
    pub plan_benefit_commission_bps: u32,
    #[serde(default = "default_worker_share_bps")]
    pub worker_share_bps: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NotificationConfig {
    /// Notification service base URL; messages are only logged when unset.
    pub endpoint: Option<String>,
    #[serde(default = "default_notification_timeout_ms")]
    pub timeout_ms: u64,
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        let config: Config = service_core::config::load_layered(CONFIG_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        let pricing = &self.pricing;
        let bps = [
            pricing.online_commission_bps,
            pricing.cash_commission_bps,
            pricing.plan_benefit_commission_bps,
            pricing.worker_share_bps,
        ];
        if bps.iter().any(|v| *v > 10_000) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "pricing basis points must be between 0 and 10000"
            )));
        }
        if self.cash.otp_max_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "cash.otp_max_attempts must be at least 1"
            )));
        }
        if self.cash.otp_ttl_secs < 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "cash.otp_ttl_secs must not be negative"
            )));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_database_url(),
            db_name: default_db_name(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            key_secret: empty_secret(),
            webhook_secret: empty_secret(),
            api_base_url: default_gateway_url(),
            currency: default_currency(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

impl Default for CashCollectionConfig {
    fn default() -> Self {
        Self {
            otp_ttl_secs: default_otp_ttl_secs(),
            otp_max_attempts: default_otp_max_attempts(),
            default_cash_limit: default_cash_limit(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            online_commission_bps: default_commission_bps(),
            cash_commission_bps: default_commission_bps(),
            plan_benefit_commission_bps: default_commission_bps(),
            worker_share_bps: default_worker_share_bps(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_notification_timeout_ms(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_service_name() -> String {
    "booking-payment-service".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3013
}

fn default_backend() -> StorageBackend {
    StorageBackend::Mongo
}

fn default_database_url() -> Secret<String> {
    Secret::new("mongodb://localhost:27017".to_string())
}

fn default_db_name() -> String {
    "booking_payments_db".to_string()
}

fn empty_secret() -> Secret<String> {
    Secret::new(String::new())
}

fn default_gateway_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_currency() -> String {
    crate::models::DEFAULT_CURRENCY.to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    15
}

fn default_otp_ttl_secs() -> i64 {
    600
}

fn default_otp_max_attempts() -> u32 {
    5
}

fn default_cash_limit() -> i64 {
    500_000
}

// TODO: confirm the per-rail commission and worker share with marketplace ops before launch.
fn default_commission_bps() -> u32 {
    1_000
}

fn default_worker_share_bps() -> u32 {
    7_000
}

fn default_notification_timeout_ms() -> u64 {
    2_000
}

fn default_log_level() -> String {
    "info,booking_payment_service=debug".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            gateway: GatewayConfig::default(),
            cash: CashCollectionConfig::default(),
            pricing: PricingConfig::default(),
            notification: NotificationConfig::default(),
            observability: ObservabilityConfig::default(),
            service_name: default_service_name(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert!(!config.gateway.is_configured());
        assert_eq!(config.gateway.currency, "INR");
    }

    #[test]
    fn rejects_out_of_range_basis_points() {
        let mut config = base_config();
        config.pricing.worker_share_bps = 12_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_attempt_ceiling() {
        let mut config = base_config();
        config.cash.otp_max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
