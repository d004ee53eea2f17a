//! Environment-driven configuration
//!
//! Everything is read once at startup (after `dotenvy::dotenv()`) and passed
//! down explicitly. Gateway credentials are optional: a gateway whose
//! variables are missing is simply not registered.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use thiserror::Error;

const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_BIND_ADDR: &str = "BIND_ADDR";
const ENV_PLATFORM_ADMIN_ID: &str = "PLATFORM_ADMIN_ID";
const ENV_WALLET_MIN_TOP_UP: &str = "WALLET_MIN_TOP_UP";
const ENV_WALLET_MAX_TOP_UP: &str = "WALLET_MAX_TOP_UP";

const ENV_PHONEPE_CLIENT_ID: &str = "PHONEPE_CLIENT_ID";
const ENV_PHONEPE_CLIENT_SECRET: &str = "PHONEPE_CLIENT_SECRET";
const ENV_PHONEPE_CLIENT_VERSION: &str = "PHONEPE_CLIENT_VERSION";
const ENV_PHONEPE_BASE_URL: &str = "PHONEPE_BASE_URL";
const ENV_PHONEPE_AUTH_URL: &str = "PHONEPE_AUTH_URL";
const ENV_PHONEPE_REDIRECT_URL: &str = "PHONEPE_REDIRECT_URL";
const ENV_PHONEPE_WEBHOOK_USERNAME: &str = "PHONEPE_WEBHOOK_USERNAME";
const ENV_PHONEPE_WEBHOOK_PASSWORD: &str = "PHONEPE_WEBHOOK_PASSWORD";

const ENV_RAZORPAY_KEY_ID: &str = "RAZORPAY_KEY_ID";
const ENV_RAZORPAY_KEY_SECRET: &str = "RAZORPAY_KEY_SECRET";
const ENV_RAZORPAY_WEBHOOK_SECRET: &str = "RAZORPAY_WEBHOOK_SECRET";
const ENV_RAZORPAY_BASE_URL: &str = "RAZORPAY_BASE_URL";

const ENV_PLAN_EXPIRY_INTERVAL: &str = "PLAN_EXPIRY_INTERVAL_SECS";
const ENV_PENDING_PAYMENT_INTERVAL: &str = "PENDING_PAYMENT_INTERVAL_SECS";
const ENV_PENDING_PAYMENT_MIN_AGE: &str = "PENDING_PAYMENT_MIN_AGE_SECS";
const ENV_PENDING_PAYMENT_MAX_AGE: &str = "PENDING_PAYMENT_MAX_AGE_SECS";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_PHONEPE_BASE_URL: &str = "https://api.phonepe.com/apis/pg";
const DEFAULT_PHONEPE_AUTH_URL: &str = "https://api.phonepe.com/apis/identity-manager";
const DEFAULT_RAZORPAY_BASE_URL: &str = "https://api.razorpay.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub payments: PaymentSettings,
    pub phonepe: Option<PhonePeConfig>,
    pub razorpay: Option<RazorpayConfig>,
    pub jobs: JobSettings,
}

/// Knobs the payment core needs at request time
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Account credited on the platform side of every ledger pair
    pub platform_admin_id: i32,
    pub wallet_min_top_up: Decimal,
    pub wallet_max_top_up: Decimal,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            platform_admin_id: 1,
            wallet_min_top_up: Decimal::ONE,
            wallet_max_top_up: Decimal::from(100_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhonePeConfig {
    pub client_id: String,
    pub client_secret: String,
    pub client_version: String,
    pub base_url: String,
    pub auth_url: String,
    pub redirect_url: String,
    pub webhook_username: String,
    pub webhook_password: String,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub plan_expiry_interval_secs: u64,
    pub pending_payment_interval_secs: u64,
    pub pending_payment_min_age_secs: i64,
    pub pending_payment_max_age_secs: i64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            plan_expiry_interval_secs: 3600,
            pending_payment_interval_secs: 300,
            pending_payment_min_age_secs: 120,
            pending_payment_max_age_secs: 86_400,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required(ENV_DATABASE_URL)?;
        let bind_addr = env::var(ENV_BIND_ADDR).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let defaults = PaymentSettings::default();
        let payments = PaymentSettings {
            platform_admin_id: parsed(ENV_PLATFORM_ADMIN_ID, defaults.platform_admin_id)?,
            wallet_min_top_up: parsed(ENV_WALLET_MIN_TOP_UP, defaults.wallet_min_top_up)?,
            wallet_max_top_up: parsed(ENV_WALLET_MAX_TOP_UP, defaults.wallet_max_top_up)?,
        };
        if payments.wallet_min_top_up > payments.wallet_max_top_up {
            return Err(ConfigError::Invalid {
                name: ENV_WALLET_MIN_TOP_UP,
                value: payments.wallet_min_top_up.to_string(),
            });
        }

        let job_defaults = JobSettings::default();
        let jobs = JobSettings {
            plan_expiry_interval_secs: parsed(
                ENV_PLAN_EXPIRY_INTERVAL,
                job_defaults.plan_expiry_interval_secs,
            )?,
            pending_payment_interval_secs: parsed(
                ENV_PENDING_PAYMENT_INTERVAL,
                job_defaults.pending_payment_interval_secs,
            )?,
            pending_payment_min_age_secs: parsed(
                ENV_PENDING_PAYMENT_MIN_AGE,
                job_defaults.pending_payment_min_age_secs,
            )?,
            pending_payment_max_age_secs: parsed(
                ENV_PENDING_PAYMENT_MAX_AGE,
                job_defaults.pending_payment_max_age_secs,
            )?,
        };

        Ok(Self {
            database_url,
            bind_addr,
            payments,
            phonepe: phonepe_from_env()?,
            razorpay: razorpay_from_env()?,
            jobs,
        })
    }
}

fn phonepe_from_env() -> Result<Option<PhonePeConfig>, ConfigError> {
    let Ok(client_id) = env::var(ENV_PHONEPE_CLIENT_ID) else {
        tracing::warn!("PHONEPE_CLIENT_ID not set - PhonePe gateway disabled");
        return Ok(None);
    };

    Ok(Some(PhonePeConfig {
        client_id,
        client_secret: required(ENV_PHONEPE_CLIENT_SECRET)?,
        client_version: env::var(ENV_PHONEPE_CLIENT_VERSION).unwrap_or_else(|_| "1".to_string()),
        base_url: env::var(ENV_PHONEPE_BASE_URL)
            .unwrap_or_else(|_| DEFAULT_PHONEPE_BASE_URL.to_string()),
        auth_url: env::var(ENV_PHONEPE_AUTH_URL)
            .unwrap_or_else(|_| DEFAULT_PHONEPE_AUTH_URL.to_string()),
        redirect_url: required(ENV_PHONEPE_REDIRECT_URL)?,
        webhook_username: required(ENV_PHONEPE_WEBHOOK_USERNAME)?,
        webhook_password: required(ENV_PHONEPE_WEBHOOK_PASSWORD)?,
    }))
}

fn razorpay_from_env() -> Result<Option<RazorpayConfig>, ConfigError> {
    let Ok(key_id) = env::var(ENV_RAZORPAY_KEY_ID) else {
        tracing::warn!("RAZORPAY_KEY_ID not set - Razorpay gateway disabled");
        return Ok(None);
    };

    Ok(Some(RazorpayConfig {
        key_id,
        key_secret: required(ENV_RAZORPAY_KEY_SECRET)?,
        webhook_secret: required(ENV_RAZORPAY_WEBHOOK_SECRET)?,
        base_url: env::var(ENV_RAZORPAY_BASE_URL)
            .unwrap_or_else(|_| DEFAULT_RAZORPAY_BASE_URL.to_string()),
    }))
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
