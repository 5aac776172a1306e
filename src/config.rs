//! Service configuration

use crate::provider::http::DEFAULT_RPC_TIMEOUT;
use crate::resolver::DEFAULT_CACHE_TTL;
use crate::session::SessionConfig;
use crate::store::FirestoreConfig;
use crate::transactions::ConfirmPolicy;
use crate::{PaymentError, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Default gateway listen address
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Timeouts, retry policy and backend settings for the payment services
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    /// How long resolved contract addresses are reused before refetching
    pub cache_ttl: Duration,
    /// Client-side wait for a payment confirmation
    pub payment_timeout: Duration,
    /// Wait for a token's `decimals()` before assuming 6
    pub token_decimals_timeout: Duration,
    /// Chain detection attempts after connecting
    pub chain_detect_attempts: u32,
    /// Chain detection backoff unit
    pub chain_detect_backoff: Duration,
    /// Receipt polling interval
    pub receipt_poll_interval: Duration,
    /// Age after which an unconfirmed payment is marked expired
    pub payment_expiry: Duration,
    /// How long after creation an expired payment is still checked for a late receipt
    pub expired_recheck_window: Duration,
    /// Per-request timeout of dedicated RPC providers
    pub rpc_timeout: Duration,
    /// Remote store; in-memory when absent
    pub firestore: Option<FirestoreConfig>,
    /// Gateway listen address
    pub bind_address: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            payment_timeout: Duration::from_secs(90),
            token_decimals_timeout: Duration::from_millis(6000),
            chain_detect_attempts: 3,
            chain_detect_backoff: Duration::from_secs(1),
            receipt_poll_interval: Duration::from_millis(1500),
            payment_expiry: Duration::from_secs(1800),
            expired_recheck_window: Duration::from_secs(24 * 3600),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            firestore: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

impl PaymentsConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the contract cache refresh window
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the payment confirmation timeout
    pub fn with_payment_timeout(mut self, timeout: Duration) -> Self {
        self.payment_timeout = timeout;
        self
    }

    /// Set the token decimals timeout
    pub fn with_token_decimals_timeout(mut self, timeout: Duration) -> Self {
        self.token_decimals_timeout = timeout;
        self
    }

    /// Set the chain detection retry policy
    pub fn with_chain_detection(mut self, attempts: u32, backoff: Duration) -> Self {
        self.chain_detect_attempts = attempts;
        self.chain_detect_backoff = backoff;
        self
    }

    /// Set the receipt polling interval
    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    /// Set the pending payment expiry
    pub fn with_payment_expiry(mut self, expiry: Duration) -> Self {
        self.payment_expiry = expiry;
        self
    }

    /// Set how long expired payments keep being rechecked
    pub fn with_expired_recheck_window(mut self, window: Duration) -> Self {
        self.expired_recheck_window = window;
        self
    }

    /// Set the RPC request timeout
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Use Firestore as the remote store
    pub fn with_firestore(mut self, firestore: FirestoreConfig) -> Self {
        self.firestore = Some(firestore);
        self
    }

    /// Set the gateway listen address
    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64, _>(&lookup, "CONTRACT_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "PAYMENT_TIMEOUT_SECS")? {
            config.payment_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "TOKEN_DECIMALS_TIMEOUT_MS")? {
            config.token_decimals_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, "CHAIN_DETECT_ATTEMPTS")? {
            config.chain_detect_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "CHAIN_DETECT_BACKOFF_MS")? {
            config.chain_detect_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "RECEIPT_POLL_INTERVAL_MS")? {
            config.receipt_poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "PAYMENT_EXPIRY_SECS")? {
            config.payment_expiry = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "EXPIRED_RECHECK_WINDOW_SECS")? {
            config.expired_recheck_window = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "RPC_TIMEOUT_SECS")? {
            config.rpc_timeout = Duration::from_secs(secs);
        }
        if let Some(address) = lookup("BIND_ADDRESS") {
            config.bind_address = address;
        }

        if let Some(project) = lookup("FIRESTORE_PROJECT_ID").filter(|p| !p.is_empty()) {
            let mut firestore = FirestoreConfig::new(project).with_timeout(config.rpc_timeout);
            if let Some(key) = lookup("FIRESTORE_API_KEY") {
                firestore = firestore.with_api_key(key);
            }
            if let Some(base_url) = lookup("FIRESTORE_BASE_URL") {
                firestore = firestore.with_base_url(base_url);
            }
            config.firestore = Some(firestore);
        }

        Ok(config)
    }

    /// Reject zero durations, malformed URLs and unparsable listen addresses
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("cache_ttl", self.cache_ttl),
            ("payment_timeout", self.payment_timeout),
            ("token_decimals_timeout", self.token_decimals_timeout),
            ("receipt_poll_interval", self.receipt_poll_interval),
            ("payment_expiry", self.payment_expiry),
            ("rpc_timeout", self.rpc_timeout),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(PaymentError::config(format!("{} must be greater than zero", name)));
        }
        if self.chain_detect_attempts == 0 {
            return Err(PaymentError::config("chain_detect_attempts must be at least 1"));
        }
        if SocketAddr::from_str(&self.bind_address).is_err() {
            return Err(PaymentError::config(format!(
                "Invalid bind address: {}",
                self.bind_address
            )));
        }
        if let Some(firestore) = &self.firestore {
            firestore.validate()?;
        }
        Ok(())
    }

    /// Session manager settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            detect_attempts: self.chain_detect_attempts,
            detect_backoff: self.chain_detect_backoff,
        }
    }

    /// Confirmation settings for payment transactions
    pub fn confirm_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy {
            poll_interval: self.receipt_poll_interval,
            timeout: self.payment_timeout,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PaymentError::config(format!("Invalid value for {}: {}", key, raw))),
        None => Ok(None),
    }
}
