//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Sensitive values are wrapped in secrecy::SecretString to
//! prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use crate::proxy::{Endpoint, ProxyPolicy, load_proxy_file};
use crate::store::DEFAULT_NAMESPACE;
use crate::verify::SmtpConfig;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    /// Queue store URL; may carry a password and a database index.
    pub redis_url: SecretString,
    /// Key prefix isolating this tool's sets.
    pub namespace: String,
    /// Outbound proxies, env list first, then the proxy file.
    pub proxies: Vec<Endpoint>,
    pub proxy_policy: ProxyPolicy,
    /// Delay before each verification, per worker.
    pub pacing: Duration,
    /// Grace period for workers after Ctrl-C.
    pub shutdown_grace: Duration,
    pub smtp: SmtpConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let redis_url = var("REDIS_URL").ok_or_else(|| {
            Error::Config("required environment variable REDIS_URL is not set".to_string())
        })?;

        let mut proxies = Vec::new();
        if let Some(list) = var("LISTCLEAN_PROXIES") {
            for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                proxies.push(entry.parse()?);
            }
        }
        if let Some(path) = var("LISTCLEAN_PROXY_FILE") {
            proxies.extend(load_proxy_file(&PathBuf::from(path))?);
        }

        let proxy_policy = match var("LISTCLEAN_PROXY_POLICY") {
            Some(policy) => policy.parse()?,
            None => ProxyPolicy::default(),
        };

        let defaults = SmtpConfig::default();
        let smtp = SmtpConfig {
            from_address: var("LISTCLEAN_FROM_ADDRESS").unwrap_or(defaults.from_address),
            helo_name: var("LISTCLEAN_HELO").unwrap_or(defaults.helo_name),
            timeout: millis(var("LISTCLEAN_VERIFY_TIMEOUT_MS"), "LISTCLEAN_VERIFY_TIMEOUT_MS")?
                .unwrap_or(defaults.timeout),
            port: defaults.port,
        };

        Ok(Self {
            redis_url: SecretString::from(redis_url),
            namespace: var("LISTCLEAN_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            proxies,
            proxy_policy,
            pacing: millis(var("LISTCLEAN_PACING_MS"), "LISTCLEAN_PACING_MS")?
                .unwrap_or(Duration::ZERO),
            shutdown_grace: millis(var("LISTCLEAN_SHUTDOWN_GRACE_MS"), "LISTCLEAN_SHUTDOWN_GRACE_MS")?
                .unwrap_or(Duration::from_secs(2)),
            smtp,
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn millis(value: Option<String>, name: &str) -> Result<Option<Duration>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| Error::Config(format!("{name} must be a number of milliseconds, got {v:?}")))
        })
        .transpose()
}
