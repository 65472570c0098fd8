//! Engine configuration, populated from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::poll::RetryPolicy;

/// An environment variable held a value that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{var}={value:?} is invalid: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Runtime configuration for the test engine.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `APCONFORM_BIND` | `127.0.0.1:8000` | Listener for simulated actor routes |
/// | `APCONFORM_PUBLIC_BASE` | derived from `APCONFORM_BIND` | Base URL used in simulated actor URIs |
/// | `APCONFORM_POLL_ATTEMPTS` | `10` | Attempts for eventual-consistency polling |
/// | `APCONFORM_POLL_DELAY_MS` | `1000` | Delay between polling attempts |
/// | `APCONFORM_MAX_COLLECTION_ITEMS` | `1000` | Upper bound on identifiers read from one collection |
/// | `APCONFORM_KEY_BITS` | `2048` | RSA modulus size of the shared actor keypair |
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Socket address the simulated actor router binds to.
    pub bind_addr: SocketAddr,

    /// Externally reachable base URL of the router, without trailing slash.
    /// The server under test must be able to reach actors under it.
    pub public_base: String,

    pub retry: RetryPolicy,

    /// Collection traversal stops after this many identifiers.
    pub max_collection_items: usize,

    pub key_bits: usize,
}

impl EngineConfig {
    /// Defaults for a router listening on `bind_addr`.
    pub fn for_listener(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            public_base: format!("http://{bind_addr}"),
            retry: RetryPolicy::default(),
            max_collection_items: 1000,
            key_bits: 2048,
        }
    }

    /// Populate config from environment variables, applying defaults where absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr: SocketAddr = parse_var("APCONFORM_BIND", "127.0.0.1:8000".parse().ok())?;
        let mut config = Self::for_listener(bind_addr);

        if let Ok(base) = std::env::var("APCONFORM_PUBLIC_BASE") {
            config.public_base = base.trim_end_matches('/').to_string();
        }
        config.retry.attempts = parse_var("APCONFORM_POLL_ATTEMPTS", Some(config.retry.attempts))?;
        config.retry.delay = Duration::from_millis(parse_var("APCONFORM_POLL_DELAY_MS", Some(1000))?);
        config.max_collection_items =
            parse_var("APCONFORM_MAX_COLLECTION_ITEMS", Some(config.max_collection_items))?;
        config.key_bits = parse_var("APCONFORM_KEY_BITS", Some(config.key_bits))?;

        Ok(config)
    }
}

fn parse_var<T>(var: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            var,
            value: value.clone(),
            reason: e.to_string(),
        }),
        Err(_) => default.ok_or_else(|| ConfigError {
            var,
            value: String::new(),
            reason: "no default available".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_defaults() {
        let config = EngineConfig::for_listener("127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.public_base, "http://127.0.0.1:9000");
        assert_eq!(config.retry.attempts, 10);
        assert_eq!(config.retry.delay, Duration::from_secs(1));
        assert_eq!(config.max_collection_items, 1000);
    }

    #[test]
    fn parse_var_reports_bad_values() {
        std::env::set_var("APCONFORM_TEST_ONLY_NUMBER", "ten");
        let err = parse_var::<u32>("APCONFORM_TEST_ONLY_NUMBER", Some(1)).unwrap_err();
        assert_eq!(err.var, "APCONFORM_TEST_ONLY_NUMBER");
        assert_eq!(err.value, "ten");
        std::env::remove_var("APCONFORM_TEST_ONLY_NUMBER");
    }

    #[test]
    fn parse_var_falls_back_to_default() {
        let v = parse_var::<u32>("APCONFORM_TEST_ONLY_UNSET", Some(7)).unwrap();
        assert_eq!(v, 7);
    }
}
