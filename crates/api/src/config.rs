//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Upper bounds keeping derived durations and timestamps representable.
const MAX_CART_IDLE_TTL_HOURS: u64 = 24 * 365;
const MAX_CART_RETENTION_DAYS: u32 = 365 * 100;
const MAX_CART_SWEEP_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;
const MAX_SESSION_TTL_DAYS: i64 = 365 * 10;

/// Which cart backing serves cart requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartBackend {
    /// Rows in the primary store, removed by the stale cart sweeper.
    Durable,
    /// In-process entries that expire after an idle period.
    Expiring,
}

impl FromStr for CartBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "durable" => Ok(CartBackend::Durable),
            "expiring" => Ok(CartBackend::Expiring),
            other => Err(format!("unknown cart backend: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size
/// - `CART_BACKEND`: `durable` or `expiring`
/// - `CART_IDLE_TTL_HOURS`: sliding expiry of the expiring backing
/// - `CART_RETENTION_DAYS`: age after which the sweeper deletes carts
/// - `CART_SWEEP_INTERVAL_SECS`: sweeper period, `0` disables it
/// - `SESSION_TTL_DAYS`: inactivity lifetime of the anonymous cart session
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub cart_backend: CartBackend,
    pub cart_idle_ttl_hours: u64,
    pub cart_retention_days: u32,
    pub cart_sweep_interval_secs: u64,
    pub session_ttl_days: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            cart_backend: parsed(&lookup, "CART_BACKEND").unwrap_or(defaults.cart_backend),
            cart_idle_ttl_hours: parsed(&lookup, "CART_IDLE_TTL_HOURS")
                .unwrap_or(defaults.cart_idle_ttl_hours)
                .clamp(1, MAX_CART_IDLE_TTL_HOURS),
            cart_retention_days: parsed(&lookup, "CART_RETENTION_DAYS")
                .unwrap_or(defaults.cart_retention_days)
                .min(MAX_CART_RETENTION_DAYS),
            cart_sweep_interval_secs: parsed(&lookup, "CART_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.cart_sweep_interval_secs)
                .min(MAX_CART_SWEEP_INTERVAL_SECS),
            session_ttl_days: parsed(&lookup, "SESSION_TTL_DAYS")
                .unwrap_or(defaults.session_ttl_days)
                .clamp(1, MAX_SESSION_TTL_DAYS),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cart_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.cart_idle_ttl_hours.saturating_mul(60 * 60))
    }

    /// Returns the sweeper period, or `None` when sweeping is disabled.
    pub fn cart_sweep_interval(&self) -> Option<Duration> {
        (self.cart_sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.cart_sweep_interval_secs))
    }
}

/// Reads `key` and parses it, treating malformed values as unset.
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            database_max_connections: 10,
            cart_backend: CartBackend::Durable,
            cart_idle_ttl_hours: 24,
            cart_retention_days: 7,
            cart_sweep_interval_secs: 24 * 60 * 60,
            session_ttl_days: 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.cart_backend, CartBackend::Durable);
        assert_eq!(config.cart_retention_days, 7);
        assert_eq!(config.session_ttl_days, 7);
        assert_eq!(config.cart_idle_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("CART_BACKEND", "expiring"),
            ("CART_SWEEP_INTERVAL_SECS", "0"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert!(config.log_json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/shop")
        );
        assert_eq!(config.cart_backend, CartBackend::Expiring);
        assert_eq!(config.cart_sweep_interval(), None);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("CART_BACKEND", "redis"),
            ("DATABASE_URL", " "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.cart_backend, CartBackend::Durable);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_each_field_parses_its_own_type() {
        let config = from_pairs(&[
            ("PORT", "9000"),
            ("DATABASE_MAX_CONNECTIONS", "25"),
            ("CART_IDLE_TTL_HOURS", "48"),
            ("CART_RETENTION_DAYS", "30"),
            ("CART_SWEEP_INTERVAL_SECS", "600"),
            ("SESSION_TTL_DAYS", "14"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_max_connections, 25);
        assert_eq!(config.cart_idle_ttl(), Duration::from_secs(48 * 3600));
        assert_eq!(config.cart_retention_days, 30);
        assert_eq!(config.cart_sweep_interval(), Some(Duration::from_secs(600)));
        assert_eq!(config.session_ttl_days, 14);
    }

    #[test]
    fn test_out_of_range_lifetimes_are_clamped() {
        let config = from_pairs(&[
            ("CART_IDLE_TTL_HOURS", "18446744073709551615"),
            ("CART_RETENTION_DAYS", "4294967295"),
            ("CART_SWEEP_INTERVAL_SECS", "18446744073709551615"),
            ("SESSION_TTL_DAYS", "9223372036854775807"),
        ]);
        assert_eq!(config.cart_idle_ttl_hours, MAX_CART_IDLE_TTL_HOURS);
        assert_eq!(config.cart_retention_days, MAX_CART_RETENTION_DAYS);
        assert_eq!(
            config.cart_sweep_interval(),
            Some(Duration::from_secs(MAX_CART_SWEEP_INTERVAL_SECS))
        );
        assert_eq!(config.session_ttl_days, MAX_SESSION_TTL_DAYS);

        let config = from_pairs(&[("CART_IDLE_TTL_HOURS", "0"), ("SESSION_TTL_DAYS", "-3")]);
        assert_eq!(config.cart_idle_ttl_hours, 1);
        assert_eq!(config.session_ttl_days, 1);
    }
}
