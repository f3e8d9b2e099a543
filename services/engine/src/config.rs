use std::time::Duration;

use anyhow::{bail, Result};

use crate::billing::BillingConfig;
use crate::cache::CacheConfig;
use crate::cost::Markup;
use crate::store::DbConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub dev_mode: bool,
    pub production: bool,
    pub markup: Markup,
    pub identity_cache: CacheConfig,
    pub package_cache: CacheConfig,
    pub provision_timeout: Duration,
    pub reconcile_interval: Duration,
    pub availability_interval: Duration,
    /// `None` runs on the in-memory store (dev mode only).
    pub database: Option<DbConfig>,
    /// `None` uses the in-process billing provider (dev mode only).
    pub billing: Option<BillingConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };
        let secs = |key: &str, default: u64| {
            Duration::from_secs(
                lookup(key)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default),
            )
        };
        let count = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        let log_level = lookup("HOSTPOOL_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let dev_mode = flag("HOSTPOOL_DEV");
        let production = flag("HOSTPOOL_PRODUCTION");

        if dev_mode && production {
            bail!("HOSTPOOL_DEV and HOSTPOOL_PRODUCTION are mutually exclusive");
        }

        let markup = Markup::parse(
            lookup("HOSTPOOL_MARKUP_RATE")
                .or_else(|| lookup("SERVICES_MARKUP_RATE"))
                .as_deref(),
        );

        let identity_cache = CacheConfig::new(
            count("HOSTPOOL_IDENTITY_CACHE_CAPACITY", 500),
            secs("HOSTPOOL_IDENTITY_CACHE_TTL_SECS", 900),
        );
        let package_cache = CacheConfig::new(
            count("HOSTPOOL_PACKAGE_CACHE_CAPACITY", 100),
            secs("HOSTPOOL_PACKAGE_CACHE_TTL_SECS", 300),
        );

        let database = DbConfig::from_lookup(&lookup);
        if database.is_none() && !dev_mode {
            bail!("DATABASE_URL must be set unless HOSTPOOL_DEV is enabled");
        }

        let billing = if lookup("HOSTPOOL_BILLING_API_KEY").is_none() && dev_mode {
            None
        } else {
            Some(BillingConfig::from_lookup(&lookup, production)?)
        };

        Ok(Self {
            log_level,
            dev_mode,
            production,
            markup,
            identity_cache,
            package_cache,
            provision_timeout: secs("HOSTPOOL_PROVISION_TIMEOUT_SECS", 30),
            reconcile_interval: secs("HOSTPOOL_RECONCILE_INTERVAL_SECS", 30),
            availability_interval: secs("HOSTPOOL_AVAILABILITY_INTERVAL_SECS", 60),
            database,
            billing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_dev_defaults() {
        let config = load(&[("HOSTPOOL_DEV", "true")]).unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.markup, Markup::NONE);
        assert_eq!(config.identity_cache.capacity, 500);
        assert_eq!(config.identity_cache.ttl, Duration::from_secs(900));
        assert_eq!(config.package_cache.capacity, 100);
        assert_eq!(config.provision_timeout, Duration::from_secs(30));
        assert!(config.database.is_none());
        assert!(config.billing.is_none());
    }

    #[test]
    fn test_markup_fallback_variable() {
        let config = load(&[("HOSTPOOL_DEV", "1"), ("SERVICES_MARKUP_RATE", "1.5")]).unwrap();
        assert_eq!(config.markup.rate(), 1.5);

        let config = load(&[
            ("HOSTPOOL_DEV", "1"),
            ("HOSTPOOL_MARKUP_RATE", "2"),
            ("SERVICES_MARKUP_RATE", "1.5"),
        ])
        .unwrap();
        assert_eq!(config.markup.rate(), 2.0);
    }

    #[test]
    fn test_database_required_outside_dev() {
        let err = load(&[("HOSTPOOL_BILLING_API_KEY", "sk_test_1")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_live_key_needs_production() {
        let base = [
            ("DATABASE_URL", "postgres://localhost/hostpool"),
            ("HOSTPOOL_BILLING_API_KEY", "sk_live_1"),
        ];
        assert!(load(&base).is_err());

        let mut production = base.to_vec();
        production.push(("HOSTPOOL_PRODUCTION", "true"));
        let config = load(&production).unwrap();
        assert!(config.production);
        assert!(config.billing.is_some());
        assert!(config.database.is_some());
    }

    #[test]
    fn test_dev_and_production_conflict() {
        assert!(load(&[("HOSTPOOL_DEV", "1"), ("HOSTPOOL_PRODUCTION", "1")]).is_err());
    }
}
