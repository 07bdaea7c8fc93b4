use chrono::{FixedOffset, Offset, Utc};
use rust_decimal::Decimal;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

use crate::search::DEFAULT_THRESHOLD;
use crate::tiers::{default_rules, TierRule};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}")]
    InvalidVar { name: &'static str, value: String },

    #[error("tier rules {path}: {reason}")]
    TierRules { path: String, reason: String },
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub shop: ShopConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidVar { name: "APP_HOST", value: self.host.clone() })
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Business settings for discounts, points and search.
#[derive(Debug, Clone)]
pub struct ShopConfig {
    /// Offset used for calendar usage windows. Vietnam is UTC+7.
    pub utc_offset: FixedOffset,
    pub points_conversion_rate: Decimal,
    pub search_threshold: f64,
    pub tier_rules_path: Option<PathBuf>,
    /// Award points when a debt is paid off later, not only at sale time.
    pub award_points_on_repayment: bool,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            utc_offset: FixedOffset::east_opt(7 * 3600).unwrap_or(Utc.fix()),
            points_conversion_rate: crate::points::default_conversion_rate(),
            search_threshold: DEFAULT_THRESHOLD,
            tier_rules_path: None,
            award_points_on_repayment: false,
        }
    }
}

impl ShopConfig {
    /// Built-in table unless `tier_rules_path` points at a JSON array of rules.
    pub fn tier_rules(&self) -> Result<Vec<TierRule>, ConfigError> {
        let Some(path) = &self.tier_rules_path else { return Ok(default_rules()) };
        let shown = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::TierRules { path: shown.clone(), reason: e.to_string() })?;
        let rules: Vec<TierRule> = serde_json::from_str(&raw).map_err(|e| ConfigError::TierRules { path: shown.clone(), reason: e.to_string() })?;
        for rule in &rules {
            rule.validate().map_err(|reason| ConfigError::TierRules { path: shown.clone(), reason })?;
        }
        Ok(rules)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `load` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", get("PORT"), 8083u16)?;
        let log_level = get("APP_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let defaults = ShopConfig::default();
        let offset_hours = parse_or("SHOP_UTC_OFFSET_HOURS", get("SHOP_UTC_OFFSET_HOURS"), 7i32)?;
        let utc_offset = FixedOffset::east_opt(offset_hours * 3600)
            .ok_or(ConfigError::InvalidVar { name: "SHOP_UTC_OFFSET_HOURS", value: offset_hours.to_string() })?;
        let points_conversion_rate = parse_or("POINTS_CONVERSION_RATE", get("POINTS_CONVERSION_RATE"), defaults.points_conversion_rate)?;
        if points_conversion_rate < Decimal::ZERO {
            return Err(ConfigError::InvalidVar { name: "POINTS_CONVERSION_RATE", value: points_conversion_rate.to_string() });
        }
        let search_threshold = parse_or("SEARCH_THRESHOLD", get("SEARCH_THRESHOLD"), defaults.search_threshold)?;
        if !(0.0..=1.0).contains(&search_threshold) {
            return Err(ConfigError::InvalidVar { name: "SEARCH_THRESHOLD", value: search_threshold.to_string() });
        }
        let award_points_on_repayment = match get("AWARD_POINTS_ON_REPAYMENT").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("0" | "false" | "no" | "off") => false,
            Some("1" | "true" | "yes" | "on") => true,
            Some(other) => return Err(ConfigError::InvalidVar { name: "AWARD_POINTS_ON_REPAYMENT", value: other.to_string() }),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            shop: ShopConfig {
                utc_offset,
                points_conversion_rate,
                search_threshold,
                tier_rules_path: get("TIER_RULES_PATH").map(PathBuf::from),
                award_points_on_repayment,
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidVar { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.server.port, 8083);
        assert_eq!(cfg.shop.utc_offset.local_minus_utc(), 7 * 3600);
        assert_eq!(cfg.shop.points_conversion_rate, Decimal::new(1, 3));
        assert!(cfg.database_url.is_none());
        assert!(!cfg.shop.award_points_on_repayment);
        assert_eq!(cfg.shop.tier_rules().unwrap().len(), 3);
    }

    #[test]
    fn test_overrides() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("PORT", "9000"), ("SHOP_UTC_OFFSET_HOURS", "0"), ("POINTS_CONVERSION_RATE", "0.002"),
            ("SEARCH_THRESHOLD", "0.3"), ("AWARD_POINTS_ON_REPAYMENT", "true"), ("DATABASE_URL", "postgres://localhost/shop"),
        ])).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.shop.utc_offset.local_minus_utc(), 0);
        assert_eq!(cfg.shop.points_conversion_rate, Decimal::new(2, 3));
        assert_eq!(cfg.shop.search_threshold, 0.3);
        assert!(cfg.shop.award_points_on_repayment);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/shop"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(AppConfig::from_lookup(lookup(&[("PORT", "abc")])), Err(ConfigError::InvalidVar { name: "PORT", .. })));
        assert!(matches!(AppConfig::from_lookup(lookup(&[("SEARCH_THRESHOLD", "1.5")])), Err(ConfigError::InvalidVar { name: "SEARCH_THRESHOLD", .. })));
        assert!(matches!(AppConfig::from_lookup(lookup(&[("SHOP_UTC_OFFSET_HOURS", "30")])), Err(ConfigError::InvalidVar { .. })));
        assert!(matches!(AppConfig::from_lookup(lookup(&[("AWARD_POINTS_ON_REPAYMENT", "maybe")])), Err(ConfigError::InvalidVar { .. })));
    }

    #[test]
    fn test_missing_rules_file() {
        let shop = ShopConfig { tier_rules_path: Some(PathBuf::from("/nonexistent/tiers.json")), ..ShopConfig::default() };
        assert!(matches!(shop.tier_rules(), Err(ConfigError::TierRules { .. })));
    }
}
