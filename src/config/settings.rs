//! Engine settings and configuration
//!
//! This module provides configuration management for the allocator,
//! loading settings from environment variables with sensible defaults.

use crate::services::strategy::AllocationStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Thresholds for capacity alerting
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertThresholds {
    /// Critical when available-for-assign drops to this or below
    pub critical_available: u32,
    /// Critical when utilization reaches this fraction or above
    pub critical_utilization: f64,
    /// Warning when available-for-assign drops to this or below
    pub warning_available: u32,
    /// Warning when utilization reaches this fraction or above
    pub warning_utilization: f64,
    /// Warning when the banned fraction exceeds this
    pub warning_ban_rate: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            critical_available: 1,
            critical_utilization: 0.95,
            warning_available: 3,
            warning_utilization: 0.80,
            warning_ban_rate: 0.30,
        }
    }
}

/// Main engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Consecutive failures before a credential is banned
    pub ban_threshold: u32,

    /// Consecutive successes before a banned credential recovers
    pub recovery_threshold: u32,

    /// Bounded retries when a conditional reserve loses a race
    pub max_reserve_attempts: u32,

    /// TTL for the cached rule list; rule changes take effect within this
    pub rule_cache_ttl_secs: u64,

    /// Trailing window for exhaustion forecasting
    pub forecast_window_days: u32,

    /// Strategy used when a request does not specify one
    pub default_strategy: AllocationStrategy,

    /// Capacity alert thresholds
    pub alert_thresholds: AlertThresholds,

    /// Log level for the tracing subscriber
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ban_threshold: 3,
            recovery_threshold: 2,
            max_reserve_attempts: 3,
            rule_cache_ttl_secs: 5,
            forecast_window_days: 7,
            default_strategy: AllocationStrategy::Balanced,
            alert_thresholds: AlertThresholds::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let settings = Self {
            ban_threshold: env_or_default("CREDPOOL_BAN_THRESHOLD", "3")
                .parse()
                .context("Invalid CREDPOOL_BAN_THRESHOLD value")?,
            recovery_threshold: env_or_default("CREDPOOL_RECOVERY_THRESHOLD", "2")
                .parse()
                .context("Invalid CREDPOOL_RECOVERY_THRESHOLD value")?,
            max_reserve_attempts: env_or_default("CREDPOOL_MAX_RESERVE_ATTEMPTS", "3")
                .parse()
                .context("Invalid CREDPOOL_MAX_RESERVE_ATTEMPTS value")?,
            rule_cache_ttl_secs: env_or_default("CREDPOOL_RULE_CACHE_TTL_SECS", "5")
                .parse()
                .context("Invalid CREDPOOL_RULE_CACHE_TTL_SECS value")?,
            forecast_window_days: env_or_default("CREDPOOL_FORECAST_WINDOW_DAYS", "7")
                .parse()
                .context("Invalid CREDPOOL_FORECAST_WINDOW_DAYS value")?,
            default_strategy: env_or_default("CREDPOOL_DEFAULT_STRATEGY", "balanced")
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid CREDPOOL_DEFAULT_STRATEGY value")?,
            alert_thresholds: AlertThresholds {
                critical_available: env_or_default("CREDPOOL_ALERT_CRITICAL_AVAILABLE", "1")
                    .parse()
                    .unwrap_or(1),
                critical_utilization: env_or_default("CREDPOOL_ALERT_CRITICAL_UTILIZATION", "0.95")
                    .parse()
                    .unwrap_or(0.95),
                warning_available: env_or_default("CREDPOOL_ALERT_WARNING_AVAILABLE", "3")
                    .parse()
                    .unwrap_or(3),
                warning_utilization: env_or_default("CREDPOOL_ALERT_WARNING_UTILIZATION", "0.80")
                    .parse()
                    .unwrap_or(0.80),
                warning_ban_rate: env_or_default("CREDPOOL_ALERT_WARNING_BAN_RATE", "0.30")
                    .parse()
                    .unwrap_or(0.30),
            },
            log_level: env_or_default("CREDPOOL_LOG_LEVEL", "info"),
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.ban_threshold == 0 {
            anyhow::bail!("ban_threshold must be > 0");
        }
        if self.recovery_threshold == 0 {
            anyhow::bail!("recovery_threshold must be > 0");
        }
        if self.max_reserve_attempts == 0 {
            anyhow::bail!("max_reserve_attempts must be > 0");
        }
        if self.forecast_window_days == 0 {
            anyhow::bail!("forecast_window_days must be > 0");
        }

        let t = &self.alert_thresholds;
        for (name, value) in [
            ("critical_utilization", t.critical_utilization),
            ("warning_utilization", t.warning_utilization),
            ("warning_ban_rate", t.warning_ban_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        if t.warning_utilization > t.critical_utilization {
            anyhow::bail!(
                "warning_utilization ({}) must not exceed critical_utilization ({})",
                t.warning_utilization,
                t.critical_utilization
            );
        }

        Ok(())
    }

    pub fn with_ban_threshold(mut self, threshold: u32) -> Self {
        self.ban_threshold = threshold;
        self
    }

    pub fn with_recovery_threshold(mut self, threshold: u32) -> Self {
        self.recovery_threshold = threshold;
        self
    }

    pub fn with_max_reserve_attempts(mut self, attempts: u32) -> Self {
        self.max_reserve_attempts = attempts;
        self
    }

    pub fn with_rule_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.rule_cache_ttl_secs = secs;
        self
    }

    pub fn with_default_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.ban_threshold, 3);
        assert_eq!(settings.recovery_threshold, 2);
        assert_eq!(settings.max_reserve_attempts, 3);
        assert_eq!(settings.default_strategy, AllocationStrategy::Balanced);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_default_alert_thresholds() {
        let t = AlertThresholds::default();
        assert_eq!(t.critical_available, 1);
        assert_eq!(t.critical_utilization, 0.95);
        assert_eq!(t.warning_available, 3);
        assert_eq!(t.warning_utilization, 0.80);
        assert_eq!(t.warning_ban_rate, 0.30);
    }

    #[test]
    fn test_validate_rejects_zero_thresholds() {
        let settings = Settings::default().with_ban_threshold(0);
        assert!(settings.validate().is_err());

        let settings = Settings::default().with_max_reserve_attempts(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_utilization() {
        let mut settings = Settings::default();
        settings.alert_thresholds.warning_utilization = 0.99;
        assert!(settings.validate().is_err());
    }
}
