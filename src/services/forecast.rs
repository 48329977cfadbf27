//! Capacity forecaster
//!
//! Read-only projections over store state and allocation history: graded
//! capacity alerts and an exhaustion-date estimate from the trailing
//! allocation rate.

use crate::audit::AuditLog;
use crate::config::AlertThresholds;
use crate::error::AllocError;
use crate::models::CredentialStatus;
use crate::store::CredentialStore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Alert Types
// ============================================================================

/// Graded severity of a capacity alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Normal,
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One capacity alert with a human-readable suggestion
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub suggestion: String,
}

/// Output of `check_alerts`
#[derive(Debug, Clone, Serialize)]
pub struct AlertReport {
    /// Highest severity among the alerts (normal when none fired)
    pub level: AlertLevel,
    /// Available credentials with spare capacity
    pub available_for_assign: u32,
    /// Sum of caps over Available credentials
    pub total_capacity: u64,
    /// Sum of current counts over Available credentials
    pub used_capacity: u64,
    /// used/total over Available credentials; 0 when the pool is empty
    pub utilization: f64,
    /// banned / all credentials
    pub ban_rate: f64,
    pub alerts: Vec<Alert>,
}

/// Output of `forecast_exhaustion`
#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub avg_daily_allocations: f64,
    /// Spare capacity over Available credentials
    pub remaining_capacity: u64,
    /// None when the trailing allocation rate is zero
    pub days_until_exhausted: Option<f64>,
}

// ============================================================================
// Capacity Forecaster
// ============================================================================

/// Default trailing window for exhaustion forecasting, in days
const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Computes pool utilization, alerts, and exhaustion projections
pub struct CapacityForecaster {
    store: Arc<dyn CredentialStore>,
    audit: Arc<dyn AuditLog>,
    window_days: u32,
}

impl CapacityForecaster {
    pub fn new(store: Arc<dyn CredentialStore>, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            store,
            audit,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    /// Override the trailing window used by [`forecast`](Self::forecast),
    /// typically from `Settings::forecast_window_days`.
    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    /// Exhaustion projection over the configured trailing window.
    pub async fn forecast(&self) -> Result<Forecast, AllocError> {
        self.forecast_exhaustion(self.window_days).await
    }

    /// Grade the pool against the supplied thresholds.
    pub async fn check_alerts(
        &self,
        thresholds: &AlertThresholds,
    ) -> Result<AlertReport, AllocError> {
        let credentials = self.store.list_credentials().await?;

        let total = credentials.len() as u64;
        let banned = credentials
            .iter()
            .filter(|c| c.status == CredentialStatus::Banned)
            .count() as u64;
        let available: Vec<_> = credentials
            .iter()
            .filter(|c| c.status == CredentialStatus::Available)
            .collect();
        let available_for_assign = available.iter().filter(|c| c.has_capacity()).count() as u32;
        let total_capacity: u64 = available.iter().map(|c| c.max_concurrent as u64).sum();
        let used_capacity: u64 = available.iter().map(|c| c.current_count as u64).sum();

        let utilization = if total_capacity == 0 {
            0.0
        } else {
            used_capacity as f64 / total_capacity as f64
        };
        let ban_rate = if total == 0 {
            0.0
        } else {
            banned as f64 / total as f64
        };

        let mut alerts = Vec::new();

        if available_for_assign <= thresholds.critical_available {
            alerts.push(Alert {
                level: AlertLevel::Critical,
                message: format!(
                    "only {} credential(s) available for assignment",
                    available_for_assign
                ),
                suggestion: "add credentials or release idle allocations immediately".to_string(),
            });
        } else if available_for_assign <= thresholds.warning_available {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                message: format!(
                    "{} credential(s) available for assignment",
                    available_for_assign
                ),
                suggestion: "plan to add credentials to the pool".to_string(),
            });
        }

        if utilization >= thresholds.critical_utilization {
            alerts.push(Alert {
                level: AlertLevel::Critical,
                message: format!("pool utilization at {:.0}%", utilization * 100.0),
                suggestion: "raise concurrency caps or add credentials now".to_string(),
            });
        } else if utilization >= thresholds.warning_utilization {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                message: format!("pool utilization at {:.0}%", utilization * 100.0),
                suggestion: "capacity is tightening; review upcoming demand".to_string(),
            });
        }

        if ban_rate > thresholds.warning_ban_rate {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                message: format!("{:.0}% of credentials are banned", ban_rate * 100.0),
                suggestion: "investigate upstream failures and reset recovered credentials"
                    .to_string(),
            });
        }

        let level = alerts
            .iter()
            .map(|a| a.level)
            .max()
            .unwrap_or(AlertLevel::Normal);

        if level > AlertLevel::Normal {
            tracing::warn!(
                level = %level,
                utilization = utilization,
                available_for_assign = available_for_assign,
                ban_rate = ban_rate,
                "Capacity alert"
            );
        }

        Ok(AlertReport {
            level,
            available_for_assign,
            total_capacity,
            used_capacity,
            utilization,
            ban_rate,
            alerts,
        })
    }

    /// Project when the pool runs out, from the trailing daily allocate rate.
    pub async fn forecast_exhaustion(&self, days: u32) -> Result<Forecast, AllocError> {
        if days == 0 {
            return Err(AllocError::Validation(
                "forecast window must be at least 1 day".to_string(),
            ));
        }

        let daily = self.audit.daily_allocate_counts(days).await?;
        let total_allocations: u64 = daily.iter().map(|(_, n)| n).sum();
        let avg_daily_allocations = total_allocations as f64 / days as f64;

        let remaining_capacity: u64 = self
            .store
            .list_credentials()
            .await?
            .iter()
            .filter(|c| c.status == CredentialStatus::Available)
            .map(|c| c.remaining() as u64)
            .sum();

        let days_until_exhausted = if avg_daily_allocations > 0.0 {
            Some(remaining_capacity as f64 / avg_daily_allocations)
        } else {
            None
        };

        Ok(Forecast {
            avg_daily_allocations,
            remaining_capacity,
            days_until_exhausted,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
