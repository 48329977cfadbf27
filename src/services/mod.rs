//! Services module
//!
//! Contains the allocator's business logic: rule evaluation, strategy
//! ordering, allocation orchestration, failover monitoring, and capacity
//! forecasting.

pub mod allocator;
pub mod failover;
pub mod forecast;
pub mod rules;
pub mod strategy;

pub use allocator::{AllocateRequest, AllocationEngine, AllocationOutcome};
pub use failover::{AlertSink, FailoverMonitor, FailoverPolicy, LogAlertSink, ResultOutcome};
pub use forecast::{Alert, AlertLevel, AlertReport, CapacityForecaster, Forecast};
pub use rules::{RuleContext, RuleDecision, RuleEngine, RuleRef};
pub use strategy::AllocationStrategy;
