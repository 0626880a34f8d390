//! Configuration for the registration engine.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::pricing::PricingPolicy;
use crate::types::Money;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minutes a pending registration may wait for payment before its slot
    /// is reclaimed.
    pub payment_deadline_minutes: i64,
    /// Minimum hours before the event start at which a transfer may still
    /// be created.
    pub transfer_lead_hours: i64,
    /// Smallest amount (in cents) the payment processor accepts; final
    /// prices below it are exempt and auto-confirm.
    pub minimum_payable_cents: u64,
    /// Interval of the periodic expiry sweep, in seconds.
    pub sweep_interval_secs: u64,
    /// Graceful shutdown timeout, in seconds.
    pub shutdown_timeout_secs: u64,
    /// Log filter (trace, debug, info, warn, error).
    pub log_level: String,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            payment_deadline_minutes: env::var("TURNSTILE_PAYMENT_DEADLINE_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
            transfer_lead_hours: env::var("TURNSTILE_TRANSFER_LEAD_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(24),
            minimum_payable_cents: env::var("TURNSTILE_MINIMUM_PAYABLE_CENTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            sweep_interval_secs: env::var("TURNSTILE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            shutdown_timeout_secs: env::var("TURNSTILE_SHUTDOWN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// The derived policy values injected into every aggregate environment.
    #[must_use]
    pub fn policy(&self) -> EnginePolicy {
        EnginePolicy {
            payment_deadline: Duration::minutes(self.payment_deadline_minutes),
            transfer_lead: Duration::hours(self.transfer_lead_hours),
            pricing: PricingPolicy::new(Money::from_cents(self.minimum_payable_cents)),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            payment_deadline_minutes: 15,
            transfer_lead_hours: 24,
            minimum_payable_cents: 100,
            sweep_interval_secs: 60,
            shutdown_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

/// Policy values derived from [`EngineConfig`], shared by every per-event
/// environment.
#[derive(Debug, Clone, Copy)]
pub struct EnginePolicy {
    /// How long a pending registration may wait for payment.
    pub payment_deadline: Duration,
    /// Minimum time before the event start required to create a transfer.
    pub transfer_lead: Duration,
    /// Pricing policy.
    pub pricing: PricingPolicy,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        EngineConfig::default().policy()
    }
}
