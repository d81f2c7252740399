// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential restart backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};
use engyne_config::model::SupervisorConfig;
use engyne_storage::ControlState;

/// Consecutive failures after which a boot loop is alerted.
pub const BOOT_LOOP_ALERT_AFTER: u32 = 3;

#[derive(Debug, Clone)]
pub struct RestartBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    window: Duration,
    min_healthy_uptime: Duration,
}

impl RestartBackoff {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            initial: Duration::from_secs(config.backoff_initial_secs),
            max: Duration::from_secs(config.backoff_max_secs),
            multiplier: config.backoff_multiplier,
            window: Duration::from_secs(config.backoff_window_secs),
            min_healthy_uptime: Duration::from_secs(config.min_healthy_uptime_secs),
        }
    }

    /// Delay before the next launch after `attempt` consecutive failures (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }

    /// Whether a run that lasted `uptime` counts as healthy.
    pub fn is_healthy_run(&self, uptime: Duration) -> bool {
        uptime >= self.min_healthy_uptime
    }

    /// Record that the current run (or launch attempt) ended badly at `now`.
    ///
    /// A run that reached healthy uptime, or a failure long after the last
    /// backoff expired, starts a fresh count. The first failure of a count
    /// restarts immediately. Returns the delay applied.
    pub fn record_failure(
        &self,
        control: &mut ControlState,
        now: DateTime<Utc>,
        uptime: Option<Duration>,
    ) -> Duration {
        let healthy = uptime.is_some_and(|u| self.is_healthy_run(u));
        let window_expired = control.next_start_after.is_some_and(|after| {
            (now - after).to_std().is_ok_and(|since| since > self.window)
        });
        if healthy || window_expired {
            control.consecutive_failures = 0;
        }
        control.consecutive_failures = control.consecutive_failures.saturating_add(1);

        let delay = self.delay_for_attempt(control.consecutive_failures - 1);
        let step = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        control.next_start_after = Some(now.checked_add_signed(step).unwrap_or(now));
        delay
    }

    /// Forget failure history, e.g. after an operator start.
    pub fn reset(control: &mut ControlState) {
        control.consecutive_failures = 0;
        control.next_start_after = None;
    }

    /// Whether backoff still forbids a launch at `now`.
    pub fn is_waiting(control: &ControlState, now: DateTime<Utc>) -> bool {
        control.next_start_after.is_some_and(|after| now < after)
    }
}
