// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use std::str::FromStr;

use engyne_core::Channel;

use crate::diagnostic::ConfigError;
use crate::model::EngyneConfig;

/// Validate semantic constraints, collecting every error (not fail-fast).
pub fn validate_config(config: &EngyneConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.paths.slots_root.trim().is_empty() {
        fail("paths.slots_root must not be empty".to_string());
    }
    if config.paths.runtime_root.trim().is_empty() {
        fail("paths.runtime_root must not be empty".to_string());
    }

    let host = config.gateway.host.trim();
    let host_ok = host.parse::<std::net::IpAddr>().is_ok()
        || (!host.is_empty()
            && host
                .chars()
                .all(|c| c.is_alphanumeric() || c == '.' || c == '-'));
    if !host_ok {
        fail(format!(
            "gateway.host `{host}` is not a valid IP address or hostname"
        ));
    }
    if config.gateway.port == 0 {
        fail("gateway.port must be non-zero".to_string());
    }

    let sup = &config.supervisor;
    if sup.tick_interval_secs < 1 {
        fail("supervisor.tick_interval_secs must be at least 1".to_string());
    }
    if sup.heartbeat_interval_secs < 1 {
        fail("supervisor.heartbeat_interval_secs must be at least 1".to_string());
    }
    if sup.backoff_max_secs < sup.backoff_initial_secs {
        fail(format!(
            "supervisor.backoff_max_secs ({}) must be >= backoff_initial_secs ({})",
            sup.backoff_max_secs, sup.backoff_initial_secs
        ));
    }
    if !(sup.backoff_multiplier >= 1.0) {
        fail(format!(
            "supervisor.backoff_multiplier must be at least 1.0, got {}",
            sup.backoff_multiplier
        ));
    }
    if let Some(command) = &sup.worker_command
        && command.trim().is_empty()
    {
        fail("supervisor.worker_command must not be empty when set".to_string());
    }

    let disp = &config.dispatcher;
    if disp.poll_interval_secs < 1 {
        fail("dispatcher.poll_interval_secs must be at least 1".to_string());
    }
    if disp.batch_size == 0 {
        fail("dispatcher.batch_size must be at least 1".to_string());
    }
    if disp.retry_max_secs < disp.retry_initial_secs {
        fail(format!(
            "dispatcher.retry_max_secs ({}) must be >= retry_initial_secs ({})",
            disp.retry_max_secs, disp.retry_initial_secs
        ));
    }
    for (name, endpoint) in &disp.channels {
        if Channel::from_str(name).is_err() {
            fail(format!("dispatcher.channels.{name} is not a known channel"));
        }
        if let Some(url) = &endpoint.webhook_url
            && !is_http_url(url)
        {
            fail(format!(
                "dispatcher.channels.{name}.webhook_url must be an http(s) URL, got `{url}`"
            ));
        }
    }

    if config.remote_login.ttl_secs < 60 {
        fail(format!(
            "remote_login.ttl_secs must be at least 60, got {}",
            config.remote_login.ttl_secs
        ));
    }
    if !is_http_url(&config.remote_login.public_base_url) {
        fail(format!(
            "remote_login.public_base_url must be an http(s) URL, got `{}`",
            config.remote_login.public_base_url
        ));
    }

    if let Some(url) = &config.alerts.slack_webhook_url
        && !is_http_url(url)
    {
        fail(format!(
            "alerts.slack_webhook_url must be an http(s) URL, got `{url}`"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
