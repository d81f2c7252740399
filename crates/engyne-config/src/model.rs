// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Node configuration structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key fails
//! at startup instead of silently falling back to a default.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use engyne_core::Channel;
use serde::{Deserialize, Serialize};

/// Top-level Engyne configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngyneConfig {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub remote_login: RemoteLoginConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Node identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            log_level: default_log_level(),
        }
    }
}

fn default_node_id() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Filesystem roots for slot directories and shared runtime state.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default = "default_slots_root")]
    pub slots_root: String,

    #[serde(default = "default_runtime_root")]
    pub runtime_root: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            slots_root: default_slots_root(),
            runtime_root: default_runtime_root(),
        }
    }
}

impl PathsConfig {
    pub fn slots_root(&self) -> PathBuf {
        PathBuf::from(&self.slots_root)
    }

    pub fn runtime_root(&self) -> PathBuf {
        PathBuf::from(&self.runtime_root)
    }
}

fn default_slots_root() -> String {
    "slots".to_string()
}

fn default_runtime_root() -> String {
    "runtime".to_string()
}

/// HTTP API settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Operator bearer token. Without it, operator routes reject every request.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Shared secret workers present on `POST /events/verified`.
    #[serde(default)]
    pub worker_secret: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "worker_secret",
                &self.worker_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
            worker_secret: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8001
}

/// Slot supervisor scheduling, termination, and restart backoff.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Grace period between SIGTERM and kill.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    /// Worker executable. Defaults to the running binary with `worker`.
    #[serde(default)]
    pub worker_command: Option<String>,

    #[serde(default)]
    pub worker_args: Vec<String>,

    /// Heartbeat cadence handed to workers.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// A run that lasted at least this long resets the failure counter.
    #[serde(default = "default_min_healthy_uptime_secs")]
    pub min_healthy_uptime_secs: u64,

    #[serde(default = "default_backoff_initial_secs")]
    pub backoff_initial_secs: u64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Failures older than this no longer count toward backoff.
    #[serde(default = "default_backoff_window_secs")]
    pub backoff_window_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            worker_command: None,
            worker_args: Vec::new(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            min_healthy_uptime_secs: default_min_healthy_uptime_secs(),
            backoff_initial_secs: default_backoff_initial_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_window_secs: default_backoff_window_secs(),
        }
    }
}

impl SupervisorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

fn default_tick_interval_secs() -> u64 {
    3
}

fn default_stop_grace_secs() -> u64 {
    5
}

fn default_heartbeat_interval_secs() -> u64 {
    2
}

fn default_min_healthy_uptime_secs() -> u64 {
    60
}

fn default_backoff_initial_secs() -> u64 {
    2
}

fn default_backoff_max_secs() -> u64 {
    300
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_window_secs() -> u64 {
    600
}

/// Delivery endpoint for one dispatch channel.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelEndpointConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Sent as `X-Engyne-Channel-Secret`.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for ChannelEndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEndpointConfig")
            .field("webhook_url", &self.webhook_url)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Dispatcher queue engine settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum items examined per channel per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sends per slot per 60-second window. `0` disables the limit.
    #[serde(default = "default_rate_per_minute")]
    pub rate_per_minute: u32,

    /// Advance past items held by `dry_run` instead of holding them.
    #[serde(default)]
    pub dry_run_advance: bool,

    /// Repeat sends to the same recipient inside this window are duplicates.
    #[serde(default = "default_dedup_window_hours")]
    pub dedup_window_hours: u64,

    #[serde(default = "default_retry_initial_secs")]
    pub retry_initial_secs: u64,

    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,

    /// Keyed by channel name (`whatsapp`, `email`, ...).
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelEndpointConfig>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            rate_per_minute: default_rate_per_minute(),
            dry_run_advance: false,
            dedup_window_hours: default_dedup_window_hours(),
            retry_initial_secs: default_retry_initial_secs(),
            retry_max_secs: default_retry_max_secs(),
            channels: BTreeMap::new(),
        }
    }
}

impl DispatcherConfig {
    /// Endpoint configured for `channel`, if any.
    pub fn endpoint(&self, channel: Channel) -> Option<&ChannelEndpointConfig> {
        self.channels.get(&channel.to_string())
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_batch_size() -> usize {
    50
}

fn default_rate_per_minute() -> u32 {
    6
}

fn default_dedup_window_hours() -> u64 {
    24
}

fn default_retry_initial_secs() -> u64 {
    5
}

fn default_retry_max_secs() -> u64 {
    300
}

/// Remote-login session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteLoginConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_host")]
    pub vnc_host: String,

    #[serde(default = "default_vnc_port")]
    pub vnc_port: u16,

    /// Base URL used to build the session `url` in responses.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for RemoteLoginConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            vnc_host: default_host(),
            vnc_port: default_vnc_port(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    900
}

fn default_vnc_port() -> u16 {
    5900
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

/// Operator alerting.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertsConfig {
    /// Slack incoming webhook. Alerts only go to logs when unset.
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
}

/// Prometheus exporter.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enabled: bool,
}
