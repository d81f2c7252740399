// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed per-slot policy document (`slot_config.toml`).
//!
//! Unknown keys are rejected at deserialization, and [`SlotPolicy::validate`]
//! collects every semantic problem instead of failing fast. Values are never
//! clamped or coerced: an invalid policy is refused at the boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EngyneError;
use crate::types::{Channel, ContactMethod};

/// One semantic problem found in a policy document.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum PolicyIssue {
    #[error("quality_level must be within 0..=100, got {0}")]
    QualityLevelOutOfRange(u32),

    #[error("fuzzy_threshold must be within 0.0..=1.0, got {0}")]
    FuzzyThresholdOutOfRange(f64),

    #[error("max_run_minutes must be greater than zero")]
    ZeroRunCap,

    #[error("country `{0}` is both allowed and blocked")]
    CountryConflict(String),

    #[error("keyword `{0}` is both included and excluded")]
    KeywordConflict(String),

    #[error("empty entry in {0}")]
    EmptyEntry(&'static str),

    #[error("webhook_url must start with http:// or https://, got `{0}`")]
    InvalidWebhookUrl(String),
}

/// Per-channel delivery toggles. All channels are off unless enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelToggles {
    #[serde(default)]
    pub whatsapp: bool,
    #[serde(default)]
    pub telegram: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub sheets: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub slack: bool,
}

impl ChannelToggles {
    pub fn is_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Whatsapp => self.whatsapp,
            Channel::Telegram => self.telegram,
            Channel::Email => self.email,
            Channel::Sheets => self.sheets,
            Channel::Push => self.push,
            Channel::Slack => self.slack,
        }
    }

    /// Enabled channels in a stable order.
    pub fn enabled(&self) -> Vec<Channel> {
        use strum::IntoEnumIterator;
        Channel::iter().filter(|c| self.is_enabled(*c)).collect()
    }
}

/// Quality and delivery policy for one slot.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SlotPolicy {
    /// Optional operator-managed document version, echoed in heartbeats.
    #[serde(default)]
    pub version: Option<u32>,

    /// Single quality slider mapped to thresholds by a fixed step table.
    #[serde(default)]
    pub quality_level: u32,

    #[serde(default)]
    pub allowed_countries: Vec<String>,

    #[serde(default)]
    pub blocked_countries: Vec<String>,

    #[serde(default)]
    pub keywords_include: Vec<String>,

    #[serde(default)]
    pub keywords_exclude: Vec<String>,

    #[serde(default)]
    pub fuzzy_enabled: bool,

    /// Minimum normalized similarity (0.0..=1.0) for a fuzzy keyword hit.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    #[serde(default)]
    pub required_contact_methods: Vec<ContactMethod>,

    #[serde(default)]
    pub channels: ChannelToggles,

    /// Forbids every externally visible side effect (click, send).
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    #[serde(default)]
    pub max_clicks_per_cycle: u32,

    /// Run-time cap per worker run. `None` means uncapped.
    #[serde(default)]
    pub max_run_minutes: Option<u32>,

    #[serde(default)]
    pub auto_buy: bool,

    /// Optional webhook notified once per accepted verified event.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            version: None,
            quality_level: 0,
            allowed_countries: Vec::new(),
            blocked_countries: Vec::new(),
            keywords_include: Vec::new(),
            keywords_exclude: Vec::new(),
            fuzzy_enabled: false,
            fuzzy_threshold: default_fuzzy_threshold(),
            required_contact_methods: Vec::new(),
            channels: ChannelToggles::default(),
            dry_run: default_dry_run(),
            max_clicks_per_cycle: 0,
            max_run_minutes: None,
            auto_buy: false,
            webhook_url: None,
        }
    }
}

fn default_fuzzy_threshold() -> f64 {
    0.85
}

fn default_dry_run() -> bool {
    true
}

impl SlotPolicy {
    /// Validate semantic constraints, collecting every issue.
    pub fn validate(&self) -> Result<(), Vec<PolicyIssue>> {
        let mut issues = Vec::new();

        if self.quality_level > 100 {
            issues.push(PolicyIssue::QualityLevelOutOfRange(self.quality_level));
        }

        if !(0.0..=1.0).contains(&self.fuzzy_threshold) || self.fuzzy_threshold.is_nan() {
            issues.push(PolicyIssue::FuzzyThresholdOutOfRange(self.fuzzy_threshold));
        }

        if self.max_run_minutes == Some(0) {
            issues.push(PolicyIssue::ZeroRunCap);
        }

        for (field, values) in [
            ("allowed_countries", &self.allowed_countries),
            ("blocked_countries", &self.blocked_countries),
            ("keywords_include", &self.keywords_include),
            ("keywords_exclude", &self.keywords_exclude),
        ] {
            if values.iter().any(|v| v.trim().is_empty()) {
                issues.push(PolicyIssue::EmptyEntry(field));
            }
        }

        for allowed in &self.allowed_countries {
            if self
                .blocked_countries
                .iter()
                .any(|b| b.trim().eq_ignore_ascii_case(allowed.trim()))
            {
                issues.push(PolicyIssue::CountryConflict(allowed.clone()));
            }
        }

        for included in &self.keywords_include {
            if self
                .keywords_exclude
                .iter()
                .any(|e| e.trim().eq_ignore_ascii_case(included.trim()))
            {
                issues.push(PolicyIssue::KeywordConflict(included.clone()));
            }
        }

        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                issues.push(PolicyIssue::InvalidWebhookUrl(url.clone()));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Validate and convert the issue list into an [`EngyneError`].
    pub fn ensure_valid(&self) -> Result<(), EngyneError> {
        self.validate()
            .map_err(|issues| EngyneError::InvalidPolicy { issues })
    }
}
