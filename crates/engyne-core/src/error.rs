// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Engyne control plane.

use thiserror::Error;

use crate::policy::PolicyIssue;

/// The primary error type used across the supervisor, pipeline, and dispatcher.
#[derive(Debug, Error)]
pub enum EngyneError {
    /// Node configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// A slot policy failed validation at the config-update boundary.
    #[error("invalid policy: {}", format_issues(issues))]
    InvalidPolicy { issues: Vec<PolicyIssue> },

    /// Slot identifier does not match the allowed pattern or escapes the slots root.
    #[error("invalid slot id `{0}` (use alphanumerics, dot, underscore, dash)")]
    InvalidSlotId(String),

    /// The slot has not been provisioned.
    #[error("slot not found: {0}")]
    SlotNotFound(String),

    /// Filesystem or serialization failure in the slot/runtime stores.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Worker launch, signal, or reap failure.
    #[error("worker error: {message}")]
    Worker {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Outbound delivery failure on a dispatch channel.
    #[error("delivery error on {channel}: {message}")]
    Delivery {
        channel: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Missing or wrong shared credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Request body or record failed structural validation.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Another slot holds the remote-login session.
    #[error("remote login session occupied by slot {slot_id}")]
    SessionOccupied { slot_id: String },

    /// No active remote-login session matches the token.
    #[error("remote login session not found")]
    SessionNotFound,

    /// Attempted to move a channel cursor backwards.
    #[error("cursor for {channel} cannot move from {current} back to {requested}")]
    CursorRegression {
        channel: String,
        current: u64,
        requested: u64,
    },

    /// Illegal worker phase transition.
    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngyneError {
    /// Wrap any error as a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// Build a delivery failure without an underlying source.
    pub fn delivery(channel: impl ToString, message: impl Into<String>) -> Self {
        Self::Delivery {
            channel: channel.to_string(),
            message: message.into(),
            source: None,
        }
    }
}

impl From<std::io::Error> for EngyneError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err)
    }
}

impl From<serde_json::Error> for EngyneError {
    fn from(err: serde_json::Error) -> Self {
        Self::storage(err)
    }
}

fn format_issues(issues: &[PolicyIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
