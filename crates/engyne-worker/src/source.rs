// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead source seam.
//!
//! The site-specific scraping binding lives behind [`LeadSource`]; the
//! runtime only sees observed events and click outcomes.

use async_trait::async_trait;
use engyne_core::{EngyneError, ObservedEvent};

/// Result of one poll of the source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePoll {
    Leads(Vec<ObservedEvent>),
    /// The session behind the source needs a human to log in again.
    LoginRequired,
}

/// Result of acting on a kept lead.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// Confirmed; the map carries contact fields for dispatch.
    Verified(serde_json::Map<String, serde_json::Value>),
    NotVerified,
}

#[async_trait]
pub trait LeadSource: Send + Sync {
    /// Fetch up to `limit` recently observed events.
    async fn poll(&mut self, limit: usize) -> Result<SourcePoll, EngyneError>;

    /// Act on a kept event. Only called when the policy allows side effects.
    async fn click(&mut self, event: &ObservedEvent) -> Result<ClickOutcome, EngyneError>;
}

/// A source that never observes anything. Keeps the lifecycle running
/// without a site binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleSource;

#[async_trait]
impl LeadSource for IdleSource {
    async fn poll(&mut self, _limit: usize) -> Result<SourcePoll, EngyneError> {
        Ok(SourcePoll::Leads(Vec::new()))
    }

    async fn click(&mut self, _event: &ObservedEvent) -> Result<ClickOutcome, EngyneError> {
        Ok(ClickOutcome::NotVerified)
    }
}
