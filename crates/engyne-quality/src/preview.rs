// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Re-score a batch of events against a draft policy without persisting.

use std::collections::BTreeMap;

use engyne_core::{ObservedEvent, RejectReason, SlotPolicy};
use serde::Serialize;

use crate::decide::decide;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewDecision {
    pub lead_id: Option<String>,
    pub title: Option<String>,
    pub keep: bool,
    pub reason: Option<RejectReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreviewReport {
    pub total: usize,
    pub kept: usize,
    pub rejected: usize,
    /// Reject counts keyed by reason.
    pub reasons: BTreeMap<String, usize>,
    pub decisions: Vec<PreviewDecision>,
}

pub fn preview(policy: &SlotPolicy, events: &[ObservedEvent]) -> PreviewReport {
    let mut report = PreviewReport::default();
    for event in events {
        let decision = decide(policy, event);
        report.total += 1;
        match decision.reason {
            Some(reason) => {
                report.rejected += 1;
                *report.reasons.entry(reason.as_str().to_string()).or_default() += 1;
            }
            None => report.kept += 1,
        }
        report.decisions.push(PreviewDecision {
            lead_id: event.lead_id.clone(),
            title: event.title.clone(),
            keep: decision.keep,
            reason: decision.reason,
        });
    }
    report
}
