// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed quality-level step table.
//!
//! The steps are not interpolated. Changing them changes which historical
//! events a given level keeps, so any change needs a versioned migration.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub min_member_months: u32,
    pub max_age_hours: f64,
}

/// Thresholds for a quality level. Levels above 100 are treated as 100.
pub fn thresholds_for(quality_level: u32) -> Thresholds {
    let (min_member_months, max_age_hours) = match quality_level.min(100) {
        90.. => (24, 24.0),
        70..=89 => (12, 36.0),
        40..=69 => (6, 48.0),
        _ => (0, 48.0),
    };
    Thresholds {
        min_member_months,
        max_age_hours,
    }
}
