// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Derive age and tenure fields from listing text.

use std::sync::LazyLock;

use regex::Regex;

static AGE_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(mins?|minutes?|hours?|hrs?|days?)\s*ago\b").unwrap()
});

static MEMBER_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)member since\s+(\d+)\s*\+?\s*(months?|years?)").unwrap()
});

/// Parse "N minutes/hours/days ago" into hours.
pub fn parse_age_hours(text: &str) -> Option<f64> {
    let caps = AGE_RX.captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    let unit = caps[2].to_ascii_lowercase();
    if unit.starts_with("min") {
        Some(value / 60.0)
    } else if unit.starts_with('h') {
        Some(value)
    } else {
        Some(value * 24.0)
    }
}

/// Parse "member since N months/years" into months.
pub fn parse_member_months(text: &str) -> Option<u32> {
    let caps = MEMBER_RX.captures(text)?;
    let value: u32 = caps[1].parse().ok()?;
    if caps[2].to_ascii_lowercase().starts_with("year") {
        value.checked_mul(12)
    } else {
        Some(value)
    }
}

/// Fill `age_hours` and `member_months` from the event text where unset.
pub fn enrich(event: &mut engyne_core::ObservedEvent) {
    let Some(text) = event.text.clone() else {
        return;
    };
    if event.age_hours.is_none() {
        event.age_hours = parse_age_hours(&text);
    }
    if event.member_months.is_none() {
        event.member_months = parse_member_months(&text);
    }
}
