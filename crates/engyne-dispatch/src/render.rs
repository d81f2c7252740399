// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Write as _;

use engyne_core::{Channel, VerifiedEvent};

/// Payload keys echoed in the rendered message when present.
const DETAIL_KEYS: &[&str] = &["name", "company", "city", "country", "quantity"];

/// Human-readable notification for one verified event.
///
/// Email and Slack get a multi-line body; chat channels a compact one.
pub fn render_message(channel: Channel, event: &VerifiedEvent) -> String {
    let title = event
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("New verified lead");

    let details: Vec<String> = DETAIL_KEYS
        .iter()
        .filter_map(|key| match event.payload.get(*key)? {
            serde_json::Value::String(s) if !s.trim().is_empty() => {
                Some(format!("{key}: {}", s.trim()))
            }
            serde_json::Value::Number(n) => Some(format!("{key}: {n}")),
            _ => None,
        })
        .collect();

    let mut out = String::new();
    match channel {
        Channel::Email | Channel::Slack | Channel::Sheets => {
            let _ = writeln!(out, "{title}");
            let _ = writeln!(out, "slot: {}", event.slot_id);
            if let Some(lead_id) = &event.lead_id {
                let _ = writeln!(out, "lead: {lead_id}");
            }
            for line in &details {
                let _ = writeln!(out, "{line}");
            }
            let _ = write!(out, "observed: {}", event.observed_at.to_rfc3339());
        }
        Channel::Whatsapp | Channel::Telegram | Channel::Push => {
            out.push_str(title);
            if !details.is_empty() {
                out.push_str(" (");
                out.push_str(&details.join(", "));
                out.push(')');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use engyne_core::SlotId;
    use serde_json::json;

    use super::*;

    fn event() -> VerifiedEvent {
        let mut payload = serde_json::Map::new();
        payload.insert("city".into(), json!("Pune"));
        payload.insert("quantity".into(), json!(40));
        payload.insert("phone".into(), json!("+911234"));
        VerifiedEvent {
            slot_id: SlotId::parse("slot-a").unwrap(),
            lead_id: Some("L9".into()),
            observed_at: Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap(),
            title: Some(" Steel pipes ".into()),
            payload,
        }
    }

    #[test]
    fn chat_message_is_one_line() {
        let text = render_message(Channel::Whatsapp, &event());
        assert_eq!(text, "Steel pipes (city: Pune, quantity: 40)");
    }

    #[test]
    fn email_message_carries_identity() {
        let text = render_message(Channel::Email, &event());
        assert!(text.starts_with("Steel pipes\nslot: slot-a\nlead: L9\n"));
        assert!(text.ends_with("observed: 2026-02-01T09:30:00+00:00"));
        assert!(!text.contains("+911234"));
    }

    #[test]
    fn untitled_event_gets_a_default() {
        let mut e = event();
        e.title = None;
        e.payload.clear();
        assert_eq!(render_message(Channel::Telegram, &e), "New verified lead");
    }
}
