// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Verified-event wire record shared by the worker and the ingest pipeline.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EngyneError;
use crate::types::{Channel, SlotId};

/// Header carrying the shared worker credential on verified-event submissions.
pub const WORKER_SECRET_HEADER: &str = "X-Engyne-Worker-Secret";

/// A confirmed outcome tied to one observed event.
///
/// `payload` carries whatever contact fields the worker could read
/// (`phone`, `email`, `telegram_chat_id`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedEvent {
    pub slot_id: SlotId,
    #[serde(default)]
    pub lead_id: Option<String>,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl VerifiedEvent {
    /// Structural checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), EngyneError> {
        let lead_id = self.lead_id.as_deref().map(str::trim);
        if lead_id == Some("") {
            return Err(EngyneError::Malformed("lead_id must not be blank".into()));
        }
        let has_title = self.title.as_deref().is_some_and(|t| !t.trim().is_empty());
        if lead_id.is_none() && !has_title {
            return Err(EngyneError::Malformed(
                "event needs a lead_id or a title".into(),
            ));
        }
        Ok(())
    }

    /// Natural id when present, otherwise `syn-` plus 32 hex chars of
    /// SHA-256 over `slot_id`, `title`, and `observed_at`.
    pub fn idempotency_key(&self) -> String {
        if let Some(id) = self.lead_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.slot_id.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.title.as_deref().unwrap_or_default().trim().as_bytes());
        hasher.update(b"\n");
        hasher.update(
            self.observed_at
                .to_rfc3339_opts(SecondsFormat::Micros, true)
                .as_bytes(),
        );
        let digest = hex::encode(hasher.finalize());
        format!("syn-{}", &digest[..32])
    }

    /// Recipient for `channel`, from the first non-empty contact key.
    pub fn contact_for(&self, channel: Channel) -> Option<String> {
        channel.contact_keys().iter().find_map(|key| {
            match self.payload.get(*key)? {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Object(o) if !o.is_empty() => {
                    serde_json::to_string(o).ok()
                }
                _ => None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn event(lead_id: Option<&str>, title: Option<&str>) -> VerifiedEvent {
        VerifiedEvent {
            slot_id: SlotId::parse("slot-1").unwrap(),
            lead_id: lead_id.map(String::from),
            observed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            title: title.map(String::from),
            payload: serde_json::Map::new(),
        }
    }

    #[test]
    fn natural_id_is_the_key() {
        assert_eq!(event(Some(" L-77 "), None).idempotency_key(), "L-77");
    }

    #[test]
    fn synthetic_key_is_stable_and_input_sensitive() {
        let a = event(None, Some("Paracetamol"));
        let key = a.idempotency_key();
        assert!(key.starts_with("syn-"));
        assert_eq!(key.len(), 4 + 32);
        assert_eq!(key, a.clone().idempotency_key());

        let mut b = a.clone();
        b.title = Some("Ibuprofen".into());
        assert_ne!(b.idempotency_key(), key);

        let mut c = a.clone();
        c.observed_at += chrono::Duration::seconds(1);
        assert_ne!(c.idempotency_key(), key);
    }

    #[test]
    fn validation_requires_identity() {
        assert!(event(Some("L1"), None).validate().is_ok());
        assert!(event(None, Some("t")).validate().is_ok());
        assert!(matches!(
            event(None, None).validate(),
            Err(EngyneError::Malformed(_))
        ));
        assert!(event(Some("  "), Some("t")).validate().is_err());
    }

    #[test]
    fn contact_lookup_follows_key_order() {
        let mut ev = event(Some("L1"), None);
        ev.payload = json!({
            "mobile": "+91 99999",
            "phone": "",
            "email_address": "buyer@example.com",
            "push_subscription": {"endpoint": "https://push.example/1"},
        })
        .as_object()
        .unwrap()
        .clone();
        assert_eq!(ev.contact_for(Channel::Whatsapp).as_deref(), Some("+91 99999"));
        assert_eq!(
            ev.contact_for(Channel::Email).as_deref(),
            Some("buyer@example.com")
        );
        assert!(ev.contact_for(Channel::Push).unwrap().contains("endpoint"));
        assert_eq!(ev.contact_for(Channel::Telegram), None);
    }

    #[test]
    fn wire_format_rejects_bad_slot() {
        let raw = r#"{"slot_id": "../x", "observed_at": "2026-03-01T12:00:00Z", "lead_id": "L"}"#;
        assert!(serde_json::from_str::<VerifiedEvent>(raw).is_err());
    }
}
