// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel rate windows and recipient history.
//!
//! Both documents are small JSON maps persisted next to the channel queue
//! and reloaded at the start of every tick.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use engyne_core::SlotId;
use serde::{Deserialize, Serialize};

const RATE_WINDOW_SECS: i64 = 60;

/// Sends counted in one fixed 60-second window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    pub window_start: DateTime<Utc>,
    pub sent: u32,
}

/// Fixed-window send counters keyed by slot (`<channel>.rate.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateState {
    slots: BTreeMap<String, RateWindow>,
}

impl RateState {
    /// Whether `slot` may send now. A `limit` of zero never limits.
    pub fn allows(&self, slot: &SlotId, limit: u32, now: DateTime<Utc>) -> bool {
        if limit == 0 {
            return true;
        }
        match self.slots.get(slot.as_str()) {
            Some(w) if !expired(w, now) => w.sent < limit,
            _ => true,
        }
    }

    /// Count one send, opening a new window if the old one lapsed.
    pub fn record(&mut self, slot: &SlotId, now: DateTime<Utc>) {
        let window = self
            .slots
            .entry(slot.to_string())
            .or_insert(RateWindow {
                window_start: now,
                sent: 0,
            });
        if expired(window, now) {
            *window = RateWindow {
                window_start: now,
                sent: 0,
            };
        }
        window.sent += 1;
    }

    /// When the current window for `slot` closes.
    pub fn reopens_at(&self, slot: &SlotId) -> Option<DateTime<Utc>> {
        self.slots
            .get(slot.as_str())
            .map(|w| w.window_start + Duration::seconds(RATE_WINDOW_SECS))
    }
}

fn expired(window: &RateWindow, now: DateTime<Utc>) -> bool {
    now - window.window_start >= Duration::seconds(RATE_WINDOW_SECS)
}

/// Delivery history for one `(slot, recipient)` on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub last_sent_at: DateTime<Utc>,
    pub count: u64,
    /// Event keys delivered to this recipient, with send time.
    #[serde(default)]
    pub keys: BTreeMap<String, DateTime<Utc>>,
}

/// Recipient history for one channel (`<channel>.contact_state.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactState {
    contacts: BTreeMap<String, ContactRecord>,
}

impl ContactState {
    fn entry_key(slot: &SlotId, recipient: &str) -> String {
        format!("{slot}|{recipient}")
    }

    /// Whether `key` already reached `recipient` within `window`.
    pub fn is_duplicate(
        &self,
        slot: &SlotId,
        recipient: &str,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        self.contacts
            .get(&Self::entry_key(slot, recipient))
            .and_then(|record| record.keys.get(key))
            .is_some_and(|sent_at| now - *sent_at < window)
    }

    /// Note a successful send, forgetting keys older than `window`.
    pub fn upsert(
        &mut self,
        slot: &SlotId,
        recipient: &str,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) {
        let record = self
            .contacts
            .entry(Self::entry_key(slot, recipient))
            .or_insert(ContactRecord {
                last_sent_at: now,
                count: 0,
                keys: BTreeMap::new(),
            });
        record.keys.retain(|_, sent_at| now - *sent_at < window);
        record.keys.insert(key.to_string(), now);
        record.last_sent_at = now;
        record.count += 1;
    }

    pub fn get(&self, slot: &SlotId, recipient: &str) -> Option<&ContactRecord> {
        self.contacts.get(&Self::entry_key(slot, recipient))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn slot(id: &str) -> SlotId {
        SlotId::parse(id).unwrap()
    }

    #[test]
    fn fixed_window_limits_per_slot() {
        let mut rate = RateState::default();
        let a = slot("a");
        for _ in 0..2 {
            assert!(rate.allows(&a, 2, t0()));
            rate.record(&a, t0());
        }
        assert!(!rate.allows(&a, 2, t0() + Duration::seconds(59)));
        assert!(rate.allows(&slot("b"), 2, t0()));
        assert!(rate.allows(&a, 2, t0() + Duration::seconds(60)));
        assert_eq!(rate.reopens_at(&a), Some(t0() + Duration::seconds(60)));

        rate.record(&a, t0() + Duration::seconds(61));
        assert!(rate.allows(&a, 2, t0() + Duration::seconds(61)));
    }

    #[test]
    fn zero_limit_is_unlimited() {
        let mut rate = RateState::default();
        let a = slot("a");
        for _ in 0..100 {
            rate.record(&a, t0());
        }
        assert!(rate.allows(&a, 0, t0()));
    }

    #[test]
    fn duplicate_only_within_window() {
        let mut contacts = ContactState::default();
        let a = slot("a");
        let day = Duration::hours(24);
        contacts.upsert(&a, "+91", "L1", day, t0());

        assert!(contacts.is_duplicate(&a, "+91", "L1", day, t0() + Duration::hours(23)));
        assert!(!contacts.is_duplicate(&a, "+91", "L1", day, t0() + Duration::hours(24)));
        assert!(!contacts.is_duplicate(&a, "+91", "L2", day, t0()));
        assert!(!contacts.is_duplicate(&slot("b"), "+91", "L1", day, t0()));

        contacts.upsert(&a, "+91", "L2", day, t0() + Duration::hours(25));
        let record = contacts.get(&a, "+91").unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.keys.len(), 1);
    }
}
