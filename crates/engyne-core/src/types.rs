// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the supervisor, worker, decision engine, and dispatcher.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::EngyneError;

/// Heartbeat age after which a worker is treated as crashed.
pub const HEARTBEAT_STALE_AFTER: std::time::Duration = std::time::Duration::from_secs(30);

/// Validated slot identifier (`^[A-Za-z0-9._-]+$`, not `.` or `..`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotId(String);

impl SlotId {
    /// Parse and validate a slot identifier.
    pub fn parse(raw: &str) -> Result<Self, EngyneError> {
        let valid = !raw.is_empty()
            && raw != "."
            && raw != ".."
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(EngyneError::InvalidSlotId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SlotId {
    type Error = EngyneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SlotId> for String {
    fn from(value: SlotId) -> Self {
        value.0
    }
}

/// Worker lifecycle phase.
///
/// `Boot`, `Init`, `ParseLeads`, `Cooldown` and `LoginRequired` are live
/// phases; `Stopping` and `Error` are terminal for a run. `Stopped` is only
/// ever assigned by the supervisor when no worker is resident.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Boot,
    Init,
    ParseLeads,
    Cooldown,
    LoginRequired,
    Stopping,
    Error,
    Stopped,
}

impl Phase {
    /// Whether a worker in this phase is expected to keep emitting heartbeats.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Stopping | Phase::Error | Phase::Stopped)
    }
}

/// Why a slot is not running (or was last stopped).
///
/// Every stop the supervisor performs records one of these so operators can
/// tell policy stops apart from crashes in the runtime snapshot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// Operator called `stop`.
    Manual,
    /// `max_run_minutes` exceeded; requires operator re-enable.
    RunCap,
    /// Heartbeat older than [`HEARTBEAT_STALE_AFTER`].
    StaleHeartbeat,
    /// Worker process exited unexpectedly.
    Crashed,
    /// Worker could not be launched.
    BootFailure,
    /// Paused for a remote-login recovery session.
    RemoteLogin,
    /// Supervisor shutdown.
    Shutdown,
}

/// Outbound dispatch channel.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    Whatsapp,
    Telegram,
    Email,
    Sheets,
    Push,
    Slack,
}

impl Channel {
    /// Payload keys consulted, in order, for this channel's recipient.
    ///
    /// Channels with no keys deliver to their configured webhook only and
    /// never block on a missing contact.
    pub fn contact_keys(self) -> &'static [&'static str] {
        match self {
            Channel::Whatsapp => &["whatsapp", "phone", "mobile", "phone_number"],
            Channel::Telegram => &["telegram", "telegram_chat_id", "chat_id"],
            Channel::Email => &["email", "email_address"],
            Channel::Push => &["push_subscription", "subscription"],
            Channel::Sheets | Channel::Slack => &[],
        }
    }

    pub fn requires_contact(self) -> bool {
        !self.contact_keys().is_empty()
    }
}

/// A way of reaching the buyer behind an observed event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContactMethod {
    #[serde(alias = "mobile", alias = "call")]
    Phone,
    #[serde(alias = "mail")]
    Email,
    #[serde(alias = "wa")]
    Whatsapp,
}

/// Which contact methods an observed event exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactAvailability {
    #[serde(default)]
    pub phone: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub whatsapp: bool,
}

impl ContactAvailability {
    pub fn has(&self, method: ContactMethod) -> bool {
        match method {
            ContactMethod::Phone => self.phone,
            ContactMethod::Email => self.email,
            ContactMethod::Whatsapp => self.whatsapp,
        }
    }
}

/// Why the decision engine rejected an event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    CountryNotAllowed,
    CountryBlocked,
    MinMemberMonths,
    MaxAgeHours,
    KeywordMissing,
    KeywordExcluded,
    MissingContact,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Keep/reject verdict with the first failing check as the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub keep: bool,
    pub reason: Option<RejectReason>,
}

impl Decision {
    pub fn keep() -> Self {
        Self {
            keep: true,
            reason: None,
        }
    }

    pub fn reject(reason: RejectReason) -> Self {
        Self {
            keep: false,
            reason: Some(reason),
        }
    }
}

/// One externally observed candidate item ("lead").
///
/// Fields the worker could not derive stay `None`; the decision engine treats
/// them as unknown rather than failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedEvent {
    /// Natural id from the source site; dedup key when present.
    #[serde(default)]
    pub lead_id: Option<String>,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Free text blob from the listing. Never used for country matching.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub age_hours: Option<f64>,
    #[serde(default)]
    pub member_months: Option<u32>,
    #[serde(default)]
    pub contact: ContactAvailability,
    #[serde(default)]
    pub decision: Option<Decision>,
}

impl ObservedEvent {
    /// A bare event observed now, used by tests and previews.
    pub fn new(observed_at: DateTime<Utc>) -> Self {
        Self {
            lead_id: None,
            observed_at,
            title: None,
            country: None,
            category: None,
            text: None,
            age_hours: None,
            member_months: None,
            contact: ContactAvailability::default(),
            decision: None,
        }
    }

    /// Title, category, and text joined for keyword matching.
    pub fn keyword_haystack(&self) -> String {
        [&self.title, &self.category, &self.text]
            .iter()
            .filter_map(|field| field.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Per-slot counters persisted in the status snapshot every worker cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMetrics {
    #[serde(default)]
    pub observed: u64,
    #[serde(default)]
    pub kept: u64,
    #[serde(default)]
    pub rejected: u64,
    #[serde(default)]
    pub clicked: u64,
    #[serde(default)]
    pub verified: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn slot_id_accepts_allowed_characters() {
        assert!(SlotId::parse("slot-1").is_ok());
        assert!(SlotId::parse("A.b_c-9").is_ok());
    }

    #[test]
    fn slot_id_rejects_traversal_and_separators() {
        for bad in ["", ".", "..", "a/b", "../x", "a b", "slot\\1"] {
            assert!(
                matches!(SlotId::parse(bad), Err(EngyneError::InvalidSlotId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn slot_id_deserialization_validates() {
        let ok: SlotId = serde_json::from_str("\"slot-1\"").unwrap();
        assert_eq!(ok.as_str(), "slot-1");
        assert!(serde_json::from_str::<SlotId>("\"../etc\"").is_err());
    }

    #[test]
    fn phase_wire_format_is_screaming_snake() {
        let json = serde_json::to_string(&Phase::ParseLeads).unwrap();
        assert_eq!(json, "\"PARSE_LEADS\"");
        assert_eq!(Phase::from_str("LOGIN_REQUIRED").unwrap(), Phase::LoginRequired);
    }

    #[test]
    fn terminal_phases() {
        assert!(Phase::Stopping.is_terminal());
        assert!(Phase::Error.is_terminal());
        assert!(Phase::Stopped.is_terminal());
        assert!(!Phase::Cooldown.is_terminal());
        assert!(!Phase::LoginRequired.is_terminal());
    }

    #[test]
    fn channel_round_trips_through_display() {
        for channel in Channel::iter() {
            let parsed = Channel::from_str(&channel.to_string()).unwrap();
            assert_eq!(parsed, channel);
        }
    }

    #[test]
    fn webhook_only_channels_need_no_contact() {
        assert!(!Channel::Sheets.requires_contact());
        assert!(!Channel::Slack.requires_contact());
        assert!(Channel::Whatsapp.requires_contact());
    }

    #[test]
    fn contact_method_aliases() {
        let methods: Vec<ContactMethod> =
            serde_json::from_str(r#"["mobile", "call", "mail", "wa", "phone"]"#).unwrap();
        assert_eq!(
            methods,
            vec![
                ContactMethod::Phone,
                ContactMethod::Phone,
                ContactMethod::Email,
                ContactMethod::Whatsapp,
                ContactMethod::Phone,
            ]
        );
        assert!(serde_json::from_str::<ContactMethod>("\"fax\"").is_err());
    }

    #[test]
    fn reject_reason_strings() {
        assert_eq!(RejectReason::MinMemberMonths.as_str(), "min_member_months");
        assert_eq!(
            serde_json::to_string(&RejectReason::KeywordExcluded).unwrap(),
            "\"keyword_excluded\""
        );
    }

    #[test]
    fn keyword_haystack_skips_missing_fields() {
        let mut event = ObservedEvent::new(Utc::now());
        event.title = Some("Paracetamol".into());
        event.text = Some("500mg tablets".into());
        assert_eq!(event.keyword_haystack(), "Paracetamol 500mg tablets");
    }
}
