// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keep/reject verdicts.

use engyne_core::{Decision, ObservedEvent, RejectReason, SlotPolicy};

use crate::matching::{country_in, keywords_match};
use crate::thresholds::thresholds_for;

/// Score one event against a policy.
///
/// Checks run in a fixed order and the first failure becomes the reason:
/// country, member tenure, age, keyword include, keyword exclude, required
/// contact methods. Unknown tenure or age never rejects. An unknown country
/// is rejected only when an allow-list is configured.
pub fn decide(policy: &SlotPolicy, event: &ObservedEvent) -> Decision {
    match first_failure(policy, event) {
        Some(reason) => Decision::reject(reason),
        None => Decision::keep(),
    }
}

fn first_failure(policy: &SlotPolicy, event: &ObservedEvent) -> Option<RejectReason> {
    let country = event.country.as_deref().map(str::trim).filter(|c| !c.is_empty());
    match country {
        Some(country) => {
            if country_in(country, &policy.blocked_countries) {
                return Some(RejectReason::CountryBlocked);
            }
            if !policy.allowed_countries.is_empty()
                && !country_in(country, &policy.allowed_countries)
            {
                return Some(RejectReason::CountryNotAllowed);
            }
        }
        None if !policy.allowed_countries.is_empty() => {
            return Some(RejectReason::CountryNotAllowed);
        }
        None => {}
    }

    let thresholds = thresholds_for(policy.quality_level);
    if let Some(months) = event.member_months
        && months < thresholds.min_member_months
    {
        return Some(RejectReason::MinMemberMonths);
    }
    if let Some(age) = event.age_hours
        && age > thresholds.max_age_hours
    {
        return Some(RejectReason::MaxAgeHours);
    }

    let haystack = event.keyword_haystack();
    if !policy.keywords_include.is_empty()
        && !keywords_match(
            &haystack,
            &policy.keywords_include,
            policy.fuzzy_enabled,
            policy.fuzzy_threshold,
        )
    {
        return Some(RejectReason::KeywordMissing);
    }
    if !policy.keywords_exclude.is_empty()
        && keywords_match(
            &haystack,
            &policy.keywords_exclude,
            policy.fuzzy_enabled,
            policy.fuzzy_threshold,
        )
    {
        return Some(RejectReason::KeywordExcluded);
    }

    if policy
        .required_contact_methods
        .iter()
        .any(|method| !event.contact.has(*method))
    {
        return Some(RejectReason::MissingContact);
    }

    None
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use engyne_core::{ContactAvailability, ContactMethod};

    use super::*;

    fn event() -> ObservedEvent {
        let mut event = ObservedEvent::new(Utc::now());
        event.title = Some("Paracetamol 500mg".into());
        event.country = Some("India".into());
        event
    }

    #[test]
    fn empty_policy_keeps_everything() {
        let decision = decide(&SlotPolicy::default(), &ObservedEvent::new(Utc::now()));
        assert_eq!(decision, Decision::keep());
    }

    #[test]
    fn high_quality_rejects_short_tenure() {
        let policy = SlotPolicy {
            quality_level: 95,
            ..SlotPolicy::default()
        };
        let mut ev = event();
        ev.member_months = Some(20);
        assert_eq!(
            decide(&policy, &ev),
            Decision::reject(RejectReason::MinMemberMonths)
        );
    }

    #[test]
    fn high_quality_keeps_qualified_event() {
        let policy = SlotPolicy {
            quality_level: 95,
            allowed_countries: vec!["India".into()],
            required_contact_methods: vec![ContactMethod::Phone],
            ..SlotPolicy::default()
        };
        let mut ev = event();
        ev.member_months = Some(25);
        ev.age_hours = Some(10.0);
        ev.contact = ContactAvailability {
            phone: true,
            ..ContactAvailability::default()
        };
        assert_eq!(decide(&policy, &ev), Decision::keep());
    }

    #[test]
    fn missing_soft_fields_do_not_reject() {
        let policy = SlotPolicy {
            quality_level: 95,
            ..SlotPolicy::default()
        };
        let ev = event();
        assert!(ev.member_months.is_none() && ev.age_hours.is_none());
        assert!(decide(&policy, &ev).keep);
    }

    #[test]
    fn first_failing_check_wins() {
        let policy = SlotPolicy {
            quality_level: 95,
            blocked_countries: vec!["India".into()],
            keywords_include: vec!["steel".into()],
            ..SlotPolicy::default()
        };
        let mut ev = event();
        ev.member_months = Some(1);
        assert_eq!(decide(&policy, &ev).reason, Some(RejectReason::CountryBlocked));

        let policy = SlotPolicy {
            blocked_countries: vec![],
            ..policy
        };
        assert_eq!(decide(&policy, &ev).reason, Some(RejectReason::MinMemberMonths));

        ev.member_months = Some(30);
        ev.age_hours = Some(30.0);
        assert_eq!(decide(&policy, &ev).reason, Some(RejectReason::MaxAgeHours));

        ev.age_hours = Some(2.0);
        assert_eq!(decide(&policy, &ev).reason, Some(RejectReason::KeywordMissing));
    }

    #[test]
    fn allow_list_rejects_unknown_country() {
        let policy = SlotPolicy {
            allowed_countries: vec!["India".into()],
            ..SlotPolicy::default()
        };
        let mut ev = event();
        ev.country = None;
        assert_eq!(decide(&policy, &ev).reason, Some(RejectReason::CountryNotAllowed));

        let policy = SlotPolicy {
            blocked_countries: vec!["China".into()],
            ..SlotPolicy::default()
        };
        assert!(decide(&policy, &ev).keep);
    }

    #[test]
    fn country_never_read_from_free_text() {
        let policy = SlotPolicy {
            blocked_countries: vec!["China".into()],
            ..SlotPolicy::default()
        };
        let mut ev = event();
        ev.text = Some("Shipping from China accepted".into());
        assert!(decide(&policy, &ev).keep);
    }

    #[test]
    fn exclude_after_include() {
        let policy = SlotPolicy {
            keywords_include: vec!["paracetamol".into()],
            keywords_exclude: vec!["syrup".into()],
            ..SlotPolicy::default()
        };
        let mut ev = event();
        ev.text = Some("children syrup".into());
        assert_eq!(decide(&policy, &ev).reason, Some(RejectReason::KeywordExcluded));
    }

    #[test]
    fn required_contact_must_be_present() {
        let policy = SlotPolicy {
            required_contact_methods: vec![ContactMethod::Email, ContactMethod::Whatsapp],
            ..SlotPolicy::default()
        };
        let mut ev = event();
        ev.contact.email = true;
        assert_eq!(decide(&policy, &ev).reason, Some(RejectReason::MissingContact));
        ev.contact.whatsapp = true;
        assert!(decide(&policy, &ev).keep);
    }
}
