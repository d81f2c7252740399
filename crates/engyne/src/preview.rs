// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `engyne preview`: offline policy preview against a slot's recent leads.

use std::path::Path;

use engyne_config::EngyneConfig;
use engyne_core::{EngyneError, SlotId, SlotPolicy};
use engyne_quality::preview;
use engyne_storage::SlotStore;

/// Score the last `sample` observed events of `slot` against the draft
/// policy in `policy_path` and return the report as pretty JSON.
pub fn run_preview(
    config: &EngyneConfig,
    slot: &str,
    policy_path: &Path,
    sample: usize,
) -> Result<String, EngyneError> {
    let slot = SlotId::parse(slot)?;
    let store = SlotStore::new(config.paths.slots_root());
    if !store.exists(&slot) {
        return Err(EngyneError::SlotNotFound(slot.to_string()));
    }

    let text = std::fs::read_to_string(policy_path)?;
    let policy: SlotPolicy = toml::from_str(&text).map_err(|e| {
        EngyneError::Malformed(format!("{}: {e}", policy_path.display()))
    })?;
    policy.ensure_valid()?;

    let events = store.recent_leads(&slot, sample)?;
    let report = preview(&policy, &events);
    serde_json::to_string_pretty(&report).map_err(|e| EngyneError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use engyne_core::ObservedEvent;
    use engyne_test_utils::TestHarness;

    use super::*;

    fn seed(harness: &TestHarness) -> SlotId {
        let slot = harness.provision("s1", SlotPolicy::default()).unwrap();
        for (id, title) in [("a", "Steel pipes"), ("b", "Copper wire")] {
            let mut event = ObservedEvent::new(Utc::now());
            event.lead_id = Some(id.into());
            event.title = Some(title.into());
            harness.slots.append_lead(&slot, &event).unwrap();
        }
        slot
    }

    #[test]
    fn reports_decisions_for_recent_leads() {
        let harness = TestHarness::new().unwrap();
        seed(&harness);
        let draft = harness.root().join("draft.toml");
        std::fs::write(&draft, "keywords_include = [\"steel\"]\n").unwrap();

        let out = run_preview(&harness.config, "s1", &draft, 10).unwrap();
        let report: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(report["total"], 2);
        assert_eq!(report["kept"], 1);
        assert_eq!(report["rejected"], 1);
    }

    #[test]
    fn rejects_invalid_draft_and_unknown_slot() {
        let harness = TestHarness::new().unwrap();
        seed(&harness);
        let draft = harness.root().join("draft.toml");

        std::fs::write(&draft, "max_run_minutes = 0\n").unwrap();
        assert!(matches!(
            run_preview(&harness.config, "s1", &draft, 10),
            Err(EngyneError::InvalidPolicy { .. })
        ));

        std::fs::write(&draft, "not_a_field = 1\n").unwrap();
        assert!(matches!(
            run_preview(&harness.config, "s1", &draft, 10),
            Err(EngyneError::Malformed(_))
        ));

        std::fs::write(&draft, "").unwrap();
        assert!(matches!(
            run_preview(&harness.config, "ghost", &draft, 10),
            Err(EngyneError::SlotNotFound(_))
        ));
    }
}
