// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use engyne_core::{Channel, Clock, EngyneError, SlotId, SlotPolicy, VerifiedEvent};
use engyne_dispatch::{DispatchQueueItem, IngestStatus, LedgerEntry, VerifiedPipeline};
use engyne_test_utils::TestHarness;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "worker-secret";

fn pipeline(harness: &TestHarness) -> VerifiedPipeline {
    VerifiedPipeline::open(
        harness.slots.clone(),
        harness.runtime.clone(),
        Some(SECRET.into()),
        Arc::new(harness.clock.clone()),
    )
    .unwrap()
}

fn event(harness: &TestHarness, slot: &str, lead_id: &str) -> VerifiedEvent {
    let mut payload = serde_json::Map::new();
    payload.insert("phone".into(), json!("+919800000000"));
    VerifiedEvent {
        slot_id: SlotId::parse(slot).unwrap(),
        lead_id: Some(lead_id.into()),
        observed_at: harness.clock.now(),
        title: Some("Steel pipes".into()),
        payload,
    }
}

fn queued(harness: &TestHarness, channel: Channel) -> Vec<DispatchQueueItem> {
    harness.runtime.queue_records(channel).unwrap()
}

#[tokio::test]
async fn fans_out_to_enabled_channels_only() {
    let harness = TestHarness::new().unwrap();
    harness
        .provision("s1", TestHarness::live_policy(&[Channel::Whatsapp, Channel::Email]))
        .unwrap();
    let pipeline = pipeline(&harness);

    let ack = pipeline
        .ingest(&event(&harness, "s1", "L1"), Some(SECRET))
        .await
        .unwrap();
    assert_eq!(ack.status, IngestStatus::Accepted);
    assert_eq!(ack.key, "L1");
    assert_eq!(ack.channels, vec![Channel::Whatsapp, Channel::Email]);

    assert_eq!(queued(&harness, Channel::Whatsapp).len(), 1);
    assert_eq!(queued(&harness, Channel::Email).len(), 1);
    assert!(queued(&harness, Channel::Telegram).is_empty());

    let ledger: Vec<LedgerEntry> = harness.runtime.read_verified().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].channels, ack.channels);
}

#[tokio::test]
async fn duplicate_ingest_enqueues_once_per_channel() {
    let harness = TestHarness::new().unwrap();
    harness
        .provision("s1", TestHarness::live_policy(&[Channel::Whatsapp, Channel::Sheets]))
        .unwrap();
    let pipeline = pipeline(&harness);
    let e = event(&harness, "s1", "L1");

    pipeline.ingest(&e, Some(SECRET)).await.unwrap();
    let again = pipeline.ingest(&e, Some(SECRET)).await.unwrap();
    assert_eq!(again.status, IngestStatus::Duplicate);
    assert!(again.channels.is_empty());

    assert_eq!(queued(&harness, Channel::Whatsapp).len(), 1);
    assert_eq!(queued(&harness, Channel::Sheets).len(), 1);
}

#[tokio::test]
async fn concurrent_duplicates_enqueue_once() {
    let harness = TestHarness::new().unwrap();
    harness
        .provision("s1", TestHarness::live_policy(&[Channel::Whatsapp]))
        .unwrap();
    let pipeline = pipeline(&harness);
    let e = event(&harness, "s1", "L1");

    let (a, b) = tokio::join!(
        pipeline.ingest(&e, Some(SECRET)),
        pipeline.ingest(&e, Some(SECRET))
    );
    let mut statuses = vec![a.unwrap().status, b.unwrap().status];
    statuses.sort_by_key(|s| *s == IngestStatus::Duplicate);
    assert_eq!(statuses, vec![IngestStatus::Accepted, IngestStatus::Duplicate]);
    assert_eq!(queued(&harness, Channel::Whatsapp).len(), 1);
}

#[tokio::test]
async fn same_lead_id_on_another_slot_is_distinct() {
    let harness = TestHarness::new().unwrap();
    harness
        .provision("s1", TestHarness::live_policy(&[Channel::Whatsapp]))
        .unwrap();
    harness
        .provision("s2", TestHarness::live_policy(&[Channel::Whatsapp]))
        .unwrap();
    let pipeline = pipeline(&harness);

    pipeline.ingest(&event(&harness, "s1", "L1"), Some(SECRET)).await.unwrap();
    let ack = pipeline.ingest(&event(&harness, "s2", "L1"), Some(SECRET)).await.unwrap();
    assert_eq!(ack.status, IngestStatus::Accepted);
    assert_eq!(queued(&harness, Channel::Whatsapp).len(), 2);
}

#[tokio::test]
async fn rejections_leave_no_trace() {
    let harness = TestHarness::new().unwrap();
    harness
        .provision("s1", TestHarness::live_policy(&[Channel::Whatsapp]))
        .unwrap();
    let pipeline = pipeline(&harness);
    let good = event(&harness, "s1", "L1");

    assert!(matches!(
        pipeline.ingest(&good, None).await,
        Err(EngyneError::Unauthorized)
    ));
    assert!(matches!(
        pipeline.ingest(&good, Some("wrong")).await,
        Err(EngyneError::Unauthorized)
    ));

    let mut anonymous = good.clone();
    anonymous.lead_id = None;
    anonymous.title = None;
    assert!(matches!(
        pipeline.ingest(&anonymous, Some(SECRET)).await,
        Err(EngyneError::Malformed(_))
    ));

    let ghost = event(&harness, "ghost", "L2");
    assert!(matches!(
        pipeline.ingest(&ghost, Some(SECRET)).await,
        Err(EngyneError::SlotNotFound(_))
    ));

    assert!(harness.runtime.read_verified::<LedgerEntry>().unwrap().is_empty());
    assert!(queued(&harness, Channel::Whatsapp).is_empty());

    // The rejected attempts did not poison the key.
    let ack = pipeline.ingest(&good, Some(SECRET)).await.unwrap();
    assert_eq!(ack.status, IngestStatus::Accepted);
}

#[tokio::test]
async fn missing_secret_config_rejects_everything() {
    let harness = TestHarness::new().unwrap();
    harness.provision("s1", SlotPolicy::default()).unwrap();
    let pipeline = VerifiedPipeline::open(
        harness.slots.clone(),
        harness.runtime.clone(),
        Some(String::new()),
        Arc::new(harness.clock.clone()),
    )
    .unwrap();
    assert!(matches!(
        pipeline.ingest(&event(&harness, "s1", "L1"), Some("")).await,
        Err(EngyneError::Unauthorized)
    ));
}

#[tokio::test]
async fn keys_survive_reopen() {
    let harness = TestHarness::new().unwrap();
    harness
        .provision("s1", TestHarness::live_policy(&[Channel::Email]))
        .unwrap();
    let e = event(&harness, "s1", "L1");
    pipeline(&harness).ingest(&e, Some(SECRET)).await.unwrap();

    let reopened = pipeline(&harness);
    let ack = reopened.ingest(&e, Some(SECRET)).await.unwrap();
    assert_eq!(ack.status, IngestStatus::Duplicate);
    assert_eq!(queued(&harness, Channel::Email).len(), 1);
}

#[tokio::test]
async fn reopen_restores_items_lost_after_the_ledger_write() {
    let harness = TestHarness::new().unwrap();
    harness
        .provision("s1", TestHarness::live_policy(&[Channel::Whatsapp, Channel::Email]))
        .unwrap();
    let e = event(&harness, "s1", "L1");
    // Simulate a crash after the ledger append and the first queue append.
    harness
        .runtime
        .append_verified(&LedgerEntry {
            key: "L1".into(),
            accepted_at: harness.clock.now(),
            channels: vec![Channel::Whatsapp, Channel::Email],
            event: e.clone(),
        })
        .unwrap();
    harness
        .runtime
        .append_queue(
            Channel::Whatsapp,
            &DispatchQueueItem::pending(Channel::Whatsapp, "L1".into(), e.clone(), harness.clock.now()),
        )
        .unwrap();

    let _ = pipeline(&harness);
    assert_eq!(queued(&harness, Channel::Whatsapp).len(), 1);
    let email = queued(&harness, Channel::Email);
    assert_eq!(email.len(), 1);
    assert_eq!(email[0].key, "L1");

    // A second open finds nothing to repair.
    let _ = pipeline(&harness);
    assert_eq!(queued(&harness, Channel::Email).len(), 1);
}

#[tokio::test]
async fn retry_after_partial_fan_out_enqueues_each_channel_once() {
    let harness = TestHarness::new().unwrap();
    harness
        .provision("s1", TestHarness::live_policy(&[Channel::Whatsapp, Channel::Telegram]))
        .unwrap();
    let pipeline = pipeline(&harness);
    let e = event(&harness, "s1", "L1");

    // A directory in place of the telegram queue makes its append fail.
    let blocked = harness.runtime.queue_path(Channel::Telegram);
    std::fs::create_dir_all(&blocked).unwrap();
    assert!(matches!(
        pipeline.ingest(&e, Some(SECRET)).await,
        Err(EngyneError::Storage { .. })
    ));
    assert_eq!(queued(&harness, Channel::Whatsapp).len(), 1);

    std::fs::remove_dir(&blocked).unwrap();
    let ack = pipeline.ingest(&e, Some(SECRET)).await.unwrap();
    assert_eq!(ack.status, IngestStatus::Duplicate);
    assert_eq!(queued(&harness, Channel::Whatsapp).len(), 1);
    let telegram = queued(&harness, Channel::Telegram);
    assert_eq!(telegram.len(), 1);
    assert_eq!(telegram[0].key, "L1");
    let ledger: Vec<LedgerEntry> = harness.runtime.read_verified().unwrap();
    assert_eq!(ledger.len(), 1);

    // Repaired once; later retries change nothing.
    pipeline.ingest(&e, Some(SECRET)).await.unwrap();
    assert_eq!(queued(&harness, Channel::Telegram).len(), 1);
}

#[tokio::test]
async fn live_policy_webhook_receives_the_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/policy-hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let harness = TestHarness::new().unwrap();
    let mut policy = TestHarness::live_policy(&[]);
    policy.webhook_url = Some(format!("{}/policy-hook", server.uri()));
    harness.provision("s1", policy).unwrap();
    let pipeline = pipeline(&harness);
    pipeline.ingest(&event(&harness, "s1", "L1"), Some(SECRET)).await.unwrap();

    let mut received = Vec::new();
    for _ in 0..100 {
        received = server.received_requests().await.unwrap_or_default();
        if !received.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["lead_id"], "L1");
    assert_eq!(body["slot_id"], "s1");
}
