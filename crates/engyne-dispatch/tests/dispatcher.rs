// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use engyne_config::model::DispatcherConfig;
use engyne_core::{Channel, ChannelSender, Clock, SlotId, VerifiedEvent};
use engyne_dispatch::{
    BlockReason, ChannelDispatcher, DeliveryLogEntry, DeliveryOutcome, DispatchQueueItem,
    DispatchSettings, Dispatcher, DispatchStatus, HoldReason, VerifiedPipeline,
};
use engyne_test_utils::{MockSender, TestHarness};
use serde_json::json;

const SECRET: &str = "wk";

struct Env {
    harness: TestHarness,
    pipeline: VerifiedPipeline,
}

fn env() -> Env {
    let harness = TestHarness::new().unwrap();
    let pipeline = VerifiedPipeline::open(
        harness.slots.clone(),
        harness.runtime.clone(),
        Some(SECRET.into()),
        Arc::new(harness.clock.clone()),
    )
    .unwrap();
    Env { harness, pipeline }
}

impl Env {
    fn live(&self, slot: &str, channels: &[Channel]) {
        self.harness
            .provision(slot, TestHarness::live_policy(channels))
            .unwrap();
    }

    async fn ingest(&self, slot: &str, lead_id: &str, phone: Option<&str>) {
        let mut payload = serde_json::Map::new();
        if let Some(phone) = phone {
            payload.insert("phone".into(), json!(phone));
        }
        let event = VerifiedEvent {
            slot_id: SlotId::parse(slot).unwrap(),
            lead_id: Some(lead_id.into()),
            observed_at: self.harness.clock.now(),
            title: Some("Steel pipes".into()),
            payload,
        };
        self.pipeline.ingest(&event, Some(SECRET)).await.unwrap();
    }

    fn consumer(
        &self,
        channel: Channel,
        sender: Option<&MockSender>,
        config: &DispatcherConfig,
    ) -> ChannelDispatcher {
        ChannelDispatcher::new(
            channel,
            self.harness.runtime.clone(),
            self.harness.slots.clone(),
            sender.map(|s| Arc::new(s.clone()) as Arc<dyn ChannelSender>),
            DispatchSettings::from_config(config),
            Arc::new(self.harness.clock.clone()),
        )
        .unwrap()
    }

    fn log(&self, channel: Channel) -> Vec<DeliveryLogEntry> {
        self.harness.runtime.read_delivery_log(channel).unwrap()
    }
}

#[tokio::test]
async fn missing_contact_blocks_and_advances_in_one_tick() {
    let env = env();
    env.live("s1", &[Channel::Whatsapp]);
    env.ingest("s1", "L1", None).await;
    env.ingest("s1", "L2", Some("+9198")).await;

    let sender = MockSender::new(Channel::Whatsapp);
    let mut consumer = env.consumer(Channel::Whatsapp, Some(&sender), &DispatcherConfig::default());
    let report = consumer.tick().await.unwrap();

    assert_eq!(report.blocked, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.held, None);
    assert_eq!(consumer.offset(), 2);

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].contact.as_deref(), Some("+9198"));
    assert_eq!(sent[0].record["key"], "L2");

    let log = env.log(Channel::Whatsapp);
    assert_eq!(log[0].outcome, DeliveryOutcome::Blocked);
    assert_eq!(log[0].status, Some(DispatchStatus::Blocked));
    assert_eq!(log[0].block_reason, Some(BlockReason::MissingContact));
    assert_eq!(log[0].key.as_deref(), Some("L1"));
    assert_eq!(log[1].outcome, DeliveryOutcome::Sent);
}

#[tokio::test]
async fn missing_webhook_blocks_and_advances() {
    let env = env();
    env.live("s1", &[Channel::Whatsapp]);
    env.ingest("s1", "L1", Some("+9198")).await;

    let mut consumer = env.consumer(Channel::Whatsapp, None, &DispatcherConfig::default());
    let report = consumer.tick().await.unwrap();
    assert_eq!(report.blocked, 1);
    assert_eq!(consumer.offset(), 1);
    assert_eq!(
        env.log(Channel::Whatsapp)[0].block_reason,
        Some(BlockReason::MissingWebhook)
    );
    assert!(!consumer.status().unwrap().webhook_configured);
}

#[tokio::test]
async fn channel_without_recipient_blocks_only_on_missing_webhook() {
    let env = env();
    env.live("s1", &[Channel::Sheets]);
    env.ingest("s1", "L1", None).await;
    env.ingest("s1", "L2", None).await;

    let mut unconfigured = env.consumer(Channel::Sheets, None, &DispatcherConfig::default());
    let report = unconfigured.tick().await.unwrap();
    assert_eq!(report.blocked, 2);
    assert!(
        env.log(Channel::Sheets)
            .iter()
            .all(|e| e.block_reason == Some(BlockReason::MissingWebhook))
    );
}

#[tokio::test]
async fn dry_run_slot_never_sends() {
    let env = env();
    let mut policy = TestHarness::live_policy(&[Channel::Whatsapp]);
    policy.dry_run = true;
    env.harness.provision("dry", policy).unwrap();
    env.live("live", &[Channel::Whatsapp]);
    env.ingest("dry", "L1", Some("+91")).await;
    env.ingest("live", "L2", Some("+92")).await;

    let sender = MockSender::new(Channel::Whatsapp);
    let mut consumer = env.consumer(Channel::Whatsapp, Some(&sender), &DispatcherConfig::default());
    for _ in 0..3 {
        let report = consumer.tick().await.unwrap();
        assert_eq!(report.held, Some(HoldReason::DryRun));
    }
    assert_eq!(consumer.offset(), 0);
    assert_eq!(sender.attempts(), 0);
    assert!(env.log(Channel::Whatsapp).is_empty());
    assert_eq!(consumer.status().unwrap().held, Some(HoldReason::DryRun));
}

#[tokio::test]
async fn dry_run_advance_skips_without_sending() {
    let env = env();
    let mut policy = TestHarness::live_policy(&[Channel::Whatsapp]);
    policy.dry_run = true;
    env.harness.provision("dry", policy).unwrap();
    env.live("live", &[Channel::Whatsapp]);
    env.ingest("dry", "L1", Some("+91")).await;
    env.ingest("live", "L2", Some("+92")).await;

    let config = DispatcherConfig {
        dry_run_advance: true,
        ..DispatcherConfig::default()
    };
    let sender = MockSender::new(Channel::Whatsapp);
    let mut consumer = env.consumer(Channel::Whatsapp, Some(&sender), &config);
    let report = consumer.tick().await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(consumer.offset(), 2);
    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].contact.as_deref(), Some("+92"));
    let log = env.log(Channel::Whatsapp);
    assert_eq!(log[0].outcome, DeliveryOutcome::Skipped);
    assert_eq!(log[0].status, None);
}

#[tokio::test]
async fn rate_limit_holds_in_order_until_the_window_reopens() {
    let env = env();
    env.live("s1", &[Channel::Whatsapp]);
    for (lead, phone) in [("L1", "+1"), ("L2", "+2"), ("L3", "+3")] {
        env.ingest("s1", lead, Some(phone)).await;
    }

    let config = DispatcherConfig {
        rate_per_minute: 2,
        ..DispatcherConfig::default()
    };
    let sender = MockSender::new(Channel::Whatsapp);
    let mut consumer = env.consumer(Channel::Whatsapp, Some(&sender), &config);

    let report = consumer.tick().await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(report.held, Some(HoldReason::RateLimited));
    assert_eq!(consumer.offset(), 2);

    env.harness.clock.advance_secs(30);
    let report = consumer.tick().await.unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(consumer.offset(), 2);

    env.harness.clock.advance_secs(30);
    let report = consumer.tick().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(consumer.offset(), 3);

    let order: Vec<_> = sender.sent().into_iter().map(|d| d.contact).collect();
    assert_eq!(order, vec![Some("+1".into()), Some("+2".into()), Some("+3".into())]);
}

#[tokio::test]
async fn failed_send_retries_after_backoff_without_advancing() {
    let env = env();
    env.live("s1", &[Channel::Whatsapp]);
    env.ingest("s1", "L1", Some("+1")).await;
    env.ingest("s1", "L2", Some("+2")).await;

    let sender = MockSender::new(Channel::Whatsapp);
    sender.fail_next(1);
    let mut consumer = env.consumer(Channel::Whatsapp, Some(&sender), &DispatcherConfig::default());

    let report = consumer.tick().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.held, Some(HoldReason::Retrying));
    assert_eq!(consumer.offset(), 0);
    let status = consumer.status().unwrap();
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(
        status.retry_at,
        Some(env.harness.clock.now() + chrono::Duration::seconds(5))
    );

    // Still backing off.
    env.harness.clock.advance_secs(4);
    consumer.tick().await.unwrap();
    assert_eq!(sender.attempts(), 1);

    env.harness.clock.advance_secs(1);
    let report = consumer.tick().await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(consumer.offset(), 2);
    assert_eq!(consumer.status().unwrap().consecutive_failures, 0);

    let log = env.log(Channel::Whatsapp);
    assert_eq!(log[0].outcome, DeliveryOutcome::Failed);
    assert_eq!(log[0].status, Some(DispatchStatus::Pending));
    assert_eq!(log[1].outcome, DeliveryOutcome::Sent);
    assert_eq!(log[1].key.as_deref(), Some("L1"));
}

#[tokio::test]
async fn abandon_moves_past_a_failing_head() {
    let env = env();
    env.live("s1", &[Channel::Whatsapp]);
    env.ingest("s1", "L1", Some("+1")).await;
    env.ingest("s1", "L2", Some("+2")).await;

    let sender = MockSender::new(Channel::Whatsapp);
    sender.fail_next(1);
    let mut consumer = env.consumer(Channel::Whatsapp, Some(&sender), &DispatcherConfig::default());
    consumer.tick().await.unwrap();

    assert_eq!(consumer.abandon().unwrap(), Some(0));
    assert_eq!(consumer.offset(), 1);
    assert_eq!(consumer.status().unwrap().retry_at, None);

    let report = consumer.tick().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(sender.sent()[0].contact.as_deref(), Some("+2"));

    let abandoned = &env.log(Channel::Whatsapp)[1];
    assert_eq!(abandoned.block_reason, Some(BlockReason::Abandoned));
    assert_eq!(abandoned.key.as_deref(), Some("L1"));

    assert_eq!(consumer.abandon().unwrap(), None);
}

#[tokio::test]
async fn replayed_item_is_a_duplicate_for_the_same_recipient() {
    let env = env();
    env.live("s1", &[Channel::Whatsapp]);
    env.ingest("s1", "L1", Some("+1")).await;
    // The queue line repeated, as after a crash between send and cursor write.
    let items: Vec<DispatchQueueItem> = env.harness.runtime.queue_records(Channel::Whatsapp).unwrap();
    env.harness
        .runtime
        .append_queue(Channel::Whatsapp, &items[0])
        .unwrap();

    let sender = MockSender::new(Channel::Whatsapp);
    let mut consumer = env.consumer(Channel::Whatsapp, Some(&sender), &DispatcherConfig::default());
    let report = consumer.tick().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(sender.sent_count(), 1);
    assert_eq!(consumer.offset(), 2);
}

#[tokio::test]
async fn malformed_line_is_logged_and_skipped() {
    let env = env();
    env.live("s1", &[Channel::Whatsapp]);
    env.harness
        .runtime
        .append_queue(Channel::Whatsapp, &json!({"not": "an item"}))
        .unwrap();
    env.ingest("s1", "L1", Some("+1")).await;

    let sender = MockSender::new(Channel::Whatsapp);
    let mut consumer = env.consumer(Channel::Whatsapp, Some(&sender), &DispatcherConfig::default());
    let report = consumer.tick().await.unwrap();
    assert_eq!(report.invalid, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(env.log(Channel::Whatsapp)[0].outcome, DeliveryOutcome::Invalid);
}

#[tokio::test]
async fn cursor_survives_restart_and_never_rewinds() {
    let env = env();
    env.live("s1", &[Channel::Whatsapp]);
    env.ingest("s1", "L1", None).await;
    env.ingest("s1", "L2", None).await;

    let sender = MockSender::new(Channel::Whatsapp);
    let config = DispatcherConfig::default();
    let mut first = env.consumer(Channel::Whatsapp, Some(&sender), &config);
    first.tick().await.unwrap();
    assert_eq!(first.offset(), 2);
    drop(first);

    env.ingest("s1", "L3", Some("+3")).await;
    let mut second = env.consumer(Channel::Whatsapp, Some(&sender), &config);
    assert_eq!(second.offset(), 2);
    second.tick().await.unwrap();
    assert_eq!(second.offset(), 3);
    assert_eq!(env.harness.runtime.cursor(Channel::Whatsapp).unwrap().offset(), 3);
    assert_eq!(sender.sent_count(), 1);
}

#[tokio::test]
async fn dispatcher_runs_channels_independently() {
    let env = env();
    env.live("s1", &[Channel::Whatsapp, Channel::Email]);
    env.ingest("s1", "L1", Some("+1")).await;

    let whatsapp = MockSender::new(Channel::Whatsapp);
    let email = MockSender::new(Channel::Email);
    email.fail_next(1);
    let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
    senders.insert(Channel::Whatsapp, Arc::new(whatsapp.clone()));
    senders.insert(Channel::Email, Arc::new(email.clone()));

    let dispatcher = Dispatcher::new(
        env.harness.runtime.clone(),
        env.harness.slots.clone(),
        senders,
        &DispatcherConfig::default(),
        Arc::new(env.harness.clock.clone()),
    )
    .unwrap();

    let reports = dispatcher.tick_all().await;
    assert_eq!(reports[&Channel::Whatsapp].as_ref().unwrap().sent, 1);
    // No address on the event, so email blocks before it ever reaches the sender.
    assert_eq!(reports[&Channel::Email].as_ref().unwrap().blocked, 1);
    assert_eq!(email.attempts(), 0);

    let status = dispatcher.status().await.unwrap();
    let whatsapp_status = status.iter().find(|s| s.channel == Channel::Whatsapp).unwrap();
    assert_eq!(whatsapp_status.cursor, 1);
    assert_eq!(whatsapp_status.pending, 0);
    assert!(whatsapp_status.webhook_configured);
    let slack = status.iter().find(|s| s.channel == Channel::Slack).unwrap();
    assert_eq!(slack.queue_len, 0);
    assert!(!slack.webhook_configured);

    assert_eq!(dispatcher.abandon(Channel::Telegram).await.unwrap(), None);
}
