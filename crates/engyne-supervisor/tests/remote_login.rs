// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use engyne_core::{EngyneError, SlotId, SlotPolicy, StopReason};
use engyne_supervisor::{RemoteLoginArbiter, Supervisor};
use engyne_test_utils::{MockLauncher, RecordingAlerts, TestHarness};

struct Env {
    harness: TestHarness,
    launcher: MockLauncher,
    supervisor: Arc<Supervisor>,
    arbiter: RemoteLoginArbiter,
}

fn env() -> Env {
    let harness = TestHarness::new().unwrap();
    let launcher = MockLauncher::new();
    let supervisor = Arc::new(Supervisor::new(
        harness.slots.clone(),
        Arc::new(launcher.clone()),
        Arc::new(RecordingAlerts::new()),
        Arc::new(harness.clock.clone()),
        &harness.config.supervisor,
    ));
    let arbiter = RemoteLoginArbiter::new(
        harness.runtime.clone(),
        supervisor.clone(),
        Arc::new(harness.clock.clone()),
        &harness.config.remote_login,
    );
    Env {
        harness,
        launcher,
        supervisor,
        arbiter,
    }
}

impl Env {
    fn slot(&self, id: &str) -> SlotId {
        self.harness.provision(id, SlotPolicy::default()).unwrap()
    }
}

#[tokio::test]
async fn start_force_stops_the_slot_and_is_idempotent() {
    let env = env();
    let slot = env.slot("s1");
    env.supervisor.tick().await.unwrap();
    let run = env.launcher.runs_for("s1")[0].clone();

    let first = env.arbiter.start(&slot).await.unwrap();
    env.supervisor.settle().await;
    assert!(env.launcher.has_exited(&run));
    let control = env.harness.slots.read_control(&slot);
    assert!(control.manual_stop);
    assert_eq!(control.stop_reason, Some(StopReason::RemoteLogin));

    assert_eq!(
        first.url,
        format!("http://127.0.0.1:8001/remote-login/{}", first.session.token)
    );
    assert_eq!(first.session.vnc_port, 5900);
    assert_eq!(
        first.session.expires_at - first.session.created_at,
        chrono::Duration::seconds(900)
    );

    let again = env.arbiter.start(&slot).await.unwrap();
    assert_eq!(again, first);
}

#[tokio::test]
async fn concurrent_starts_for_one_slot_share_a_token() {
    let env = env();
    let slot = env.slot("s1");
    let (a, b) = tokio::join!(env.arbiter.start(&slot), env.arbiter.start(&slot));
    assert_eq!(a.unwrap().session.token, b.unwrap().session.token);
}

#[tokio::test]
async fn second_slot_is_rejected_while_occupied() {
    let env = env();
    let s1 = env.slot("s1");
    let s2 = env.slot("s2");
    env.arbiter.start(&s1).await.unwrap();

    let err = env.arbiter.start(&s2).await.unwrap_err();
    assert!(matches!(err, EngyneError::SessionOccupied { ref slot_id } if slot_id == "s1"));
    assert!(!env.harness.slots.read_control(&s2).manual_stop);
}

#[tokio::test]
async fn stop_releases_the_slot() {
    let env = env();
    let slot = env.slot("s1");
    let session = env.arbiter.start(&slot).await.unwrap();

    assert!(matches!(
        env.arbiter.stop("not-a-token").await,
        Err(EngyneError::SessionNotFound)
    ));

    env.arbiter.stop(&session.session.token).await.unwrap();
    assert!(env.arbiter.active().await.unwrap().is_none());
    let control = env.harness.slots.read_control(&slot);
    assert!(!control.manual_stop);
    assert_eq!(control.stop_reason, None);

    env.supervisor.tick().await.unwrap();
    assert_eq!(env.launcher.launch_count(), 1);
}

#[tokio::test]
async fn expiry_clears_the_session_and_releases() {
    let env = env();
    let s1 = env.slot("s1");
    let s2 = env.slot("s2");
    env.arbiter.start(&s1).await.unwrap();

    env.harness.clock.advance_secs(901);
    env.arbiter.sweep().await.unwrap();
    assert!(env.arbiter.active().await.unwrap().is_none());
    assert!(!env.harness.slots.read_control(&s1).manual_stop);

    // The next slot can now take the session.
    env.arbiter.start(&s2).await.unwrap();
}

#[tokio::test]
async fn operator_stop_survives_session_end() {
    let env = env();
    let slot = env.slot("s1");
    env.supervisor.stop(&slot).await.unwrap();

    let session = env.arbiter.start(&slot).await.unwrap();
    env.arbiter.stop(&session.session.token).await.unwrap();

    let control = env.harness.slots.read_control(&slot);
    assert!(control.manual_stop);
    assert_eq!(control.stop_reason, Some(StopReason::Manual));
}

#[tokio::test]
async fn unknown_slot_gets_no_session() {
    let env = env();
    let ghost = SlotId::parse("ghost").unwrap();
    assert!(matches!(
        env.arbiter.start(&ghost).await,
        Err(EngyneError::SlotNotFound(_))
    ));
    assert!(env.harness.runtime.read_session::<serde_json::Value>().is_none());
}
