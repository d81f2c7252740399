// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote login session arbiter.
//!
//! At most one human-recovery session exists per node. All reads and writes
//! of the session record go through one async mutex, so two concurrent
//! `start` calls cannot both mint a token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use engyne_config::model::RemoteLoginConfig;
use engyne_core::{Clock, EngyneError, SlotId, StopReason};
use engyne_storage::RuntimeStore;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::supervisor::Supervisor;

const TOKEN_BYTES: usize = 24;
/// TTLs beyond a day are clamped.
const MAX_TTL_SECS: u64 = 86_400;

/// Pauses and resumes slots on behalf of the arbiter.
#[async_trait]
pub trait SlotController: Send + Sync + 'static {
    /// Stop the slot with `reason`, setting `manual_stop`.
    async fn pause_for(&self, slot: &SlotId, reason: StopReason) -> Result<(), EngyneError>;

    /// Clear `manual_stop` if the slot is still stopped for `reason`.
    async fn resume_from(&self, slot: &SlotId, reason: StopReason) -> Result<bool, EngyneError>;
}

#[async_trait]
impl SlotController for Supervisor {
    async fn pause_for(&self, slot: &SlotId, reason: StopReason) -> Result<(), EngyneError> {
        self.force_stop(slot, reason).await.map(|_| ())
    }

    async fn resume_from(&self, slot: &SlotId, reason: StopReason) -> Result<bool, EngyneError> {
        self.release(slot, reason).await
    }
}

/// Persisted session record (`remote_login.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLoginSession {
    pub token: String,
    pub slot_id: SlotId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub vnc_host: String,
    pub vnc_port: u16,
}

impl RemoteLoginSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A session plus the connection details handed to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    #[serde(flatten)]
    pub session: RemoteLoginSession,
    pub url: String,
}

pub struct RemoteLoginArbiter {
    store: RuntimeStore,
    controller: Arc<dyn SlotController>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    vnc_host: String,
    vnc_port: u16,
    public_base_url: String,
    lock: Mutex<()>,
}

impl RemoteLoginArbiter {
    pub fn new(
        store: RuntimeStore,
        controller: Arc<dyn SlotController>,
        clock: Arc<dyn Clock>,
        config: &RemoteLoginConfig,
    ) -> Self {
        Self {
            store,
            controller,
            clock,
            ttl: chrono::Duration::seconds(config.ttl_secs.min(MAX_TTL_SECS) as i64),
            vnc_host: config.vnc_host.clone(),
            vnc_port: config.vnc_port,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            lock: Mutex::new(()),
        }
    }

    /// Grant a session for `slot`, or return the one it already holds.
    ///
    /// Fails with [`EngyneError::SessionOccupied`] while another slot holds
    /// an unexpired session. The slot is force-stopped before the token is
    /// minted.
    pub async fn start(&self, slot: &SlotId) -> Result<SessionInfo, EngyneError> {
        let _guard = self.lock.lock().await;
        if let Some(active) = self.current().await? {
            if &active.slot_id == slot {
                return Ok(self.info(active));
            }
            return Err(EngyneError::SessionOccupied {
                slot_id: active.slot_id.to_string(),
            });
        }

        self.controller.pause_for(slot, StopReason::RemoteLogin).await?;
        let now = self.clock.now();
        let session = RemoteLoginSession {
            token: mint_token(),
            slot_id: slot.clone(),
            created_at: now,
            expires_at: now + self.ttl,
            vnc_host: self.vnc_host.clone(),
            vnc_port: self.vnc_port,
        };
        self.store.write_session(&session)?;
        info!(slot = %slot, expires_at = %session.expires_at, "remote login session started");
        Ok(self.info(session))
    }

    /// End the session identified by `token` and release its slot.
    pub async fn stop(&self, token: &str) -> Result<SessionInfo, EngyneError> {
        let _guard = self.lock.lock().await;
        let session = self
            .current()
            .await?
            .filter(|s| s.token == token)
            .ok_or(EngyneError::SessionNotFound)?;
        self.end(&session, "stopped").await?;
        Ok(self.info(session))
    }

    /// The session holding `token`. Unknown and expired tokens are
    /// [`EngyneError::SessionNotFound`].
    pub async fn lookup(&self, token: &str) -> Result<SessionInfo, EngyneError> {
        let _guard = self.lock.lock().await;
        self.current()
            .await?
            .filter(|s| s.token == token)
            .map(|s| self.info(s))
            .ok_or(EngyneError::SessionNotFound)
    }

    /// The active session, if any. Expired sessions are cleared on read.
    pub async fn active(&self) -> Result<Option<SessionInfo>, EngyneError> {
        let _guard = self.lock.lock().await;
        Ok(self.current().await?.map(|s| self.info(s)))
    }

    /// Expire the session if its TTL has passed.
    pub async fn sweep(&self) -> Result<(), EngyneError> {
        let _guard = self.lock.lock().await;
        self.current().await.map(|_| ())
    }

    /// Sweep every `interval` until cancelled.
    pub async fn run_sweeper(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "remote login sweep failed");
                    }
                }
            }
        }
    }

    /// Caller holds `lock`.
    async fn current(&self) -> Result<Option<RemoteLoginSession>, EngyneError> {
        let Some(session) = self.store.read_session::<RemoteLoginSession>() else {
            return Ok(None);
        };
        if session.is_expired(self.clock.now()) {
            self.end(&session, "expired").await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn end(&self, session: &RemoteLoginSession, how: &str) -> Result<(), EngyneError> {
        self.store.clear_session()?;
        let released = self
            .controller
            .resume_from(&session.slot_id, StopReason::RemoteLogin)
            .await?;
        info!(slot = %session.slot_id, how, released, "remote login session ended");
        Ok(())
    }

    fn info(&self, session: RemoteLoginSession) -> SessionInfo {
        SessionInfo {
            url: format!("{}/remote-login/{}", self.public_base_url, session.token),
            session,
        }
    }
}

fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
