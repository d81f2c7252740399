// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slot listing, provisioning, control, policy update, and preview.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use engyne_core::{EngyneError, SlotId, SlotPolicy};
use engyne_quality::{PreviewReport, preview};
use engyne_supervisor::SlotSnapshot;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::server::GatewayState;

const DEFAULT_PREVIEW_SAMPLE: usize = 50;
const MAX_PREVIEW_SAMPLE: usize = 500;

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, EngyneError> {
    body.map(|Json(v)| v)
        .map_err(|e| EngyneError::Malformed(e.body_text()))
}

/// GET /slots
pub async fn list_slots(State(state): State<GatewayState>) -> ApiResult<Json<Vec<SlotSnapshot>>> {
    Ok(Json(state.supervisor.list().await?))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSlotRequest {
    pub slot_id: String,
    #[serde(default)]
    pub policy: Option<SlotPolicy>,
}

/// POST /slots
pub async fn create_slot(
    State(state): State<GatewayState>,
    body: Result<Json<CreateSlotRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SlotSnapshot>)> {
    let request = json_body(body)?;
    let slot = SlotId::parse(&request.slot_id)?;
    let policy = request.policy.unwrap_or_default();
    state.supervisor.store().create(&slot, &policy)?;
    tracing::info!(slot = %slot, "slot provisioned");
    Ok((StatusCode::CREATED, Json(state.supervisor.snapshot(&slot).await?)))
}

/// GET /slots/{id}
pub async fn get_slot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SlotSnapshot>> {
    let slot = SlotId::parse(&id)?;
    Ok(Json(state.supervisor.snapshot(&slot).await?))
}

/// POST /slots/{id}/start
pub async fn start_slot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SlotSnapshot>> {
    let slot = SlotId::parse(&id)?;
    Ok(Json(state.supervisor.start(&slot).await?))
}

/// POST /slots/{id}/stop
pub async fn stop_slot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SlotSnapshot>> {
    let slot = SlotId::parse(&id)?;
    Ok(Json(state.supervisor.stop(&slot).await?))
}

/// POST /slots/{id}/restart
pub async fn restart_slot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SlotSnapshot>> {
    let slot = SlotId::parse(&id)?;
    Ok(Json(state.supervisor.restart(&slot).await?))
}

/// PUT /slots/{id}/policy
///
/// Validates the whole document and replaces it atomically. The running
/// worker picks it up on its next cycle.
pub async fn put_policy(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Result<Json<SlotPolicy>, JsonRejection>,
) -> ApiResult<Json<SlotPolicy>> {
    let slot = SlotId::parse(&id)?;
    let policy = json_body(body)?;
    state.supervisor.store().write_policy(&slot, &policy)?;
    tracing::info!(slot = %slot, version = ?policy.version, "slot policy updated");
    Ok(Json(policy))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreviewRequest {
    pub policy: SlotPolicy,
    #[serde(default = "default_sample")]
    pub sample: usize,
}

fn default_sample() -> usize {
    DEFAULT_PREVIEW_SAMPLE
}

/// POST /slots/{id}/preview
///
/// Scores the slot's most recent observed events against a draft policy.
/// Nothing is persisted.
pub async fn preview_policy(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Result<Json<PreviewRequest>, JsonRejection>,
) -> ApiResult<Json<PreviewReport>> {
    let slot = SlotId::parse(&id)?;
    let request = json_body(body)?;
    request.policy.ensure_valid()?;
    let store = state.supervisor.store();
    if !store.exists(&slot) {
        return Err(EngyneError::SlotNotFound(slot.to_string()).into());
    }
    let events = store.recent_leads(&slot, request.sample.min(MAX_PREVIEW_SAMPLE))?;
    Ok(Json(preview(&request.policy, &events)))
}
