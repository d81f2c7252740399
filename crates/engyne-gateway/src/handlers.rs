// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health, metrics, ingestion, remote-login and dispatch handlers.

use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use engyne_core::{Channel, EngyneError, SlotId, VerifiedEvent, WORKER_SECRET_HEADER};
use engyne_dispatch::{ChannelStatus, IngestAck, IngestStatus};
use engyne_supervisor::SessionInfo;
use serde::Serialize;

use crate::error::ApiResult;
use crate::server::GatewayState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        node_id: state.health.node_id.clone(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
///
/// Prometheus text format, or 404 when the exporter is disabled.
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// POST /events/verified
///
/// The worker secret is checked before the body is looked at, so an
/// unauthenticated request is always a 401.
pub async fn post_verified_event(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Result<Json<VerifiedEvent>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<IngestAck>)> {
    let credential = headers
        .get(WORKER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    state.pipeline.authorize(credential)?;
    let Json(event) = body.map_err(|e| EngyneError::Malformed(e.body_text()))?;

    let ack = state.pipeline.ingest(&event, credential).await?;
    let status = match ack.status {
        IngestStatus::Accepted => StatusCode::ACCEPTED,
        IngestStatus::Duplicate => StatusCode::OK,
    };
    Ok((status, Json(ack)))
}

/// POST /slots/{id}/remote-login/start
pub async fn post_remote_login_start(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionInfo>> {
    let slot = SlotId::parse(&id)?;
    Ok(Json(state.arbiter.start(&slot).await?))
}

#[derive(Debug, Serialize)]
pub struct RemoteLoginStopResponse {
    pub status: &'static str,
    pub slot_id: SlotId,
}

/// POST /remote-login/{token}/stop
pub async fn post_remote_login_stop(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
) -> ApiResult<Json<RemoteLoginStopResponse>> {
    let ended = state.arbiter.stop(&token).await?;
    Ok(Json(RemoteLoginStopResponse {
        status: "stopped",
        slot_id: ended.session.slot_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct ActiveSessionResponse {
    pub active: Option<SessionInfo>,
}

/// GET /remote-login
pub async fn get_remote_login(
    State(state): State<GatewayState>,
) -> ApiResult<Json<ActiveSessionResponse>> {
    Ok(Json(ActiveSessionResponse {
        active: state.arbiter.active().await?,
    }))
}

/// GET /remote-login/{token}
///
/// Connection details for the holder of a session link.
pub async fn get_remote_login_session(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
) -> ApiResult<Json<SessionInfo>> {
    Ok(Json(state.arbiter.lookup(&token).await?))
}

/// GET /dispatch
pub async fn get_dispatch(State(state): State<GatewayState>) -> ApiResult<Json<Vec<ChannelStatus>>> {
    Ok(Json(state.dispatcher.status().await?))
}

#[derive(Debug, Serialize)]
pub struct AbandonResponse {
    pub channel: Channel,
    /// Queue line that was abandoned, `null` when the queue was drained.
    pub abandoned_line: Option<u64>,
}

/// POST /dispatch/{channel}/abandon
pub async fn post_dispatch_abandon(
    State(state): State<GatewayState>,
    Path(channel): Path<String>,
) -> ApiResult<Json<AbandonResponse>> {
    let channel = Channel::from_str(&channel)
        .map_err(|_| EngyneError::Malformed(format!("unknown channel `{channel}`")))?;
    let abandoned_line = state.dispatcher.abandon(channel).await?;
    Ok(Json(AbandonResponse {
        channel,
        abandoned_line,
    }))
}
