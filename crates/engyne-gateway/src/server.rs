// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post, put},
};
use engyne_config::model::GatewayConfig;
use engyne_core::EngyneError;
use engyne_dispatch::{Dispatcher, VerifiedPipeline};
use engyne_supervisor::{RemoteLoginArbiter, Supervisor};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::{handlers, slots};

const MAX_BODY_BYTES: usize = 256 * 1024;

/// Health state for the unauthenticated endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: std::time::Instant,
    pub node_id: String,
    /// Prometheus render function; `/metrics` is 404 without one.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub supervisor: Arc<Supervisor>,
    pub arbiter: Arc<RemoteLoginArbiter>,
    pub pipeline: Arc<VerifiedPipeline>,
    pub dispatcher: Arc<Dispatcher>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl From<&GatewayConfig> for ServerConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// All routes.
///
/// - `/health`, `/metrics`: public
/// - `GET /remote-login/{token}`: the token is the credential
/// - `POST /events/verified`: worker secret header
/// - everything else: operator bearer token
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .route("/remote-login/{token}", get(handlers::get_remote_login_session))
        .with_state(state.clone());

    let worker_routes = Router::new()
        .route("/events/verified", post(handlers::post_verified_event))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/slots", get(slots::list_slots).post(slots::create_slot))
        .route("/slots/{id}", get(slots::get_slot))
        .route("/slots/{id}/start", post(slots::start_slot))
        .route("/slots/{id}/stop", post(slots::stop_slot))
        .route("/slots/{id}/restart", post(slots::restart_slot))
        .route("/slots/{id}/policy", put(slots::put_policy))
        .route("/slots/{id}/preview", post(slots::preview_policy))
        .route(
            "/slots/{id}/remote-login/start",
            post(handlers::post_remote_login_start),
        )
        .route("/remote-login", get(handlers::get_remote_login))
        .route(
            "/remote-login/{token}/stop",
            post(handlers::post_remote_login_stop),
        )
        .route("/dispatch", get(handlers::get_dispatch))
        .route(
            "/dispatch/{channel}/abandon",
            post(handlers::post_dispatch_abandon),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(worker_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `cancel` fires, then drain in-flight requests.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), EngyneError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| EngyneError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| EngyneError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
