// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator bearer-token middleware.
//!
//! When no token is configured, every operator request is rejected
//! (fail-closed). Worker submissions on `/events/verified` carry their own
//! shared secret and do not pass through here.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

#[derive(Clone)]
pub struct AuthConfig {
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = auth.bearer_token.as_deref().filter(|t| !t.is_empty()) else {
        tracing::error!("gateway has no bearer token configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => {
            tracing::debug!(path = %request.uri().path(), "bearer auth rejected");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
