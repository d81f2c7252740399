// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use engyne_core::EngyneError;
use serde::Serialize;

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// [`EngyneError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub EngyneError);

impl From<EngyneError> for ApiError {
    fn from(err: EngyneError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngyneError::InvalidSlotId(_) | EngyneError::Malformed(_) => StatusCode::BAD_REQUEST,
            EngyneError::Unauthorized => StatusCode::UNAUTHORIZED,
            EngyneError::SlotNotFound(_) | EngyneError::SessionNotFound => StatusCode::NOT_FOUND,
            EngyneError::SessionOccupied { .. } => StatusCode::CONFLICT,
            EngyneError::InvalidPolicy { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let issues = match &self.0 {
            EngyneError::InvalidPolicy { issues } => issues.iter().map(ToString::to_string).collect(),
            _ => Vec::new(),
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            issues,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
