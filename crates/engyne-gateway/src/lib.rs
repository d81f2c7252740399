// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP control surface for Engyne.
//!
//! Operators manage slots, policies, remote-login sessions and dispatch
//! queues through bearer-authenticated routes; workers submit verified
//! events with their shared secret.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod slots;

pub use auth::AuthConfig;
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use server::{GatewayState, HealthState, ServerConfig, router, start_server};
