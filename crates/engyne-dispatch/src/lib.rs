// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Verified event ingestion and outbound dispatch for Engyne.
//!
//! [`VerifiedPipeline`] turns each accepted event into one queue item per
//! enabled channel, exactly once per idempotency key. [`Dispatcher`] drains
//! the per-channel queues with at-least-once delivery: channels run in
//! parallel, items within a channel strictly in order.

pub mod channel;
pub mod dispatcher;
pub mod limits;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod sender;

pub use channel::{ChannelDispatcher, ChannelStatus, DispatchSettings, HoldReason, TickReport};
pub use dispatcher::Dispatcher;
pub use limits::{ContactState, RateState};
pub use pipeline::{IngestAck, IngestStatus, VerifiedPipeline};
pub use record::{
    BlockReason, DeliveryLogEntry, DeliveryOutcome, DispatchQueueItem, DispatchStatus, LedgerEntry,
};
pub use render::render_message;
pub use sender::{CHANNEL_SECRET_HEADER, WebhookSender, senders_from_config};
