// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed persistence for the Engyne control plane.
//!
//! Snapshots are written with an atomic temp-file-then-rename so readers
//! never observe a partial document. Logs are append-only JSON lines.
//! Readers are lock-free and tolerate stale snapshots.

pub mod atomic;
pub mod runtime_fs;
pub mod slot_fs;

pub use atomic::{
    append_jsonl, read_json, read_jsonl, read_lines, write_atomic, write_json_atomic,
};
pub use runtime_fs::{ChannelCursor, QueueLine, RuntimeStore};
pub use slot_fs::{ControlState, SlotStore, TraceAction, TraceEntry, WorkerState};
