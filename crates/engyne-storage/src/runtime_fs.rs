// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared runtime state under `<runtime_root>`.
//!
//! ```text
//! <runtime_root>/
//!   verified.jsonl                 accepted verified events (ledger)
//!   remote_login.json              the single remote-login session
//!   dispatch/<ch>_queue.jsonl      channel queue, append-only
//!   dispatch/<ch>.offset           channel cursor (line index)
//!   dispatch/<ch>.log.jsonl        delivery outcomes
//!   dispatch/<ch>.contact_state.json
//!   dispatch/<ch>.rate.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use engyne_core::{Channel, EngyneError};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::atomic::{append_jsonl, read_json, read_jsonl, read_lines, write_atomic, write_json_atomic};

/// One raw queue line and its index (the cursor position it occupies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLine {
    pub index: u64,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeStore {
    root: PathBuf,
}

impl RuntimeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dispatch_file(&self, channel: Channel, suffix: &str) -> PathBuf {
        self.root.join("dispatch").join(format!("{channel}{suffix}"))
    }

    pub fn queue_path(&self, channel: Channel) -> PathBuf {
        self.dispatch_file(channel, "_queue.jsonl")
    }

    pub fn append_queue<T: Serialize>(&self, channel: Channel, item: &T) -> Result<(), EngyneError> {
        append_jsonl(&self.queue_path(channel), item)
    }

    /// Up to `limit` complete lines starting at line index `from`.
    pub fn read_queue(&self, channel: Channel, from: u64, limit: usize) -> Result<Vec<QueueLine>, EngyneError> {
        Ok(read_lines(&self.queue_path(channel))?
            .into_iter()
            .enumerate()
            .skip(usize::try_from(from).unwrap_or(usize::MAX))
            .take(limit)
            .map(|(index, raw)| QueueLine {
                index: index as u64,
                raw,
            })
            .collect())
    }

    pub fn queue_len(&self, channel: Channel) -> Result<u64, EngyneError> {
        Ok(read_lines(&self.queue_path(channel))?.len() as u64)
    }

    /// All parsable queue records, for recovery scans.
    pub fn queue_records<T: DeserializeOwned>(&self, channel: Channel) -> Result<Vec<T>, EngyneError> {
        read_jsonl(&self.queue_path(channel))
    }

    pub fn cursor(&self, channel: Channel) -> Result<ChannelCursor, EngyneError> {
        ChannelCursor::load(self.dispatch_file(channel, ".offset"), channel)
    }

    pub fn append_delivery_log<T: Serialize>(&self, channel: Channel, entry: &T) -> Result<(), EngyneError> {
        append_jsonl(&self.dispatch_file(channel, ".log.jsonl"), entry)
    }

    pub fn read_delivery_log<T: DeserializeOwned>(&self, channel: Channel) -> Result<Vec<T>, EngyneError> {
        read_jsonl(&self.dispatch_file(channel, ".log.jsonl"))
    }

    pub fn read_contact_state<T: DeserializeOwned + Default>(&self, channel: Channel) -> T {
        read_json(&self.dispatch_file(channel, ".contact_state.json")).unwrap_or_default()
    }

    pub fn write_contact_state<T: Serialize>(&self, channel: Channel, state: &T) -> Result<(), EngyneError> {
        write_json_atomic(&self.dispatch_file(channel, ".contact_state.json"), state)
    }

    pub fn read_rate_state<T: DeserializeOwned + Default>(&self, channel: Channel) -> T {
        read_json(&self.dispatch_file(channel, ".rate.json")).unwrap_or_default()
    }

    pub fn write_rate_state<T: Serialize>(&self, channel: Channel, state: &T) -> Result<(), EngyneError> {
        write_json_atomic(&self.dispatch_file(channel, ".rate.json"), state)
    }

    fn ledger_path(&self) -> PathBuf {
        self.root.join("verified.jsonl")
    }

    pub fn append_verified<T: Serialize>(&self, entry: &T) -> Result<(), EngyneError> {
        append_jsonl(&self.ledger_path(), entry)
    }

    pub fn read_verified<T: DeserializeOwned>(&self) -> Result<Vec<T>, EngyneError> {
        read_jsonl(&self.ledger_path())
    }

    fn session_path(&self) -> PathBuf {
        self.root.join("remote_login.json")
    }

    pub fn read_session<T: DeserializeOwned>(&self) -> Option<T> {
        read_json(&self.session_path())
    }

    pub fn write_session<T: Serialize>(&self, session: &T) -> Result<(), EngyneError> {
        write_json_atomic(&self.session_path(), session)
    }

    pub fn clear_session(&self) -> Result<(), EngyneError> {
        match fs::remove_file(self.session_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Durable, monotonic position of a channel consumer in its queue.
///
/// The offset is the index of the next unprocessed line. It is persisted
/// with an atomic replace before the in-memory value moves, so a crash can
/// only ever replay the current item, never skip or rewind.
#[derive(Debug)]
pub struct ChannelCursor {
    path: PathBuf,
    channel: Channel,
    offset: u64,
}

impl ChannelCursor {
    pub fn load(path: PathBuf, channel: Channel) -> Result<Self, EngyneError> {
        let offset = match fs::read_to_string(&path) {
            Ok(text) => text.trim().parse::<u64>().map_err(|e| {
                EngyneError::Internal(format!(
                    "corrupt cursor {}: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            channel,
            offset,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Move to `target`. Moving backwards is an error; staying put is a no-op.
    pub fn advance_to(&mut self, target: u64) -> Result<(), EngyneError> {
        if target < self.offset {
            return Err(EngyneError::CursorRegression {
                channel: self.channel.to_string(),
                current: self.offset,
                requested: target,
            });
        }
        if target == self.offset {
            return Ok(());
        }
        write_atomic(&self.path, format!("{target}\n").as_bytes())?;
        self.offset = target;
        Ok(())
    }

    /// Mark the current item handled.
    pub fn advance(&mut self) -> Result<(), EngyneError> {
        self.advance_to(self.offset + 1)
    }
}
