// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phase state machine and process exit codes.

use engyne_core::{EngyneError, Phase};

/// Clean stop after a stop signal.
pub const EXIT_OK: i32 = 0;
/// Run ended in `ERROR`.
pub const EXIT_ERROR: i32 = 1;
/// Bad command line.
pub const EXIT_USAGE: i32 = 2;

/// Whether a worker may move from `from` to `to`.
pub fn transition_allowed(from: Phase, to: Phase) -> bool {
    use Phase::*;
    match (from, to) {
        (Stopping | Error | Stopped, _) => false,
        (_, Stopping | Error) => true,
        (Boot, Init) => true,
        (Init, ParseLeads | Cooldown | LoginRequired) => true,
        (ParseLeads | Cooldown | LoginRequired, ParseLeads | Cooldown | LoginRequired) => true,
        _ => false,
    }
}

/// Tracks the current phase of one worker run.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: Phase,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self { phase: Phase::Boot }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transition(&mut self, to: Phase) -> Result<(), EngyneError> {
        if !transition_allowed(self.phase, to) {
            return Err(EngyneError::IllegalTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }
        self.phase = to;
        Ok(())
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}
