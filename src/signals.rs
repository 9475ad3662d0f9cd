// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Readiness signals and their observed state.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Observable readiness conditions of an object. Each object kind
    /// recognizes a subset; waiting on a signal an object can never raise
    /// fails immediately.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HandleSignals: u32 {
        /// There is something to read.
        const READABLE = 1 << 0;
        /// A write can make progress.
        const WRITABLE = 1 << 1;
        /// The peer endpoint is gone.
        const PEER_CLOSED = 1 << 2;
        /// At least the configured read threshold is buffered.
        const READ_THRESHOLD = 1 << 3;
        /// At least the configured write threshold is free.
        const WRITE_THRESHOLD = 1 << 4;
    }
}

impl fmt::Display for HandleSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Snapshot of an object's signal state.
///
/// Invariant: `satisfied` is a subset of `satisfiable`. A signal leaves
/// `satisfiable` once the object can never raise it again (for example
/// `READABLE` on a drained pipe whose peer is closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalsState {
    /// Signals currently satisfied.
    pub satisfied: HandleSignals,
    /// Signals that could still become satisfied.
    pub satisfiable: HandleSignals,
}

impl SignalsState {
    /// A state with nothing satisfied and nothing satisfiable.
    pub fn empty() -> Self {
        Self {
            satisfied: HandleSignals::empty(),
            satisfiable: HandleSignals::empty(),
        }
    }

    pub fn new(satisfied: HandleSignals, satisfiable: HandleSignals) -> Self {
        debug_assert!(satisfiable.contains(satisfied));
        Self {
            satisfied,
            satisfiable,
        }
    }

    /// True if any of `signals` is currently satisfied.
    pub fn satisfies(&self, signals: HandleSignals) -> bool {
        self.satisfied.intersects(signals)
    }

    /// True if any of `signals` could still become satisfied.
    pub fn can_satisfy(&self, signals: HandleSignals) -> bool {
        self.satisfiable.intersects(signals)
    }
}

impl Default for SignalsState {
    fn default() -> Self {
        Self::empty()
    }
}
