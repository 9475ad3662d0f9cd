// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The one-shot notification interface dispatchers use to wake waiters.

use std::sync::Arc;

use crate::result::{Error, Result};
use crate::signals::{HandleSignals, SignalsState};

/// Why an awakable is being woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwakeReason {
    /// The object was closed; the awakable will not be invoked again by this
    /// source. Delivered to both one-shot and persistent awakables.
    Cancelled,
    /// A watched signal became satisfied. Terminal for one-shot awakables.
    Satisfied,
    /// The watched signals can never be satisfied. Terminal for one-shot
    /// awakables.
    Unsatisfiable,
    /// First report of the current state, delivered to a persistent awakable
    /// during registration.
    Initialize,
    /// The state changed. Delivered to persistent awakables only.
    Changed,
}

impl AwakeReason {
    /// Status equivalent of a terminal wake reason.
    pub(crate) fn to_result(self) -> Result {
        match self {
            Self::Satisfied => Ok(()),
            Self::Unsatisfiable => Err(Error::FailedPrecondition),
            Self::Cancelled => Err(Error::Cancelled),
            // Non-terminal reasons have no status equivalent.
            Self::Initialize | Self::Changed => {
                debug_assert!(false, "no result for {self:?}");
                Err(Error::Unknown)
            }
        }
    }
}

/// A notification receiver attached to a dispatcher.
///
/// `awake` may be invoked from any thread, while the notifying dispatcher
/// holds its own lock. Implementations must not block and must not call back
/// into any [`Core`](crate::Core) operation. Returning `false` asks the
/// dispatcher to drop this registration.
pub trait Awakable: Send + Sync {
    fn awake(&self, context: u64, reason: AwakeReason, state: SignalsState) -> bool;
}

/// Identity comparison for registered awakables.
fn same_awakable(a: &Arc<dyn Awakable>, b: &Arc<dyn Awakable>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

struct AwakeEntry {
    awakable: Arc<dyn Awakable>,
    context: u64,
    persistent: bool,
    signals: HandleSignals,
}

/// The set of awakables watching one object.
///
/// Not internally synchronized; the owning dispatcher guards it with its own
/// lock, which is also the lock held while `awake` runs.
#[derive(Default)]
pub(crate) struct AwakableList {
    entries: Vec<AwakeEntry>,
}

impl AwakableList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers an awakable.
    ///
    /// One-shot awakables are woken later, by `on_state_change` or
    /// `cancel_and_remove_all`. A persistent awakable is additionally woken
    /// here with [`AwakeReason::Initialize`] and the current state.
    pub(crate) fn add(
        &mut self,
        awakable: Arc<dyn Awakable>,
        context: u64,
        persistent: bool,
        signals: HandleSignals,
        current_state: SignalsState,
    ) {
        if persistent {
            awakable.awake(context, AwakeReason::Initialize, current_state);
        }
        self.entries.push(AwakeEntry {
            awakable,
            context,
            persistent,
            signals,
        });
    }

    /// Delivers wakes after the owner's state moved from `_old` to `new`.
    ///
    /// One-shot entries fire once their watched signals are satisfied or can
    /// never be satisfied, and are dropped. Persistent entries observe every
    /// change and stay until they return `false` or are cancelled.
    pub(crate) fn on_state_change(&mut self, _old: SignalsState, new: SignalsState) {
        self.entries.retain(|entry| {
            if entry.persistent {
                return entry
                    .awakable
                    .awake(entry.context, AwakeReason::Changed, new);
            }
            if new.satisfies(entry.signals) {
                entry
                    .awakable
                    .awake(entry.context, AwakeReason::Satisfied, new);
                false
            } else if !new.can_satisfy(entry.signals) {
                entry
                    .awakable
                    .awake(entry.context, AwakeReason::Unsatisfiable, new);
                false
            } else {
                true
            }
        });
    }

    /// Wakes everything with [`AwakeReason::Cancelled`] and clears the list.
    pub(crate) fn cancel_and_remove_all(&mut self) {
        for entry in self.entries.drain(..) {
            entry
                .awakable
                .awake(entry.context, AwakeReason::Cancelled, SignalsState::empty());
        }
    }

    /// Removes every registration of `awakable` (matching `context` too when
    /// `match_context` is set). Removing an awakable that is not present is
    /// a no-op.
    pub(crate) fn remove(
        &mut self,
        match_context: bool,
        awakable: &Arc<dyn Awakable>,
        context: u64,
    ) {
        self.entries.retain(|entry| {
            !(same_awakable(&entry.awakable, awakable)
                && (!match_context || entry.context == context))
        });
    }
}
