// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The blocking one-shot awakable behind synchronous waits.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::awakable::{Awakable, AwakeReason};
use crate::signals::SignalsState;
use crate::time::Deadline;

/// How a [`Waiter::wait`] call completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Some dispatcher called [`Awakable::awake`]; the first call wins.
    Awoken {
        context: u64,
        reason: AwakeReason,
        state: SignalsState,
    },
    /// The deadline passed first. The waiter stays armed; a late wake is
    /// recorded but only observed after the next `init`/`wait` cycle.
    TimedOut,
}

#[derive(Default)]
struct WaiterState {
    armed: bool,
    wake: Option<(u64, AwakeReason, SignalsState)>,
}

/// A single-use blocking awakable.
///
/// Lifecycle: `init` arms the slot, dispatchers deliver at most one
/// effective `awake`, and `wait` parks the calling thread until that wake or
/// the deadline. The waiter may be reused after another `init`. The internal
/// mutex is a leaf lock: nothing else is acquired while it is held.
pub struct Waiter {
    state: Mutex<WaiterState>,
    condvar: Condvar,
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WaiterState::default()),
            condvar: Condvar::new(),
        }
    }

    /// Arms the waiter, clearing any recorded wake.
    pub fn init(&self) {
        let mut state = self.state.lock();
        state.armed = true;
        state.wake = None;
    }

    /// Parks until the first wake or the deadline.
    ///
    /// Must follow `init`. A zero deadline only inspects the slot. The
    /// remaining time is recomputed after every wakeup, so early returns
    /// from the condition variable cannot shorten the wait.
    pub fn wait(&self, deadline: Deadline) -> WaitOutcome {
        let mut state = self.state.lock();

        debug_assert!(state.armed, "wait() without init()");
        state.armed = false;

        if let Some((context, reason, signals)) = state.wake {
            return WaitOutcome::Awoken {
                context,
                reason,
                state: signals,
            };
        }

        match deadline.as_duration() {
            None => {
                while state.wake.is_none() {
                    self.condvar.wait(&mut state);
                }
            }
            Some(duration) => {
                if deadline.is_zero() {
                    return WaitOutcome::TimedOut;
                }
                let until = Instant::now() + duration;
                while state.wake.is_none() {
                    if self.condvar.wait_until(&mut state, until).timed_out()
                        && state.wake.is_none()
                    {
                        return WaitOutcome::TimedOut;
                    }
                }
            }
        }

        let (context, reason, signals) = state.wake.expect("loop exits only with a wake");
        WaitOutcome::Awoken {
            context,
            reason,
            state: signals,
        }
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Awakable for Waiter {
    fn awake(&self, context: u64, reason: AwakeReason, signals: SignalsState) -> bool {
        let mut state = self.state.lock();
        if state.wake.is_none() {
            state.wake = Some((context, reason, signals));
            self.condvar.notify_one();
        }
        // One-shot: never keep the registration after a wake.
        false
    }
}
