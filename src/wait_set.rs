// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Wait sets: aggregated readiness over a set of member objects.
//!
//! A wait set registers itself as a *persistent* awakable on every member,
//! so it observes each state change and keeps a live "triggered" list of
//! members whose watched signals are satisfied, can never be satisfied, or
//! whose object went away. Waiting drains nothing: entries stay triggered
//! until their state regresses or they are removed.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::awakable::{Awakable, AwakeReason};
use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherType, EntrypointClass};
use crate::options::WaitSetAddOptions;
use crate::result::{Error, Result};
use crate::rights::HandleRights;
use crate::signals::{HandleSignals, SignalsState};
use crate::time::Deadline;

/// Default rights on a wait set handle. Wait sets cannot be transferred.
pub(crate) const DEFAULT_WAIT_SET_RIGHTS: HandleRights = HandleRights::READ
    .union(HandleRights::WRITE)
    .union(HandleRights::GET_OPTIONS)
    .union(HandleRights::SET_OPTIONS);

/// One triggered member reported by a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSetResult {
    /// The caller-chosen identifier of the member.
    pub cookie: u64,
    /// `Ok` when the watched signals are satisfied, `FailedPrecondition`
    /// when they can never be, `Cancelled` when the member was closed.
    pub result: Result,
    /// The member's last observed state (empty when cancelled).
    pub signals_state: SignalsState,
}

struct WaitSetEntry {
    /// Cleared when the member reports cancellation.
    dispatcher: Option<Arc<dyn Dispatcher>>,
    signals: HandleSignals,
    signals_state: SignalsState,
    /// Registration on the member completed; until then the entry is
    /// invisible to removal.
    ready: bool,
    being_removed: bool,
    triggered: bool,
}

#[derive(Default)]
struct WaitSetState {
    closed: bool,
    entries: HashMap<u64, WaitSetEntry>,
    /// Cookies currently triggered, oldest first.
    triggered: Vec<u64>,
}

impl WaitSetState {
    fn set_triggered(&mut self, cookie: u64, triggered: bool) -> bool {
        let entry = self.entries.get_mut(&cookie).expect("entry exists");
        if entry.triggered == triggered {
            return false;
        }
        entry.triggered = triggered;
        if triggered {
            self.triggered.push(cookie);
        } else {
            self.triggered.retain(|&c| c != cookie);
        }
        triggered
    }
}

/// Dispatcher for a wait set.
pub struct WaitSetDispatcher {
    weak_self: Weak<WaitSetDispatcher>,
    max_entries: usize,
    state: Mutex<WaitSetState>,
    condvar: Condvar,
}

impl WaitSetDispatcher {
    pub(crate) fn create(config: &Config) -> Arc<dyn Dispatcher> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            max_entries: config.max_wait_set_num_entries,
            state: Mutex::new(WaitSetState::default()),
            condvar: Condvar::new(),
        })
    }

    fn self_awakable(&self) -> Arc<dyn Awakable> {
        self.weak_self
            .upgrade()
            .expect("wait set invoked after its last reference dropped")
    }
}

impl Dispatcher for WaitSetDispatcher {
    fn dispatcher_type(&self) -> DispatcherType {
        DispatcherType::WaitSet
    }

    fn supports_entrypoint_class(&self, class: EntrypointClass) -> bool {
        matches!(class, EntrypointClass::None | EntrypointClass::WaitSet)
    }

    fn close(&self) -> Result {
        let entries = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::InvalidArgument);
            }
            state.closed = true;
            state.triggered.clear();
            self.condvar.notify_all();
            std::mem::take(&mut state.entries)
        };

        // Deregister from members outside our lock; a member may be calling
        // `awake` concurrently, which sees `closed` and backs off.
        let self_awakable = self.self_awakable();
        for (cookie, entry) in entries {
            if let Some(dispatcher) = entry.dispatcher {
                dispatcher.remove_awakable(true, &self_awakable, cookie);
            }
        }
        Ok(())
    }

    fn wait_set_add(
        &self,
        member: Arc<dyn Dispatcher>,
        signals: HandleSignals,
        cookie: u64,
        options: Option<&WaitSetAddOptions>,
    ) -> Result {
        WaitSetAddOptions::validate(options)?;
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::InvalidArgument);
            }
            if state.entries.contains_key(&cookie) {
                return Err(Error::AlreadyExists);
            }
            if state.entries.len() >= self.max_entries {
                return Err(Error::ResourceExhausted);
            }
            state.entries.insert(
                cookie,
                WaitSetEntry {
                    dispatcher: Some(Arc::clone(&member)),
                    signals,
                    signals_state: SignalsState::empty(),
                    ready: false,
                    being_removed: false,
                    triggered: false,
                },
            );
        }

        // Register on the member outside our lock. The persistent
        // registration always sticks unless the member is already closed;
        // its initialization wake records the starting state.
        let outcome = member.add_awakable(self.self_awakable(), cookie, true, signals);

        let mut state = self.state.lock();
        if state.closed {
            // Close raced us and never saw this entry.
            drop(state);
            member.remove_awakable(true, &self.self_awakable(), cookie);
            return Err(Error::InvalidArgument);
        }
        if matches!(outcome, crate::dispatcher::AddAwakableResult::Closed) {
            state.entries.remove(&cookie);
            return Err(Error::InvalidArgument);
        }
        state
            .entries
            .get_mut(&cookie)
            .expect("entry present until add completes")
            .ready = true;
        Ok(())
    }

    fn wait_set_remove(&self, cookie: u64) -> Result {
        let dispatcher = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::InvalidArgument);
            }
            let Some(entry) = state.entries.get_mut(&cookie) else {
                return Err(Error::NotFound);
            };
            // An entry whose add has not finished, or which another thread
            // is already removing, does not exist as far as callers know.
            if !entry.ready || entry.being_removed {
                return Err(Error::NotFound);
            }
            entry.being_removed = true;
            entry.dispatcher.clone()
        };

        if let Some(dispatcher) = dispatcher {
            dispatcher.remove_awakable(true, &self.self_awakable(), cookie);
        }

        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.set_triggered(cookie, false);
        state.entries.remove(&cookie);
        Ok(())
    }

    fn wait_set_wait(
        &self,
        deadline: Deadline,
        results: &mut [WaitSetResult],
        num_results: &mut u32,
        max_results: Option<&mut u32>,
    ) -> Result {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::InvalidArgument);
        }

        let capacity = (*num_results as usize).min(results.len());

        match deadline.as_duration() {
            None => {
                while !state.closed && state.triggered.is_empty() {
                    self.condvar.wait(&mut state);
                }
            }
            Some(duration) => {
                if state.triggered.is_empty() && !state.closed {
                    if deadline.is_zero() {
                        return Err(Error::DeadlineExceeded);
                    }
                    let until = Instant::now() + duration;
                    while !state.closed && state.triggered.is_empty() {
                        if self.condvar.wait_until(&mut state, until).timed_out()
                            && state.triggered.is_empty()
                            && !state.closed
                        {
                            return Err(Error::DeadlineExceeded);
                        }
                    }
                }
            }
        }
        if state.closed {
            return Err(Error::Cancelled);
        }
        debug_assert!(!state.triggered.is_empty());

        let filled = capacity.min(state.triggered.len());
        for (slot, &cookie) in results.iter_mut().zip(state.triggered.iter()).take(filled) {
            let entry = &state.entries[&cookie];
            *slot = match &entry.dispatcher {
                None => WaitSetResult {
                    cookie,
                    result: Err(Error::Cancelled),
                    signals_state: SignalsState::empty(),
                },
                Some(_) if entry.signals_state.satisfies(entry.signals) => WaitSetResult {
                    cookie,
                    result: Ok(()),
                    signals_state: entry.signals_state,
                },
                Some(_) => WaitSetResult {
                    cookie,
                    result: Err(Error::FailedPrecondition),
                    signals_state: entry.signals_state,
                },
            };
        }
        *num_results = filled as u32;
        if let Some(max_results) = max_results {
            *max_results = state.triggered.len() as u32;
        }
        Ok(())
    }
}

impl Awakable for WaitSetDispatcher {
    fn awake(&self, cookie: u64, reason: AwakeReason, signals_state: SignalsState) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            // Mid-close: the member still had us registered.
            return false;
        }
        let want_triggered = {
            let Some(entry) = state.entries.get_mut(&cookie) else {
                return false;
            };
            if entry.being_removed {
                return true;
            }
            match reason {
                AwakeReason::Cancelled => {
                    entry.dispatcher = None;
                    Some(true)
                }
                AwakeReason::Initialize | AwakeReason::Changed => {
                    entry.signals_state = signals_state;
                    let watched = entry.signals;
                    Some(
                        signals_state.satisfies(watched)
                            || !signals_state.can_satisfy(watched),
                    )
                }
                AwakeReason::Satisfied | AwakeReason::Unsatisfiable => {
                    debug_assert!(false, "persistent registration got a one-shot reason");
                    None
                }
            }
        };
        if let Some(triggered) = want_triggered {
            if state.set_triggered(cookie, triggered) {
                self.condvar.notify_all();
            }
        }
        !matches!(reason, AwakeReason::Cancelled)
    }
}
