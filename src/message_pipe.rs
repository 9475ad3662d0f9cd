// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bidirectional message pipes.
//!
//! A pipe is one shared [`MessagePipe`] object holding both endpoint queues,
//! jointly owned by the two endpoint dispatchers. Endpoint dispatchers are
//! thin: a pipe reference and a port number. Closing or transferring an
//! endpoint mutates the shared object, which is how `PEER_CLOSED` propagates
//! without a strong-reference cycle between the two sides.

use std::collections::VecDeque;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::awakable::{Awakable, AwakableList};
use crate::dispatcher::{
    AddAwakableResult, Dispatcher, DispatcherType, EntrypointClass, HandleTransport, Lifecycle,
};
use crate::handle::Handle;
use crate::result::{Error, Result};
use crate::rights::HandleRights;
use crate::signals::{HandleSignals, SignalsState};

bitflags! {
    /// Flags for writing a message. None are currently defined.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WriteMessageFlags: u32 {}
}

bitflags! {
    /// Flags for reading a message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ReadMessageFlags: u32 {
        /// If the next message does not fit the supplied buffers, drop it
        /// instead of failing with `ResourceExhausted`.
        const MAY_DISCARD = 1 << 0;
    }
}

/// Default rights on a freshly created endpoint handle.
pub(crate) const DEFAULT_MESSAGE_PIPE_RIGHTS: HandleRights = HandleRights::TRANSFER
    .union(HandleRights::READ)
    .union(HandleRights::WRITE)
    .union(HandleRights::GET_OPTIONS)
    .union(HandleRights::SET_OPTIONS);

/// One queued message: a byte payload plus the handles travelling with it.
pub(crate) struct Message {
    pub(crate) bytes: Vec<u8>,
    pub(crate) handles: Vec<Handle>,
}

struct Endpoint {
    queue: VecDeque<Message>,
    peer_open: bool,
    awakables: AwakableList,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            peer_open: true,
            awakables: AwakableList::new(),
        }
    }

    fn signals_state(&self) -> SignalsState {
        let mut satisfied = HandleSignals::empty();
        let mut satisfiable = HandleSignals::PEER_CLOSED;
        if !self.queue.is_empty() {
            satisfied |= HandleSignals::READABLE;
            satisfiable |= HandleSignals::READABLE;
        }
        if self.peer_open {
            satisfied |= HandleSignals::WRITABLE;
            satisfiable |= HandleSignals::READABLE | HandleSignals::WRITABLE;
        } else {
            satisfied |= HandleSignals::PEER_CLOSED;
        }
        SignalsState::new(satisfied, satisfiable)
    }
}

/// Shared state of one pipe: two endpoint slots behind a single lock.
pub struct MessagePipe {
    endpoints: Mutex<[Option<Endpoint>; 2]>,
}

fn peer_port(port: usize) -> usize {
    1 - port
}

impl MessagePipe {
    /// Creates a pipe and its two endpoint dispatchers.
    pub fn create_pair() -> (Arc<dyn Dispatcher>, Arc<dyn Dispatcher>) {
        let pipe = Arc::new(MessagePipe {
            endpoints: Mutex::new([Some(Endpoint::new()), Some(Endpoint::new())]),
        });
        (
            MessagePipeDispatcher::new(Arc::clone(&pipe), 0),
            MessagePipeDispatcher::new(pipe, 1),
        )
    }

    /// Closes one port: cancels its awakables, tells the peer, and reports
    /// the dispatchers of unread queued handles so the caller can close them
    /// outside this pipe's lock.
    fn close(&self, port: usize) -> Vec<Handle> {
        let mut orphans = Vec::new();
        {
            let mut endpoints = self.endpoints.lock();
            let Some(mut endpoint) = endpoints[port].take() else {
                return orphans;
            };
            endpoint.awakables.cancel_and_remove_all();
            for message in endpoint.queue.drain(..) {
                orphans.extend(message.handles);
            }

            if let Some(peer) = endpoints[peer_port(port)].as_mut() {
                let old = peer.signals_state();
                peer.peer_open = false;
                let new = peer.signals_state();
                if new != old {
                    peer.awakables.on_state_change(old, new);
                }
            }
        }
        orphans
    }

    /// Enqueues a message onto `port`'s queue (i.e. the write comes from the
    /// peer). Transports are converted to received handles here, atomically
    /// with the enqueue, so a racing reader can never observe a handle whose
    /// transfer might still be rolled back.
    fn enqueue(&self, port: usize, bytes: &[u8], transports: &[HandleTransport]) -> Result {
        let mut endpoints = self.endpoints.lock();
        let Some(endpoint) = endpoints[port].as_mut() else {
            return Err(Error::FailedPrecondition);
        };

        let handles = transports
            .iter()
            .map(HandleTransport::equivalent_handle)
            .collect();

        let old = endpoint.signals_state();
        endpoint.queue.push_back(Message {
            bytes: bytes.to_vec(),
            handles,
        });
        let new = endpoint.signals_state();
        if new != old {
            endpoint.awakables.on_state_change(old, new);
        }
        Ok(())
    }

    /// Dequeues from `port`'s own queue. Returns handles that must be closed
    /// by the caller (from a discarded unread message) alongside the result.
    #[allow(clippy::too_many_arguments)]
    fn read(
        &self,
        port: usize,
        bytes: Option<&mut [u8]>,
        num_bytes: Option<&mut u32>,
        handles_out: &mut Vec<Handle>,
        max_handles: u32,
        num_handles: Option<&mut u32>,
        may_discard: bool,
    ) -> (Result, Vec<Handle>) {
        let mut endpoints = self.endpoints.lock();
        let Some(endpoint) = endpoints[port].as_mut() else {
            return (Err(Error::InvalidArgument), Vec::new());
        };

        let Some(message) = endpoint.queue.front_mut() else {
            let result = if endpoint.peer_open {
                Err(Error::ShouldWait)
            } else {
                Err(Error::FailedPrecondition)
            };
            return (result, Vec::new());
        };

        let mut enough_space = true;

        if let Some(num_bytes) = num_bytes {
            *num_bytes = message.bytes.len() as u32;
        }
        match bytes {
            Some(buffer) if buffer.len() >= message.bytes.len() => {
                buffer[..message.bytes.len()].copy_from_slice(&message.bytes);
            }
            Some(_) => enough_space = false,
            None if message.bytes.is_empty() => {}
            None => enough_space = false,
        }

        if let Some(num_handles) = num_handles {
            *num_handles = message.handles.len() as u32;
        }
        if enough_space && !message.handles.is_empty() {
            if message.handles.len() as u32 <= max_handles {
                handles_out.append(&mut message.handles);
            } else {
                enough_space = false;
            }
        }

        let mut to_close = Vec::new();
        if enough_space || may_discard {
            let old = endpoint.signals_state();
            let message = endpoint.queue.pop_front().expect("front was present");
            // An unread message dropped under MAY_DISCARD may still carry
            // handles; they die with it.
            to_close = message.handles;
            let new = endpoint.signals_state();
            if new != old {
                endpoint.awakables.on_state_change(old, new);
            }
        }

        let result = if enough_space {
            Ok(())
        } else {
            Err(Error::ResourceExhausted)
        };
        (result, to_close)
    }

    fn signals_state(&self, port: usize) -> SignalsState {
        let endpoints = self.endpoints.lock();
        endpoints[port]
            .as_ref()
            .map(Endpoint::signals_state)
            .unwrap_or_default()
    }

    fn add_awakable(
        &self,
        port: usize,
        awakable: Arc<dyn Awakable>,
        context: u64,
        persistent: bool,
        signals: HandleSignals,
    ) -> AddAwakableResult {
        let mut endpoints = self.endpoints.lock();
        let Some(endpoint) = endpoints[port].as_mut() else {
            return AddAwakableResult::Closed;
        };

        let state = endpoint.signals_state();
        if state.satisfies(signals) {
            if persistent {
                endpoint
                    .awakables
                    .add(awakable, context, persistent, signals, state);
            }
            AddAwakableResult::AlreadySatisfied(state)
        } else if !state.can_satisfy(signals) {
            if persistent {
                endpoint
                    .awakables
                    .add(awakable, context, persistent, signals, state);
            }
            AddAwakableResult::NeverSatisfiable(state)
        } else {
            endpoint
                .awakables
                .add(awakable, context, persistent, signals, state);
            AddAwakableResult::Added(state)
        }
    }

    fn remove_awakable(
        &self,
        port: usize,
        match_context: bool,
        awakable: &Arc<dyn Awakable>,
        context: u64,
    ) -> SignalsState {
        let mut endpoints = self.endpoints.lock();
        let Some(endpoint) = endpoints[port].as_mut() else {
            return SignalsState::empty();
        };
        endpoint.awakables.remove(match_context, awakable, context);
        endpoint.signals_state()
    }

    fn cancel_awakables(&self, port: usize) {
        let mut endpoints = self.endpoints.lock();
        if let Some(endpoint) = endpoints[port].as_mut() {
            endpoint.awakables.cancel_and_remove_all();
        }
    }
}

/// One endpoint of a message pipe.
pub struct MessagePipeDispatcher {
    pipe: Arc<MessagePipe>,
    port: usize,
    lifecycle: Mutex<Lifecycle>,
}

impl MessagePipeDispatcher {
    fn new(pipe: Arc<MessagePipe>, port: usize) -> Arc<dyn Dispatcher> {
        debug_assert!(port < 2);
        Arc::new(Self {
            pipe,
            port,
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    fn check_open(&self) -> Result {
        self.lifecycle.lock().check_open()
    }
}

impl Dispatcher for MessagePipeDispatcher {
    fn dispatcher_type(&self) -> DispatcherType {
        DispatcherType::MessagePipe
    }

    fn supports_entrypoint_class(&self, class: EntrypointClass) -> bool {
        matches!(class, EntrypointClass::None | EntrypointClass::MessagePipe)
    }

    fn close(&self) -> Result {
        self.lifecycle.lock().close()?;
        let orphans = self.pipe.close(self.port);
        for handle in orphans {
            let _ = handle.dispatcher().close();
        }
        Ok(())
    }

    fn signals_state(&self) -> SignalsState {
        if self.check_open().is_err() {
            return SignalsState::empty();
        }
        self.pipe.signals_state(self.port)
    }

    fn add_awakable(
        &self,
        awakable: Arc<dyn Awakable>,
        context: u64,
        persistent: bool,
        signals: HandleSignals,
    ) -> AddAwakableResult {
        if self.check_open().is_err() {
            return AddAwakableResult::Closed;
        }
        self.pipe
            .add_awakable(self.port, awakable, context, persistent, signals)
    }

    fn remove_awakable(
        &self,
        match_context: bool,
        awakable: &Arc<dyn Awakable>,
        context: u64,
    ) -> SignalsState {
        self.pipe
            .remove_awakable(self.port, match_context, awakable, context)
    }

    fn begin_transit(&self) -> Result {
        self.lifecycle.lock().begin_transit()?;
        // Outstanding waits through the departing handle cannot travel.
        self.pipe.cancel_awakables(self.port);
        Ok(())
    }

    fn end_transit(&self) -> Arc<dyn Dispatcher> {
        self.lifecycle.lock().end_transit();
        MessagePipeDispatcher::new(Arc::clone(&self.pipe), self.port)
    }

    fn cancel_transit(&self) {
        self.lifecycle.lock().cancel_transit();
    }

    fn write_message(&self, bytes: &[u8], transports: &[HandleTransport]) -> Result {
        self.check_open()?;
        // Deliver to the peer's queue.
        self.pipe
            .enqueue(peer_port(self.port), bytes, transports)
    }

    fn read_message(
        &self,
        bytes: Option<&mut [u8]>,
        num_bytes: Option<&mut u32>,
        handles: &mut Vec<Handle>,
        max_handles: u32,
        num_handles: Option<&mut u32>,
        may_discard: bool,
    ) -> Result {
        self.check_open()?;
        let (result, to_close) = self.pipe.read(
            self.port,
            bytes,
            num_bytes,
            handles,
            max_handles,
            num_handles,
            may_discard,
        );
        for handle in to_close {
            let _ = handle.dispatcher().close();
        }
        result
    }
}
