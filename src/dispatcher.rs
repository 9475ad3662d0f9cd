// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The capability trait implemented by every object kind.
//!
//! A [`Dispatcher`] carries the behavior of one IPC object instance. The
//! trait exposes every operation of every kind; an operation a kind does not
//! implement fails with [`Error::Unimplemented`] through the provided
//! default. [`Core`](crate::Core) resolves handle values to
//! `Arc<dyn Dispatcher>` and forwards, so a rights-holder can always *call*
//! any operation; the dispatcher decides whether it means anything.

use std::fmt;
use std::sync::Arc;

use crate::awakable::Awakable;
use crate::handle::Handle;
use crate::options::{DuplicateBufferHandleOptions, WaitSetAddOptions};
use crate::result::{Error, Result};
use crate::rights::HandleRights;
use crate::shared_buffer::{BufferInformation, BufferMapping, MapBufferFlags};
use crate::signals::{HandleSignals, SignalsState};
use crate::time::Deadline;
use crate::wait_set::WaitSetResult;

/// The kind of object behind a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatcherType {
    MessagePipe,
    DataPipeProducer,
    DataPipeConsumer,
    SharedBuffer,
    WaitSet,
}

/// Groups of operations, one per object kind.
///
/// Consulted only after a rights check fails, to decide between
/// `PermissionDenied` (the kind implements the operation group, the handle
/// just lacks the right) and `InvalidArgument` (the kind does not implement
/// it at all, so the API does not reveal anything about rights).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntrypointClass {
    /// Operations every kind supports (close, wait, duplicate).
    None,
    MessagePipe,
    DataPipeProducer,
    DataPipeConsumer,
    Buffer,
    WaitSet,
}

/// Outcome of [`Dispatcher::add_awakable`].
///
/// Except for `Closed`, each variant carries the signal state observed at
/// registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddAwakableResult {
    /// The awakable is registered and will be woken on a state change.
    Added(SignalsState),
    /// The watched signals are already satisfied. One-shot awakables are
    /// not registered; persistent ones are.
    AlreadySatisfied(SignalsState),
    /// The watched signals can never be satisfied. One-shot awakables are
    /// not registered; persistent ones are.
    NeverSatisfiable(SignalsState),
    /// The dispatcher is closed.
    Closed,
}

/// A handle reserved for transfer: the dispatcher plus the rights it will
/// carry on the receiving side.
///
/// Produced by the handle table when it marks entries busy; consumed by the
/// carrying message pipe, which converts each transport into a fresh
/// [`Handle`] at enqueue time via [`Dispatcher::end_transit`].
#[derive(Clone)]
pub struct HandleTransport {
    dispatcher: Arc<dyn Dispatcher>,
    rights: HandleRights,
}

impl HandleTransport {
    pub(crate) fn new(dispatcher: Arc<dyn Dispatcher>, rights: HandleRights) -> Self {
        Self { dispatcher, rights }
    }

    pub(crate) fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Commits the transfer: the original dispatcher is closed and its
    /// equivalent replacement is wrapped in a handle carrying the
    /// transported rights. Called exactly once, on the enqueue path.
    pub(crate) fn equivalent_handle(&self) -> Handle {
        Handle::new(self.dispatcher.end_transit(), self.rights)
    }
}

/// Closed/in-transit bookkeeping shared by dispatcher implementations.
///
/// Owners wrap this in their own mutex. The two flags are mutually
/// exclusive: a reservation ends in either `end_transit` (which closes) or
/// `cancel_transit` (which does not).
#[derive(Default)]
pub(crate) struct Lifecycle {
    closed: bool,
    in_transit: bool,
}

impl Lifecycle {
    pub(crate) fn check_open(&self) -> Result {
        if self.closed {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    pub(crate) fn close(&mut self) -> Result {
        self.check_open()?;
        self.closed = true;
        Ok(())
    }

    pub(crate) fn begin_transit(&mut self) -> Result {
        self.check_open()?;
        if self.in_transit {
            return Err(Error::Busy);
        }
        self.in_transit = true;
        Ok(())
    }

    pub(crate) fn end_transit(&mut self) {
        debug_assert!(self.in_transit && !self.closed);
        self.in_transit = false;
        self.closed = true;
    }

    pub(crate) fn cancel_transit(&mut self) {
        debug_assert!(self.in_transit);
        self.in_transit = false;
    }
}

/// Behavior of one IPC object instance.
///
/// All methods are thread-safe; implementations serialize their state behind
/// an internal lock, which ranks below the handle and mapping table locks.
/// Awakables registered here are woken while that internal lock is held.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatcher_type(&self) -> DispatcherType;

    /// Whether this kind implements the given operation group. Every kind
    /// reports `true` for [`EntrypointClass::None`].
    fn supports_entrypoint_class(&self, class: EntrypointClass) -> bool;

    /// Closes the object: cancels registered awakables, releases internal
    /// resources, and propagates peer-visible effects. Fails with
    /// `InvalidArgument` if already closed.
    fn close(&self) -> Result;

    /// Current signal snapshot. Kinds with no observable readiness report
    /// an empty state (nothing satisfiable).
    fn signals_state(&self) -> SignalsState {
        SignalsState::empty()
    }

    /// Registers `awakable` to be woken when any of `signals` becomes
    /// satisfied, or can never be satisfied again, or the object closes.
    ///
    /// One-shot awakables (`persistent == false`) are registered only when
    /// the outcome is [`AddAwakableResult::Added`]; persistent awakables are
    /// registered in every non-`Closed` outcome and receive an
    /// initialization wake during the call.
    fn add_awakable(
        &self,
        awakable: Arc<dyn Awakable>,
        context: u64,
        persistent: bool,
        signals: HandleSignals,
    ) -> AddAwakableResult {
        let _ = (awakable, context, persistent, signals);
        AddAwakableResult::NeverSatisfiable(self.signals_state())
    }

    /// Drops registrations of `awakable` (and `context`, when
    /// `match_context` is set) and reports the current state. Removing an
    /// awakable that was never added, or was already auto-removed, is fine.
    fn remove_awakable(
        &self,
        match_context: bool,
        awakable: &Arc<dyn Awakable>,
        context: u64,
    ) -> SignalsState {
        let _ = (match_context, awakable, context);
        self.signals_state()
    }

    // ── Duplication ─────────────────────────────────────────────────

    /// Produces a dispatcher equivalent to this one for a duplicated
    /// handle. Kinds that support duplication either bump a shared backing
    /// or mint a sibling instance.
    fn duplicate_dispatcher(&self) -> Result<Arc<dyn Dispatcher>> {
        Err(Error::Unimplemented)
    }

    // ── Transit ─────────────────────────────────────────────────────

    /// Reserves this dispatcher for transfer over a message pipe.
    ///
    /// Fails with `Busy` when a conflicting reservation exists and
    /// `InvalidArgument` for kinds that cannot be transferred. A successful
    /// reservation ends with exactly one of [`end_transit`](Self::end_transit)
    /// or [`cancel_transit`](Self::cancel_transit).
    fn begin_transit(&self) -> Result {
        Err(Error::InvalidArgument)
    }

    /// Commits a reservation made by `begin_transit`: tears down state that
    /// cannot travel (awakables, two-phase grants), closes this dispatcher,
    /// and returns the equivalent replacement the receiver will own.
    fn end_transit(&self) -> Arc<dyn Dispatcher> {
        unreachable!("end_transit without a transit reservation")
    }

    /// Releases a reservation made by `begin_transit`, leaving the object
    /// usable through the original handle.
    fn cancel_transit(&self) {
        unreachable!("cancel_transit without a transit reservation")
    }

    // ── Message pipes ───────────────────────────────────────────────

    /// Writes one message. `transports` carries the handles attached to the
    /// message; on success each has been converted into a received handle,
    /// on failure none has.
    fn write_message(&self, bytes: &[u8], transports: &[HandleTransport]) -> Result {
        let _ = (bytes, transports);
        Err(Error::Unimplemented)
    }

    /// Reads (or peeks at the size of) the next queued message.
    ///
    /// `bytes` is the caller's buffer; its length bounds the copy.
    /// `num_bytes`/`num_handles` report the message's actual sizes. A
    /// message too large for either buffer fails with `ResourceExhausted`
    /// and stays queued, unless `may_discard` drops it.
    fn read_message(
        &self,
        bytes: Option<&mut [u8]>,
        num_bytes: Option<&mut u32>,
        handles: &mut Vec<Handle>,
        max_handles: u32,
        num_handles: Option<&mut u32>,
        may_discard: bool,
    ) -> Result {
        let _ = (bytes, num_bytes, handles, max_handles, num_handles, may_discard);
        Err(Error::Unimplemented)
    }

    // ── Data pipe producer ──────────────────────────────────────────

    /// Sets the write threshold in bytes (0 means one element).
    fn set_producer_options(&self, write_threshold_num_bytes: u32) -> Result {
        let _ = write_threshold_num_bytes;
        Err(Error::Unimplemented)
    }

    fn producer_options(&self) -> Result<u32> {
        Err(Error::Unimplemented)
    }

    /// Writes up to `elements.len()` bytes, returning the count written.
    fn write_data(&self, elements: &[u8], all_or_none: bool) -> Result<u32> {
        let _ = (elements, all_or_none);
        Err(Error::Unimplemented)
    }

    /// Starts a two-phase write, returning a region of the pipe's own
    /// buffer. The region stays valid until the matching
    /// [`end_write_data`](Self::end_write_data) or the teardown of the
    /// producer side.
    fn begin_write_data(&self) -> Result<(*mut u8, u32)> {
        Err(Error::Unimplemented)
    }

    fn end_write_data(&self, num_bytes_written: u32) -> Result {
        let _ = num_bytes_written;
        Err(Error::Unimplemented)
    }

    // ── Data pipe consumer ──────────────────────────────────────────

    /// Sets the read threshold in bytes (0 means one element).
    fn set_consumer_options(&self, read_threshold_num_bytes: u32) -> Result {
        let _ = read_threshold_num_bytes;
        Err(Error::Unimplemented)
    }

    fn consumer_options(&self) -> Result<u32> {
        Err(Error::Unimplemented)
    }

    /// Reads, peeks, discards, or queries buffered data depending on
    /// `flags`; `num_bytes` is the requested count in and the affected
    /// count out.
    fn read_data(
        &self,
        elements: Option<&mut [u8]>,
        num_bytes: &mut u32,
        flags: crate::data_pipe::ReadDataFlags,
    ) -> Result {
        let _ = (elements, num_bytes, flags);
        Err(Error::Unimplemented)
    }

    /// Starts a two-phase read, returning a readable region of buffered
    /// data.
    fn begin_read_data(&self) -> Result<(*const u8, u32)> {
        Err(Error::Unimplemented)
    }

    fn end_read_data(&self, num_bytes_read: u32) -> Result {
        let _ = num_bytes_read;
        Err(Error::Unimplemented)
    }

    // ── Shared buffers ──────────────────────────────────────────────

    /// Duplicates the buffer, returning the new dispatcher and the rights
    /// the duplicate must lose (per the validated options).
    fn duplicate_buffer_handle(
        &self,
        options: Option<&DuplicateBufferHandleOptions>,
    ) -> Result<(Arc<dyn Dispatcher>, HandleRights)> {
        let _ = options;
        Err(Error::Unimplemented)
    }

    fn buffer_information(&self) -> Result<BufferInformation> {
        Err(Error::Unimplemented)
    }

    /// Maps `num_bytes` of the buffer starting at `offset`.
    fn map_buffer(&self, offset: u64, num_bytes: u64, flags: MapBufferFlags) -> Result<BufferMapping> {
        let _ = (offset, num_bytes, flags);
        Err(Error::Unimplemented)
    }

    // ── Wait sets ───────────────────────────────────────────────────

    fn wait_set_add(
        &self,
        member: Arc<dyn Dispatcher>,
        signals: HandleSignals,
        cookie: u64,
        options: Option<&WaitSetAddOptions>,
    ) -> Result {
        let _ = (member, signals, cookie, options);
        Err(Error::Unimplemented)
    }

    fn wait_set_remove(&self, cookie: u64) -> Result {
        let _ = cookie;
        Err(Error::Unimplemented)
    }

    /// Blocks until a member triggers or `deadline` passes; fills `results`
    /// with up to its length of triggered members and reports the total
    /// triggered count through `max_results`.
    fn wait_set_wait(
        &self,
        deadline: Deadline,
        results: &mut [WaitSetResult],
        num_results: &mut u32,
        max_results: Option<&mut u32>,
    ) -> Result {
        let _ = (deadline, results, num_results, max_results);
        Err(Error::Unimplemented)
    }
}

impl fmt::Debug for dyn Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dispatcher({:?})", self.dispatcher_type())
    }
}
