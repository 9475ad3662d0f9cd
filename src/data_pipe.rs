// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Unidirectional, element-oriented data pipes.
//!
//! One [`DataPipe`] object owns the ring buffer and both sides' state; the
//! producer and consumer dispatchers are thin references to it. All counts
//! the pipe accepts are multiples of the element size, so an element is
//! never split across an operation.
//!
//! Two-phase transfers hand out a raw region of the ring. The region stays
//! valid until the matching `end_*` call or the teardown of that side; the
//! grant is recorded in the shared state, and every other transfer on the
//! same side fails with `Busy` while it is outstanding.

use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::awakable::{Awakable, AwakableList};
use crate::dispatcher::{
    AddAwakableResult, Dispatcher, DispatcherType, EntrypointClass, Lifecycle,
};
use crate::options::DataPipeParams;
use crate::result::{Error, Result};
use crate::rights::HandleRights;
use crate::signals::{HandleSignals, SignalsState};

bitflags! {
    /// Flags for single-shot and two-phase writes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WriteDataFlags: u32 {
        /// Write all requested bytes or none of them.
        const ALL_OR_NONE = 1 << 0;
    }
}

bitflags! {
    /// Flags for single-shot and two-phase reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ReadDataFlags: u32 {
        /// Read all requested bytes or none of them.
        const ALL_OR_NONE = 1 << 0;
        /// Throw away the bytes instead of copying them out.
        const DISCARD = 1 << 1;
        /// Only report how many bytes are buffered.
        const QUERY = 1 << 2;
        /// Copy bytes out without consuming them.
        const PEEK = 1 << 3;
    }
}

/// Default rights on a producer handle.
pub(crate) const DEFAULT_PRODUCER_RIGHTS: HandleRights = HandleRights::TRANSFER
    .union(HandleRights::WRITE)
    .union(HandleRights::GET_OPTIONS)
    .union(HandleRights::SET_OPTIONS);

/// Default rights on a consumer handle.
pub(crate) const DEFAULT_CONSUMER_RIGHTS: HandleRights = HandleRights::TRANSFER
    .union(HandleRights::READ)
    .union(HandleRights::GET_OPTIONS)
    .union(HandleRights::SET_OPTIONS);

/// Fixed allocation backing the ring. The pointer never moves, so regions
/// handed out by two-phase operations stay valid for the pipe's lifetime.
struct RingStorage {
    ptr: *mut u8,
    capacity: usize,
}

unsafe impl Send for RingStorage {}
unsafe impl Sync for RingStorage {}

impl RingStorage {
    fn allocate(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        let boxed = vec![0u8; capacity].into_boxed_slice();
        Self {
            ptr: Box::into_raw(boxed) as *mut u8,
            capacity,
        }
    }

    fn at(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.capacity);
        // Safety: index is within the allocation.
        unsafe { self.ptr.add(index) }
    }

    /// Copies `src` into the ring at `index`. Caller holds the pipe lock.
    fn copy_in(&self, index: usize, src: &[u8]) {
        debug_assert!(index + src.len() <= self.capacity);
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(index), src.len());
        }
    }

    /// Copies out of the ring at `index` into `dst`. Caller holds the pipe
    /// lock.
    fn copy_out(&self, index: usize, dst: &mut [u8]) {
        debug_assert!(index + dst.len() <= self.capacity);
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.add(index), dst.as_mut_ptr(), dst.len());
        }
    }
}

impl Drop for RingStorage {
    fn drop(&mut self) {
        unsafe {
            let _ = Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.ptr, self.capacity));
        }
    }
}

struct PipeState {
    start_index: usize,
    current_num_bytes: usize,
    producer_open: bool,
    consumer_open: bool,
    /// Requested thresholds; 0 selects the default of one element.
    write_threshold_num_bytes: usize,
    read_threshold_num_bytes: usize,
    /// Outstanding two-phase grant sizes; 0 means no grant.
    producer_two_phase_max: usize,
    consumer_two_phase_max: usize,
    producer_awakables: AwakableList,
    consumer_awakables: AwakableList,
}

impl PipeState {
    fn in_two_phase_write(&self) -> bool {
        self.producer_two_phase_max > 0
    }

    fn in_two_phase_read(&self) -> bool {
        self.consumer_two_phase_max > 0
    }
}

/// Shared state of one data pipe.
pub struct DataPipe {
    element_num_bytes: usize,
    capacity_num_bytes: usize,
    ring: RingStorage,
    state: Mutex<PipeState>,
}

impl DataPipe {
    /// Creates a pipe and its producer and consumer dispatchers.
    pub(crate) fn create(params: DataPipeParams) -> (Arc<dyn Dispatcher>, Arc<dyn Dispatcher>) {
        debug_assert!(params.element_num_bytes > 0);
        debug_assert!(params.capacity_num_bytes % params.element_num_bytes == 0);
        let pipe = Arc::new(DataPipe {
            element_num_bytes: params.element_num_bytes,
            capacity_num_bytes: params.capacity_num_bytes,
            ring: RingStorage::allocate(params.capacity_num_bytes),
            state: Mutex::new(PipeState {
                start_index: 0,
                current_num_bytes: 0,
                producer_open: true,
                consumer_open: true,
                write_threshold_num_bytes: 0,
                read_threshold_num_bytes: 0,
                producer_two_phase_max: 0,
                consumer_two_phase_max: 0,
                producer_awakables: AwakableList::new(),
                consumer_awakables: AwakableList::new(),
            }),
        });
        (
            Arc::new(DataPipeProducerDispatcher {
                pipe: Arc::clone(&pipe),
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
            Arc::new(DataPipeConsumerDispatcher {
                pipe,
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        )
    }

    fn effective_write_threshold(&self, state: &PipeState) -> usize {
        if state.write_threshold_num_bytes == 0 {
            self.element_num_bytes
        } else {
            state.write_threshold_num_bytes
        }
    }

    fn effective_read_threshold(&self, state: &PipeState) -> usize {
        if state.read_threshold_num_bytes == 0 {
            self.element_num_bytes
        } else {
            state.read_threshold_num_bytes
        }
    }

    fn producer_state(&self, state: &PipeState) -> SignalsState {
        let mut satisfied = HandleSignals::empty();
        let mut satisfiable = HandleSignals::PEER_CLOSED;
        if state.consumer_open {
            if !state.in_two_phase_write() {
                let free = self.capacity_num_bytes - state.current_num_bytes;
                if free >= self.effective_write_threshold(state) {
                    satisfied |= HandleSignals::WRITABLE | HandleSignals::WRITE_THRESHOLD;
                } else if state.current_num_bytes < self.capacity_num_bytes {
                    satisfied |= HandleSignals::WRITABLE;
                }
            }
            satisfiable |= HandleSignals::WRITABLE | HandleSignals::WRITE_THRESHOLD;
        } else {
            satisfied |= HandleSignals::PEER_CLOSED;
        }
        SignalsState::new(satisfied, satisfiable)
    }

    fn consumer_state(&self, state: &PipeState) -> SignalsState {
        let mut satisfied = HandleSignals::empty();
        let mut satisfiable = HandleSignals::empty();
        if state.current_num_bytes >= self.effective_read_threshold(state) {
            if !state.in_two_phase_read() {
                satisfied |= HandleSignals::READABLE | HandleSignals::READ_THRESHOLD;
            }
            satisfiable |= HandleSignals::READABLE | HandleSignals::READ_THRESHOLD;
        } else if state.current_num_bytes > 0 {
            if !state.in_two_phase_read() {
                satisfied |= HandleSignals::READABLE;
            }
            satisfiable |= HandleSignals::READABLE;
        }
        if state.producer_open {
            satisfiable |= HandleSignals::READABLE
                | HandleSignals::PEER_CLOSED
                | HandleSignals::READ_THRESHOLD;
        } else {
            satisfied |= HandleSignals::PEER_CLOSED;
            satisfiable |= HandleSignals::PEER_CLOSED;
        }
        SignalsState::new(satisfied, satisfiable)
    }

    /// Runs `mutate` and wakes both sides' awakables for any state change.
    fn mutate_and_notify<R>(&self, state: &mut PipeState, mutate: impl FnOnce(&mut PipeState) -> R) -> R {
        let old_producer = self.producer_state(state);
        let old_consumer = self.consumer_state(state);
        let result = mutate(state);
        let new_producer = self.producer_state(state);
        let new_consumer = self.consumer_state(state);
        if new_producer != old_producer {
            state
                .producer_awakables
                .on_state_change(old_producer, new_producer);
        }
        if new_consumer != old_consumer {
            state
                .consumer_awakables
                .on_state_change(old_consumer, new_consumer);
        }
        result
    }

    fn consume(state: &mut PipeState, num_bytes: usize, capacity: usize) {
        debug_assert!(num_bytes <= state.current_num_bytes);
        state.start_index = (state.start_index + num_bytes) % capacity;
        state.current_num_bytes -= num_bytes;
        if state.current_num_bytes == 0 {
            state.start_index = 0;
        }
    }

    // ── Producer side ───────────────────────────────────────────────

    fn producer_close(&self) {
        let mut state = self.state.lock();
        state.producer_awakables.cancel_and_remove_all();
        self.mutate_and_notify(&mut state, |state| {
            state.producer_open = false;
            state.producer_two_phase_max = 0;
        });
    }

    /// Cancels producer-side waits and any outstanding two-phase write.
    /// Used when the producer handle is reserved for transfer.
    fn producer_cancel_all_state(&self) {
        let mut state = self.state.lock();
        state.producer_awakables.cancel_and_remove_all();
        self.mutate_and_notify(&mut state, |state| {
            state.producer_two_phase_max = 0;
        });
    }

    fn set_write_threshold(&self, threshold: u32) -> Result {
        let threshold = threshold as usize;
        if threshold % self.element_num_bytes != 0 || threshold > self.capacity_num_bytes {
            return Err(Error::InvalidArgument);
        }
        let mut state = self.state.lock();
        self.mutate_and_notify(&mut state, |state| {
            state.write_threshold_num_bytes = threshold;
        });
        Ok(())
    }

    fn write_threshold(&self) -> u32 {
        self.state.lock().write_threshold_num_bytes as u32
    }

    fn write(&self, elements: &[u8], all_or_none: bool) -> Result<u32> {
        let mut state = self.state.lock();
        if state.in_two_phase_write() {
            return Err(Error::Busy);
        }
        if !state.consumer_open {
            return Err(Error::FailedPrecondition);
        }
        if elements.len() % self.element_num_bytes != 0 {
            return Err(Error::InvalidArgument);
        }
        if elements.is_empty() {
            return Ok(0);
        }

        let free = self.capacity_num_bytes - state.current_num_bytes;
        if all_or_none && elements.len() > free {
            // There is no way to wait for a specific amount of room.
            return Err(Error::OutOfRange);
        }
        let num_bytes_to_write = elements.len().min(free);
        if num_bytes_to_write == 0 {
            return Err(Error::ShouldWait);
        }

        self.mutate_and_notify(&mut state, |state| {
            let write_index =
                (state.start_index + state.current_num_bytes) % self.capacity_num_bytes;
            let first = num_bytes_to_write.min(self.capacity_num_bytes - write_index);
            self.ring.copy_in(write_index, &elements[..first]);
            if first < num_bytes_to_write {
                self.ring.copy_in(0, &elements[first..num_bytes_to_write]);
            }
            state.current_num_bytes += num_bytes_to_write;
        });
        Ok(num_bytes_to_write as u32)
    }

    fn begin_write(&self) -> Result<(*mut u8, u32)> {
        let mut state = self.state.lock();
        if state.in_two_phase_write() {
            return Err(Error::Busy);
        }
        if !state.consumer_open {
            return Err(Error::FailedPrecondition);
        }

        let write_index = (state.start_index + state.current_num_bytes) % self.capacity_num_bytes;
        let free = self.capacity_num_bytes - state.current_num_bytes;
        // The grant is the contiguous run from the write index.
        let max = free.min(self.capacity_num_bytes - write_index);
        if max == 0 {
            return Err(Error::ShouldWait);
        }
        self.mutate_and_notify(&mut state, |state| {
            state.producer_two_phase_max = max;
        });
        Ok((self.ring.at(write_index), max as u32))
    }

    fn end_write(&self, num_bytes_written: u32) -> Result {
        let num_bytes_written = num_bytes_written as usize;
        let mut state = self.state.lock();
        if !state.in_two_phase_write() {
            return Err(Error::FailedPrecondition);
        }
        let grant = state.producer_two_phase_max;
        // The two-phase write ends even when the count is bad.
        self.mutate_and_notify(&mut state, |state| {
            state.producer_two_phase_max = 0;
            if num_bytes_written > grant || num_bytes_written % self.element_num_bytes != 0 {
                return Err(Error::InvalidArgument);
            }
            state.current_num_bytes += num_bytes_written;
            Ok(())
        })
    }

    // ── Consumer side ───────────────────────────────────────────────

    fn consumer_close(&self) {
        let mut state = self.state.lock();
        state.consumer_awakables.cancel_and_remove_all();
        self.mutate_and_notify(&mut state, |state| {
            state.consumer_open = false;
            state.consumer_two_phase_max = 0;
            state.current_num_bytes = 0;
            state.start_index = 0;
        });
    }

    fn consumer_cancel_all_state(&self) {
        let mut state = self.state.lock();
        state.consumer_awakables.cancel_and_remove_all();
        self.mutate_and_notify(&mut state, |state| {
            state.consumer_two_phase_max = 0;
        });
    }

    fn set_read_threshold(&self, threshold: u32) -> Result {
        let threshold = threshold as usize;
        if threshold % self.element_num_bytes != 0 || threshold > self.capacity_num_bytes {
            return Err(Error::InvalidArgument);
        }
        let mut state = self.state.lock();
        self.mutate_and_notify(&mut state, |state| {
            state.read_threshold_num_bytes = threshold;
        });
        Ok(())
    }

    fn read_threshold(&self) -> u32 {
        self.state.lock().read_threshold_num_bytes as u32
    }

    fn read(&self, elements: &mut [u8], all_or_none: bool, peek: bool) -> Result<u32> {
        let mut state = self.state.lock();
        if state.in_two_phase_read() {
            return Err(Error::Busy);
        }
        if elements.len() % self.element_num_bytes != 0 {
            return Err(Error::InvalidArgument);
        }
        if elements.is_empty() {
            return Ok(0);
        }

        if all_or_none && elements.len() > state.current_num_bytes {
            return Err(if state.producer_open {
                Error::OutOfRange
            } else {
                Error::FailedPrecondition
            });
        }
        let num_bytes_to_read = elements.len().min(state.current_num_bytes);
        if num_bytes_to_read == 0 {
            return Err(if state.producer_open {
                Error::ShouldWait
            } else {
                Error::FailedPrecondition
            });
        }

        let first = num_bytes_to_read.min(self.capacity_num_bytes - state.start_index);
        self.ring.copy_out(state.start_index, &mut elements[..first]);
        if first < num_bytes_to_read {
            self.ring
                .copy_out(0, &mut elements[first..num_bytes_to_read]);
        }
        if !peek {
            self.mutate_and_notify(&mut state, |state| {
                Self::consume(state, num_bytes_to_read, self.capacity_num_bytes);
            });
        }
        Ok(num_bytes_to_read as u32)
    }

    fn discard(&self, max_num_bytes: u32, all_or_none: bool) -> Result<u32> {
        let max_num_bytes = max_num_bytes as usize;
        let mut state = self.state.lock();
        if state.in_two_phase_read() {
            return Err(Error::Busy);
        }
        if max_num_bytes % self.element_num_bytes != 0 {
            return Err(Error::InvalidArgument);
        }
        if max_num_bytes == 0 {
            return Ok(0);
        }
        if all_or_none && max_num_bytes > state.current_num_bytes {
            return Err(if state.producer_open {
                Error::OutOfRange
            } else {
                Error::FailedPrecondition
            });
        }
        let num_bytes_to_discard = max_num_bytes.min(state.current_num_bytes);
        if num_bytes_to_discard == 0 {
            return Err(if state.producer_open {
                Error::ShouldWait
            } else {
                Error::FailedPrecondition
            });
        }
        self.mutate_and_notify(&mut state, |state| {
            Self::consume(state, num_bytes_to_discard, self.capacity_num_bytes);
        });
        Ok(num_bytes_to_discard as u32)
    }

    fn query(&self) -> u32 {
        self.state.lock().current_num_bytes as u32
    }

    fn begin_read(&self) -> Result<(*const u8, u32)> {
        let mut state = self.state.lock();
        if state.in_two_phase_read() {
            return Err(Error::Busy);
        }
        let max = state
            .current_num_bytes
            .min(self.capacity_num_bytes - state.start_index);
        if max == 0 {
            return Err(if state.producer_open {
                Error::ShouldWait
            } else {
                Error::FailedPrecondition
            });
        }
        let start_index = state.start_index;
        self.mutate_and_notify(&mut state, |state| {
            state.consumer_two_phase_max = max;
        });
        Ok((self.ring.at(start_index) as *const u8, max as u32))
    }

    fn end_read(&self, num_bytes_read: u32) -> Result {
        let num_bytes_read = num_bytes_read as usize;
        let mut state = self.state.lock();
        if !state.in_two_phase_read() {
            return Err(Error::FailedPrecondition);
        }
        let grant = state.consumer_two_phase_max;
        self.mutate_and_notify(&mut state, |state| {
            state.consumer_two_phase_max = 0;
            if num_bytes_read > grant || num_bytes_read % self.element_num_bytes != 0 {
                return Err(Error::InvalidArgument);
            }
            Self::consume(state, num_bytes_read, self.capacity_num_bytes);
            Ok(())
        })
    }

    // ── Awakables ───────────────────────────────────────────────────

    fn add_awakable(
        &self,
        producer_side: bool,
        awakable: Arc<dyn Awakable>,
        context: u64,
        persistent: bool,
        signals: HandleSignals,
    ) -> AddAwakableResult {
        let mut state = self.state.lock();
        let current = if producer_side {
            self.producer_state(&state)
        } else {
            self.consumer_state(&state)
        };
        let list = if producer_side {
            &mut state.producer_awakables
        } else {
            &mut state.consumer_awakables
        };
        if current.satisfies(signals) {
            if persistent {
                list.add(awakable, context, persistent, signals, current);
            }
            AddAwakableResult::AlreadySatisfied(current)
        } else if !current.can_satisfy(signals) {
            if persistent {
                list.add(awakable, context, persistent, signals, current);
            }
            AddAwakableResult::NeverSatisfiable(current)
        } else {
            list.add(awakable, context, persistent, signals, current);
            AddAwakableResult::Added(current)
        }
    }

    fn remove_awakable(
        &self,
        producer_side: bool,
        match_context: bool,
        awakable: &Arc<dyn Awakable>,
        context: u64,
    ) -> SignalsState {
        let mut state = self.state.lock();
        if producer_side {
            state.producer_awakables.remove(match_context, awakable, context);
            self.producer_state(&state)
        } else {
            state.consumer_awakables.remove(match_context, awakable, context);
            self.consumer_state(&state)
        }
    }
}

/// The writing end of a data pipe.
pub struct DataPipeProducerDispatcher {
    pipe: Arc<DataPipe>,
    lifecycle: Mutex<Lifecycle>,
}

impl Dispatcher for DataPipeProducerDispatcher {
    fn dispatcher_type(&self) -> DispatcherType {
        DispatcherType::DataPipeProducer
    }

    fn supports_entrypoint_class(&self, class: EntrypointClass) -> bool {
        matches!(
            class,
            EntrypointClass::None | EntrypointClass::DataPipeProducer
        )
    }

    fn close(&self) -> Result {
        self.lifecycle.lock().close()?;
        self.pipe.producer_close();
        Ok(())
    }

    fn signals_state(&self) -> SignalsState {
        if self.lifecycle.lock().check_open().is_err() {
            return SignalsState::empty();
        }
        let state = self.pipe.state.lock();
        self.pipe.producer_state(&state)
    }

    fn add_awakable(
        &self,
        awakable: Arc<dyn Awakable>,
        context: u64,
        persistent: bool,
        signals: HandleSignals,
    ) -> AddAwakableResult {
        if self.lifecycle.lock().check_open().is_err() {
            return AddAwakableResult::Closed;
        }
        self.pipe
            .add_awakable(true, awakable, context, persistent, signals)
    }

    fn remove_awakable(
        &self,
        match_context: bool,
        awakable: &Arc<dyn Awakable>,
        context: u64,
    ) -> SignalsState {
        self.pipe
            .remove_awakable(true, match_context, awakable, context)
    }

    fn begin_transit(&self) -> Result {
        self.lifecycle.lock().begin_transit()?;
        // Waits and two-phase grants stay behind; the replacement starts
        // clean.
        self.pipe.producer_cancel_all_state();
        Ok(())
    }

    fn end_transit(&self) -> Arc<dyn Dispatcher> {
        self.lifecycle.lock().end_transit();
        Arc::new(DataPipeProducerDispatcher {
            pipe: Arc::clone(&self.pipe),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    fn cancel_transit(&self) {
        self.lifecycle.lock().cancel_transit();
    }

    fn set_producer_options(&self, write_threshold_num_bytes: u32) -> Result {
        self.lifecycle.lock().check_open()?;
        self.pipe.set_write_threshold(write_threshold_num_bytes)
    }

    fn producer_options(&self) -> Result<u32> {
        self.lifecycle.lock().check_open()?;
        Ok(self.pipe.write_threshold())
    }

    fn write_data(&self, elements: &[u8], all_or_none: bool) -> Result<u32> {
        self.lifecycle.lock().check_open()?;
        self.pipe.write(elements, all_or_none)
    }

    fn begin_write_data(&self) -> Result<(*mut u8, u32)> {
        self.lifecycle.lock().check_open()?;
        self.pipe.begin_write()
    }

    fn end_write_data(&self, num_bytes_written: u32) -> Result {
        self.lifecycle.lock().check_open()?;
        self.pipe.end_write(num_bytes_written)
    }
}

/// The reading end of a data pipe.
pub struct DataPipeConsumerDispatcher {
    pipe: Arc<DataPipe>,
    lifecycle: Mutex<Lifecycle>,
}

impl Dispatcher for DataPipeConsumerDispatcher {
    fn dispatcher_type(&self) -> DispatcherType {
        DispatcherType::DataPipeConsumer
    }

    fn supports_entrypoint_class(&self, class: EntrypointClass) -> bool {
        matches!(
            class,
            EntrypointClass::None | EntrypointClass::DataPipeConsumer
        )
    }

    fn close(&self) -> Result {
        self.lifecycle.lock().close()?;
        self.pipe.consumer_close();
        Ok(())
    }

    fn signals_state(&self) -> SignalsState {
        if self.lifecycle.lock().check_open().is_err() {
            return SignalsState::empty();
        }
        let state = self.pipe.state.lock();
        self.pipe.consumer_state(&state)
    }

    fn add_awakable(
        &self,
        awakable: Arc<dyn Awakable>,
        context: u64,
        persistent: bool,
        signals: HandleSignals,
    ) -> AddAwakableResult {
        if self.lifecycle.lock().check_open().is_err() {
            return AddAwakableResult::Closed;
        }
        self.pipe
            .add_awakable(false, awakable, context, persistent, signals)
    }

    fn remove_awakable(
        &self,
        match_context: bool,
        awakable: &Arc<dyn Awakable>,
        context: u64,
    ) -> SignalsState {
        self.pipe
            .remove_awakable(false, match_context, awakable, context)
    }

    fn begin_transit(&self) -> Result {
        self.lifecycle.lock().begin_transit()?;
        self.pipe.consumer_cancel_all_state();
        Ok(())
    }

    fn end_transit(&self) -> Arc<dyn Dispatcher> {
        self.lifecycle.lock().end_transit();
        Arc::new(DataPipeConsumerDispatcher {
            pipe: Arc::clone(&self.pipe),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    fn cancel_transit(&self) {
        self.lifecycle.lock().cancel_transit();
    }

    fn set_consumer_options(&self, read_threshold_num_bytes: u32) -> Result {
        self.lifecycle.lock().check_open()?;
        self.pipe.set_read_threshold(read_threshold_num_bytes)
    }

    fn consumer_options(&self) -> Result<u32> {
        self.lifecycle.lock().check_open()?;
        Ok(self.pipe.read_threshold())
    }

    fn read_data(
        &self,
        elements: Option<&mut [u8]>,
        num_bytes: &mut u32,
        flags: ReadDataFlags,
    ) -> Result {
        self.lifecycle.lock().check_open()?;

        if flags.contains(ReadDataFlags::QUERY) {
            if flags.intersects(ReadDataFlags::DISCARD | ReadDataFlags::PEEK) {
                return Err(Error::InvalidArgument);
            }
            *num_bytes = self.pipe.query();
            return Ok(());
        }
        if flags.contains(ReadDataFlags::DISCARD) {
            if flags.contains(ReadDataFlags::PEEK) {
                return Err(Error::InvalidArgument);
            }
            *num_bytes = self
                .pipe
                .discard(*num_bytes, flags.contains(ReadDataFlags::ALL_OR_NONE))?;
            return Ok(());
        }

        let Some(elements) = elements else {
            return Err(Error::InvalidArgument);
        };
        let requested = *num_bytes as usize;
        if requested > elements.len() {
            return Err(Error::InvalidArgument);
        }
        *num_bytes = self.pipe.read(
            &mut elements[..requested],
            flags.contains(ReadDataFlags::ALL_OR_NONE),
            flags.contains(ReadDataFlags::PEEK),
        )?;
        Ok(())
    }

    fn begin_read_data(&self) -> Result<(*const u8, u32)> {
        self.lifecycle.lock().check_open()?;
        self.pipe.begin_read()
    }

    fn end_read_data(&self, num_bytes_read: u32) -> Result {
        self.lifecycle.lock().check_open()?;
        self.pipe.end_read(num_bytes_read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(element: usize, capacity: usize) -> DataPipeParams {
        DataPipeParams {
            element_num_bytes: element,
            capacity_num_bytes: capacity,
        }
    }

    fn read_exact(consumer: &Arc<dyn Dispatcher>, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let mut num_bytes = len as u32;
        consumer.read_data(Some(&mut buffer), &mut num_bytes, ReadDataFlags::empty())?;
        buffer.truncate(num_bytes as usize);
        Ok(buffer)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (producer, consumer) = DataPipe::create(params(1, 16));
        assert_eq!(producer.write_data(b"hello", false), Ok(5));
        assert_eq!(read_exact(&consumer, 5).unwrap(), b"hello");
        assert_eq!(read_exact(&consumer, 1), Err(Error::ShouldWait));
    }

    #[test]
    fn ring_wraps_across_the_boundary() {
        let (producer, consumer) = DataPipe::create(params(1, 8));
        assert_eq!(producer.write_data(b"abcdef", false), Ok(6));
        assert_eq!(read_exact(&consumer, 4).unwrap(), b"abcd");
        // Now the write wraps: 2 buffered, 6 free, write index wraps at 8.
        assert_eq!(producer.write_data(b"123456", false), Ok(6));
        assert_eq!(read_exact(&consumer, 8).unwrap(), b"ef123456");
    }

    #[test]
    fn partial_write_when_nearly_full() {
        let (producer, _consumer) = DataPipe::create(params(1, 4));
        assert_eq!(producer.write_data(b"abcdef", false), Ok(4));
        assert_eq!(producer.write_data(b"x", false), Err(Error::ShouldWait));
    }

    #[test]
    fn all_or_none_write_needs_room() {
        let (producer, _consumer) = DataPipe::create(params(1, 4));
        assert_eq!(producer.write_data(b"ab", false), Ok(2));
        assert_eq!(producer.write_data(b"xyz", true), Err(Error::OutOfRange));
        assert_eq!(producer.write_data(b"xy", true), Ok(2));
    }

    #[test]
    fn unaligned_counts_are_rejected() {
        let (producer, consumer) = DataPipe::create(params(4, 16));
        assert_eq!(producer.write_data(b"abc", false), Err(Error::InvalidArgument));
        producer.write_data(b"abcdefgh", false).unwrap();
        let mut buffer = [0u8; 3];
        let mut num_bytes = 3u32;
        assert_eq!(
            consumer.read_data(Some(&mut buffer), &mut num_bytes, ReadDataFlags::empty()),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn peek_does_not_consume() {
        let (producer, consumer) = DataPipe::create(params(1, 16));
        producer.write_data(b"data", false).unwrap();

        let mut buffer = [0u8; 4];
        let mut num_bytes = 4u32;
        consumer
            .read_data(Some(&mut buffer), &mut num_bytes, ReadDataFlags::PEEK)
            .unwrap();
        assert_eq!(&buffer, b"data");

        assert_eq!(read_exact(&consumer, 4).unwrap(), b"data");
    }

    #[test]
    fn query_reports_buffered_bytes() {
        let (producer, consumer) = DataPipe::create(params(1, 16));
        producer.write_data(b"abc", false).unwrap();
        let mut num_bytes = 0u32;
        consumer
            .read_data(None, &mut num_bytes, ReadDataFlags::QUERY)
            .unwrap();
        assert_eq!(num_bytes, 3);
    }

    #[test]
    fn discard_drops_bytes() {
        let (producer, consumer) = DataPipe::create(params(1, 16));
        producer.write_data(b"abcdef", false).unwrap();
        let mut num_bytes = 4u32;
        consumer
            .read_data(None, &mut num_bytes, ReadDataFlags::DISCARD)
            .unwrap();
        assert_eq!(num_bytes, 4);
        assert_eq!(read_exact(&consumer, 2).unwrap(), b"ef");
    }

    #[test]
    fn invalid_flag_combinations() {
        let (_producer, consumer) = DataPipe::create(params(1, 16));
        let mut num_bytes = 0u32;
        assert_eq!(
            consumer.read_data(
                None,
                &mut num_bytes,
                ReadDataFlags::QUERY | ReadDataFlags::PEEK
            ),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            consumer.read_data(
                None,
                &mut num_bytes,
                ReadDataFlags::DISCARD | ReadDataFlags::PEEK
            ),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            consumer.read_data(
                None,
                &mut num_bytes,
                ReadDataFlags::QUERY | ReadDataFlags::DISCARD
            ),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn two_phase_write_commits_bytes() {
        let (producer, consumer) = DataPipe::create(params(1, 16));
        let (ptr, max) = producer.begin_write_data().unwrap();
        assert_eq!(max, 16);
        unsafe {
            std::ptr::copy_nonoverlapping(b"ok".as_ptr(), ptr, 2);
        }
        producer.end_write_data(2).unwrap();
        assert_eq!(read_exact(&consumer, 2).unwrap(), b"ok");
    }

    #[test]
    fn single_shot_write_is_busy_during_two_phase() {
        let (producer, _consumer) = DataPipe::create(params(1, 16));
        let _ = producer.begin_write_data().unwrap();
        assert_eq!(producer.write_data(b"x", false), Err(Error::Busy));
        assert_eq!(producer.begin_write_data().map(|_| ()), Err(Error::Busy));
        producer.end_write_data(0).unwrap();
        assert_eq!(producer.write_data(b"x", false), Ok(1));
    }

    #[test]
    fn end_write_over_grant_is_rejected_but_ends_the_phase() {
        let (producer, _consumer) = DataPipe::create(params(1, 4));
        let (_ptr, max) = producer.begin_write_data().unwrap();
        assert_eq!(producer.end_write_data(max + 1), Err(Error::InvalidArgument));
        // The two-phase write is over either way.
        assert_eq!(producer.end_write_data(0), Err(Error::FailedPrecondition));
    }

    #[test]
    fn two_phase_read_commits_consumption() {
        let (producer, consumer) = DataPipe::create(params(1, 16));
        producer.write_data(b"abcd", false).unwrap();
        let (ptr, max) = consumer.begin_read_data().unwrap();
        assert_eq!(max, 4);
        let mut seen = [0u8; 2];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr, seen.as_mut_ptr(), 2);
        }
        assert_eq!(&seen, b"ab");
        consumer.end_read_data(2).unwrap();
        assert_eq!(read_exact(&consumer, 2).unwrap(), b"cd");
    }

    #[test]
    fn end_without_begin_is_a_precondition_failure() {
        let (producer, consumer) = DataPipe::create(params(1, 16));
        assert_eq!(producer.end_write_data(0), Err(Error::FailedPrecondition));
        assert_eq!(consumer.end_read_data(0), Err(Error::FailedPrecondition));
    }

    #[test]
    fn consumer_close_fails_future_writes() {
        let (producer, consumer) = DataPipe::create(params(1, 16));
        consumer.close().unwrap();
        assert_eq!(producer.write_data(b"x", false), Err(Error::FailedPrecondition));
        assert!(producer
            .signals_state()
            .satisfies(HandleSignals::PEER_CLOSED));
    }

    #[test]
    fn producer_close_lets_reader_drain_then_fail() {
        let (producer, consumer) = DataPipe::create(params(1, 16));
        producer.write_data(b"tail", false).unwrap();
        producer.close().unwrap();
        let state = consumer.signals_state();
        assert!(state.satisfies(HandleSignals::READABLE | HandleSignals::PEER_CLOSED));
        assert_eq!(read_exact(&consumer, 4).unwrap(), b"tail");
        assert_eq!(read_exact(&consumer, 1), Err(Error::FailedPrecondition));
    }

    #[test]
    fn threshold_signals_follow_configuration() {
        let (producer, consumer) = DataPipe::create(params(2, 8));

        // Default thresholds are one element.
        assert!(producer
            .signals_state()
            .satisfies(HandleSignals::WRITE_THRESHOLD));
        assert!(consumer
            .signals_state()
            .can_satisfy(HandleSignals::READ_THRESHOLD));

        consumer.set_consumer_options(4).unwrap();
        producer.write_data(b"ab", false).unwrap();
        let state = consumer.signals_state();
        assert!(state.satisfies(HandleSignals::READABLE));
        assert!(!state.satisfies(HandleSignals::READ_THRESHOLD));

        producer.write_data(b"cd", false).unwrap();
        assert!(consumer
            .signals_state()
            .satisfies(HandleSignals::READ_THRESHOLD));

        // Fill the pipe: write threshold drops before writability does.
        producer.set_producer_options(8).unwrap();
        assert!(!producer
            .signals_state()
            .satisfies(HandleSignals::WRITE_THRESHOLD));
        assert!(producer.signals_state().satisfies(HandleSignals::WRITABLE));
    }

    #[test]
    fn threshold_validation() {
        let (producer, consumer) = DataPipe::create(params(4, 16));
        assert_eq!(producer.set_producer_options(6), Err(Error::InvalidArgument));
        assert_eq!(producer.set_producer_options(20), Err(Error::InvalidArgument));
        producer.set_producer_options(8).unwrap();
        assert_eq!(producer.producer_options(), Ok(8));
        consumer.set_consumer_options(16).unwrap();
        assert_eq!(consumer.consumer_options(), Ok(16));
    }

    #[test]
    fn transit_tears_down_a_two_phase_write() {
        let (producer, consumer) = DataPipe::create(params(1, 16));
        let _ = producer.begin_write_data().unwrap();

        producer.begin_transit().unwrap();
        let replacement = producer.end_transit();

        // The old handle is dead; the replacement starts clean and can open
        // a fresh two-phase write.
        assert_eq!(producer.end_write_data(0), Err(Error::InvalidArgument));
        let (ptr, _max) = replacement.begin_write_data().unwrap();
        unsafe {
            std::ptr::copy_nonoverlapping(b"z".as_ptr(), ptr, 1);
        }
        replacement.end_write_data(1).unwrap();
        assert_eq!(read_exact(&consumer, 1).unwrap(), b"z");
    }

    #[test]
    fn cancelled_transit_leaves_the_phase_torn_down() {
        let (producer, _consumer) = DataPipe::create(params(1, 16));
        let _ = producer.begin_write_data().unwrap();
        producer.begin_transit().unwrap();
        producer.cancel_transit();
        // The reservation tore down the grant; the handle itself still works.
        assert_eq!(producer.end_write_data(0), Err(Error::FailedPrecondition));
        assert_eq!(producer.write_data(b"x", false), Ok(1));
    }
}
