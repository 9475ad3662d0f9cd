// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The process-wide entry point: handle resolution, rights checks, waiting,
//! and transactional handle transfer.
//!
//! Every operation follows the same shape: resolve handle values under the
//! handle-table mutex, drop it, then call the dispatcher. The table mutex is
//! never held across a dispatcher call, and nothing here blocks while
//! holding any lock. The only operations that park the calling thread are
//! [`wait`](Core::wait), [`wait_many`](Core::wait_many), and
//! [`wait_set_wait`](Core::wait_set_wait).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, trace, warn};

use crate::async_waiter::AsyncWaiter;
use crate::awakable::Awakable;
use crate::config::Config;
use crate::data_pipe::{
    DataPipe, ReadDataFlags, WriteDataFlags, DEFAULT_CONSUMER_RIGHTS, DEFAULT_PRODUCER_RIGHTS,
};
use crate::dispatcher::{AddAwakableResult, Dispatcher, EntrypointClass};
use crate::handle::{Handle, HandleValue};
use crate::handle_table::HandleTable;
use crate::mapping_table::MappingTable;
use crate::message_pipe::{
    MessagePipe, ReadMessageFlags, WriteMessageFlags, DEFAULT_MESSAGE_PIPE_RIGHTS,
};
use crate::options::{
    CreateDataPipeOptions, CreateMessagePipeOptions, CreateSharedBufferOptions,
    CreateWaitSetOptions, DataPipeConsumerOptions, DataPipeProducerOptions,
    DuplicateBufferHandleOptions, WaitSetAddOptions,
};
use crate::result::{Error, Result};
use crate::rights::HandleRights;
use crate::shared_buffer::{
    BufferInformation, MapBufferFlags, SharedBufferDispatcher, DEFAULT_SHARED_BUFFER_RIGHTS,
};
use crate::signals::{HandleSignals, SignalsState};
use crate::time::{self, Deadline};
use crate::wait_set::{WaitSetDispatcher, WaitSetResult, DEFAULT_WAIT_SET_RIGHTS};
use crate::waiter::{WaitOutcome, Waiter};

/// The handle registry and operation surface for one process.
///
/// `Core` is explicit, not global: the embedder creates one and threads it
/// wherever operations are issued. All methods are thread-safe.
pub struct Core {
    config: Config,
    handle_table: Mutex<HandleTable>,
    mapping_table: Mutex<MappingTable>,
}

impl Core {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            handle_table: Mutex::new(HandleTable::new(config.max_handle_table_size)),
            mapping_table: Mutex::new(MappingTable::new()),
            config,
        }
    }

    /// Monotonic, non-zero time in microseconds.
    pub fn time_ticks_now(&self) -> u64 {
        time::time_ticks_now()
    }

    /// Verifies that every handle and mapping was released.
    ///
    /// Intended for orderly embedder shutdown; leaks fail with
    /// `FailedPrecondition` and are logged.
    pub fn shutdown(&self) -> Result {
        let live_handles = self.handle_table.lock().len();
        let live_mappings = self.mapping_table.lock().len();
        if live_handles != 0 || live_mappings != 0 {
            error!(live_handles, live_mappings, "shutdown with live objects");
            return Err(Error::FailedPrecondition);
        }
        Ok(())
    }

    // ── Handle resolution ───────────────────────────────────────────

    fn get_handle(&self, handle_value: HandleValue) -> Result<Handle> {
        if !handle_value.is_valid() {
            return Err(Error::InvalidArgument);
        }
        self.handle_table.lock().get(handle_value)
    }

    /// Resolves `handle_value` and checks `required_rights`.
    ///
    /// When the rights check fails, the reported error depends on whether
    /// the dispatcher implements `entrypoint_class`: `PermissionDenied` if
    /// it does, `InvalidArgument` if not, so a caller cannot probe rights
    /// on objects that do not support the operation anyway. A handle whose
    /// rights pass is always resolved, even if the dispatcher will fail the
    /// operation with `Unimplemented`.
    fn get_dispatcher_and_check_rights(
        &self,
        handle_value: HandleValue,
        required_rights: HandleRights,
        entrypoint_class: EntrypointClass,
    ) -> Result<Arc<dyn Dispatcher>> {
        let handle = self.get_handle(handle_value)?;
        if !handle.has_rights(required_rights) {
            return Err(
                if handle.dispatcher().supports_entrypoint_class(entrypoint_class) {
                    Error::PermissionDenied
                } else {
                    Error::InvalidArgument
                },
            );
        }
        Ok(handle.into_dispatcher())
    }

    fn add_handle(&self, handle: Handle) -> HandleValue {
        self.handle_table.lock().add(handle)
    }

    // ── Handle lifecycle ────────────────────────────────────────────

    /// Closes a handle. The object is told after the table entry is gone,
    /// which also delivers `Cancelled` to every awakable attached to it.
    pub fn close(&self, handle_value: HandleValue) -> Result {
        if !handle_value.is_valid() {
            return Err(Error::InvalidArgument);
        }
        let handle = self.handle_table.lock().get_and_remove(handle_value)?;
        handle.dispatcher().close()
    }

    /// Reports the rights carried by a handle.
    pub fn get_rights(&self, handle_value: HandleValue) -> Result<HandleRights> {
        Ok(self.get_handle(handle_value)?.rights())
    }

    /// Atomically replaces a handle with one carrying fewer rights, under a
    /// new handle value. The old value is gone on success.
    pub fn replace_handle_with_reduced_rights(
        &self,
        handle_value: HandleValue,
        rights_to_remove: HandleRights,
    ) -> Result<HandleValue> {
        if !handle_value.is_valid() {
            return Err(Error::InvalidArgument);
        }
        let replacement = self
            .handle_table
            .lock()
            .replace_with_reduced_rights(handle_value, rights_to_remove)?;
        debug_assert!(replacement.is_valid());
        Ok(replacement)
    }

    /// Duplicates a handle without changing its rights. Requires
    /// `DUPLICATE`.
    pub fn duplicate_handle(&self, handle_value: HandleValue) -> Result<HandleValue> {
        self.duplicate_handle_with_reduced_rights(handle_value, HandleRights::empty())
    }

    /// Duplicates a handle; the duplicate carries the source's rights minus
    /// `rights_to_remove`. Requires `DUPLICATE`.
    pub fn duplicate_handle_with_reduced_rights(
        &self,
        handle_value: HandleValue,
        rights_to_remove: HandleRights,
    ) -> Result<HandleValue> {
        let handle = self.get_handle(handle_value)?;
        if !handle.has_rights(HandleRights::DUPLICATE) {
            return Err(Error::PermissionDenied);
        }

        let new_dispatcher = handle.dispatcher().duplicate_dispatcher()?;
        let rights = handle.rights() & !rights_to_remove;
        let new_value = self.add_handle(Handle::new(Arc::clone(&new_dispatcher), rights));
        if !new_value.is_valid() {
            error!("handle table full");
            let _ = new_dispatcher.close();
            return Err(Error::ResourceExhausted);
        }
        Ok(new_value)
    }

    // ── Waiting ─────────────────────────────────────────────────────

    /// Blocks until any of `signals` is satisfied on the handle, the
    /// signals become unsatisfiable (`FailedPrecondition`), the handle's
    /// object is closed (`Cancelled`), or the deadline passes
    /// (`DeadlineExceeded`).
    ///
    /// When `signals_state` is supplied it receives the final observed
    /// state on every outcome except `InvalidArgument`.
    pub fn wait(
        &self,
        handle_value: HandleValue,
        signals: HandleSignals,
        deadline: Deadline,
        signals_state: Option<&mut SignalsState>,
    ) -> Result {
        let mut states = [SignalsState::empty()];
        let mut index = None;
        let states_out = if signals_state.is_some() {
            Some(&mut states[..])
        } else {
            None
        };
        let result =
            self.wait_many_internal(&[handle_value], &[signals], deadline, &mut index, states_out);
        if let Some(out) = signals_state {
            if result != Err(Error::InvalidArgument) {
                *out = states[0];
            }
        }
        result
    }

    /// Waits on several handles at once; the first to complete wins.
    ///
    /// `result_index` receives the deciding index: the winner on success,
    /// the first unsatisfiable handle on `FailedPrecondition`, or the first
    /// unresolvable input on `InvalidArgument`/`Busy`. It is untouched on
    /// timeout. `signals_states` (when supplied, at least as long as
    /// `handles`) receives every handle's final state, except when
    /// resolution failed.
    ///
    /// Duplicate handle values are permitted; each entry waits on its own
    /// signal set.
    pub fn wait_many(
        &self,
        handles: &[HandleValue],
        signals: &[HandleSignals],
        deadline: Deadline,
        result_index: Option<&mut usize>,
        signals_states: Option<&mut [SignalsState]>,
    ) -> Result {
        if handles.len() != signals.len() {
            return Err(Error::InvalidArgument);
        }
        if handles.len() > self.config.max_wait_many_num_handles {
            return Err(Error::ResourceExhausted);
        }
        if let Some(states) = &signals_states {
            if states.len() < handles.len() {
                return Err(Error::InvalidArgument);
            }
        }

        let mut index = None;
        let result = self.wait_many_internal(handles, signals, deadline, &mut index, signals_states);
        if let (Some(out), Some(index)) = (result_index, index) {
            *out = index;
        }
        result
    }

    fn wait_many_internal(
        &self,
        handles: &[HandleValue],
        signals: &[HandleSignals],
        deadline: Deadline,
        result_index: &mut Option<usize>,
        mut signals_states: Option<&mut [SignalsState]>,
    ) -> Result {
        let mut dispatchers = Vec::with_capacity(handles.len());
        {
            let table = self.handle_table.lock();
            for (i, &handle_value) in handles.iter().enumerate() {
                if !handle_value.is_valid() {
                    *result_index = Some(i);
                    return Err(Error::InvalidArgument);
                }
                match table.get(handle_value) {
                    Ok(handle) => dispatchers.push(handle.into_dispatcher()),
                    Err(error) => {
                        *result_index = Some(i);
                        return Err(error);
                    }
                }
            }
        }

        let waiter = Arc::new(Waiter::new());
        waiter.init();

        // Register on every dispatcher, stopping at the first that is
        // already decided (satisfied, unsatisfiable, or closed).
        let mut num_added = dispatchers.len();
        let mut result = Ok(());
        for (i, dispatcher) in dispatchers.iter().enumerate() {
            let outcome = dispatcher.add_awakable(
                Arc::clone(&waiter) as Arc<dyn Awakable>,
                i as u64,
                false,
                signals[i],
            );
            match outcome {
                AddAwakableResult::Added(_) => continue,
                AddAwakableResult::AlreadySatisfied(_) => {
                    *result_index = Some(i);
                    result = Ok(());
                }
                AddAwakableResult::NeverSatisfiable(_) => {
                    *result_index = Some(i);
                    result = Err(Error::FailedPrecondition);
                }
                AddAwakableResult::Closed => {
                    *result_index = Some(i);
                    result = Err(Error::InvalidArgument);
                }
            }
            num_added = i;
            break;
        }

        if num_added == dispatchers.len() {
            match waiter.wait(deadline) {
                WaitOutcome::Awoken {
                    context, reason, ..
                } => {
                    *result_index = Some(context as usize);
                    result = reason.to_result();
                }
                WaitOutcome::TimedOut => result = Err(Error::DeadlineExceeded),
            }
        }

        // Deregister everywhere before the waiter can be reused, and report
        // final states for every input.
        let waiter: Arc<dyn Awakable> = waiter;
        for (i, dispatcher) in dispatchers.iter().enumerate() {
            if i < num_added {
                let state = dispatcher.remove_awakable(false, &waiter, 0);
                if let Some(states) = signals_states.as_deref_mut() {
                    states[i] = state;
                }
            } else if let Some(states) = signals_states.as_deref_mut() {
                states[i] = dispatcher.signals_state();
            }
        }

        result
    }

    /// Registers `callback` to run once the handle's signals resolve.
    ///
    /// The callback receives `Ok` when a signal is satisfied,
    /// `FailedPrecondition` when none can be, or `Cancelled` when the
    /// handle's object is closed first; it runs on the thread delivering
    /// the wake and must not call back into `Core`. When the signals are
    /// already decided at registration time, nothing is registered and the
    /// decision is returned here instead (`AlreadyExists` for
    /// already-satisfied).
    pub fn async_wait(
        &self,
        handle_value: HandleValue,
        signals: HandleSignals,
        callback: impl FnOnce(Result) + Send + 'static,
    ) -> Result {
        let dispatcher = self.get_dispatcher_and_check_rights(
            handle_value,
            HandleRights::empty(),
            EntrypointClass::None,
        )?;
        let waiter = Arc::new(AsyncWaiter::new(callback));
        match dispatcher.add_awakable(waiter, 0, false, signals) {
            AddAwakableResult::Added(_) => Ok(()),
            AddAwakableResult::AlreadySatisfied(_) => Err(Error::AlreadyExists),
            AddAwakableResult::NeverSatisfiable(_) => Err(Error::FailedPrecondition),
            AddAwakableResult::Closed => Err(Error::InvalidArgument),
        }
    }

    // ── Message pipes ───────────────────────────────────────────────

    /// Creates a message pipe, returning its two endpoint handles.
    pub fn create_message_pipe(
        &self,
        options: Option<&CreateMessagePipeOptions>,
    ) -> Result<(HandleValue, HandleValue)> {
        CreateMessagePipeOptions::validate(options)?;
        let (dispatcher0, dispatcher1) = MessagePipe::create_pair();

        let pair = self.handle_table.lock().add_pair(
            Handle::new(Arc::clone(&dispatcher0), DEFAULT_MESSAGE_PIPE_RIGHTS),
            Handle::new(Arc::clone(&dispatcher1), DEFAULT_MESSAGE_PIPE_RIGHTS),
        );
        let Some(pair) = pair else {
            error!("handle table full");
            let _ = dispatcher0.close();
            let _ = dispatcher1.close();
            return Err(Error::ResourceExhausted);
        };
        Ok(pair)
    }

    /// Writes a message, optionally transferring handles with it.
    ///
    /// Transfer is transactional: each named handle must carry `TRANSFER`,
    /// must not be the pipe handle itself, and must not repeat. On success
    /// the sender's entries are gone and the receiver will see fresh
    /// handles; on any failure every entry is restored untouched.
    pub fn write_message(
        &self,
        message_pipe_handle: HandleValue,
        bytes: &[u8],
        transfer_handles: &[HandleValue],
        _flags: WriteMessageFlags,
    ) -> Result {
        let dispatcher = self.get_dispatcher_and_check_rights(
            message_pipe_handle,
            HandleRights::WRITE,
            EntrypointClass::MessagePipe,
        )?;

        if bytes.len() > self.config.max_message_num_bytes {
            return Err(Error::ResourceExhausted);
        }

        if transfer_handles.is_empty() {
            return dispatcher.write_message(bytes, &[]);
        }

        // An absurd count is an argument error; a merely large one is a
        // resource limit.
        if transfer_handles.len() > (u32::MAX as usize) / std::mem::size_of::<HandleValue>() {
            return Err(Error::InvalidArgument);
        }
        if transfer_handles.len() > self.config.max_message_num_handles {
            return Err(Error::ResourceExhausted);
        }

        let transports = self
            .handle_table
            .lock()
            .mark_busy_for_transfer(message_pipe_handle, transfer_handles)?;

        // Reserve each dispatcher outside the table lock. A refusal means a
        // conflicting operation owns the object right now.
        for (i, transport) in transports.iter().enumerate() {
            if let Err(error) = transport.dispatcher().begin_transit() {
                warn!(
                    handle = %transfer_handles[i],
                    "handle transfer refused mid-operation"
                );
                for accepted in &transports[..i] {
                    accepted.dispatcher().cancel_transit();
                }
                self.handle_table.lock().unmark_busy(transfer_handles);
                return Err(error);
            }
        }

        let result = dispatcher.write_message(bytes, &transports);

        match result {
            Ok(()) => {
                trace!(count = transfer_handles.len(), "handles transferred");
                self.handle_table.lock().remove_busy(transfer_handles);
            }
            Err(_) => {
                for transport in &transports {
                    transport.dispatcher().cancel_transit();
                }
                self.handle_table.lock().unmark_busy(transfer_handles);
            }
        }
        result
    }

    /// Reads the next message.
    ///
    /// `bytes`/`handles` are the caller's buffers; `num_bytes`/`num_handles`
    /// report the message's actual sizes. A message that does not fit fails
    /// with `ResourceExhausted` (with the required sizes reported) and stays
    /// queued, unless [`ReadMessageFlags::MAY_DISCARD`] throws it away.
    /// Handles carried by the message are inserted into the handle table and
    /// their fresh values written to `handles`.
    pub fn read_message(
        &self,
        message_pipe_handle: HandleValue,
        bytes: Option<&mut [u8]>,
        num_bytes: Option<&mut u32>,
        handles: Option<&mut [HandleValue]>,
        num_handles: Option<&mut u32>,
        flags: ReadMessageFlags,
    ) -> Result {
        let dispatcher = self.get_dispatcher_and_check_rights(
            message_pipe_handle,
            HandleRights::READ,
            EntrypointClass::MessagePipe,
        )?;

        let capacity = handles.as_ref().map_or(0, |values| values.len() as u32);
        let mut received = Vec::new();
        let mut result = dispatcher.read_message(
            bytes,
            num_bytes,
            &mut received,
            capacity,
            num_handles,
            flags.contains(ReadMessageFlags::MAY_DISCARD),
        );

        if !received.is_empty() {
            debug_assert!(result.is_ok());
            let handles = handles.expect("handles were received into caller capacity");
            let mut values = vec![HandleValue::INVALID; received.len()];
            let inserted = self
                .handle_table
                .lock()
                .add_vector(&mut received, &mut values);
            if inserted {
                handles[..values.len()].copy_from_slice(&values);
            } else {
                error!(
                    count = received.len(),
                    "received handles but the handle table is full"
                );
                for handle in received {
                    let _ = handle.dispatcher().close();
                }
                if result.is_ok() {
                    result = Err(Error::ResourceExhausted);
                }
            }
        }
        result
    }

    // ── Data pipes ──────────────────────────────────────────────────

    /// Creates a data pipe, returning `(producer, consumer)` handles.
    pub fn create_data_pipe(
        &self,
        options: Option<&CreateDataPipeOptions>,
    ) -> Result<(HandleValue, HandleValue)> {
        let params = CreateDataPipeOptions::validate(options, &self.config)?;
        let (producer, consumer) = DataPipe::create(params);

        let pair = self.handle_table.lock().add_pair(
            Handle::new(Arc::clone(&producer), DEFAULT_PRODUCER_RIGHTS),
            Handle::new(Arc::clone(&consumer), DEFAULT_CONSUMER_RIGHTS),
        );
        let Some(pair) = pair else {
            error!("handle table full");
            let _ = producer.close();
            let _ = consumer.close();
            return Err(Error::ResourceExhausted);
        };
        Ok(pair)
    }

    pub fn set_data_pipe_producer_options(
        &self,
        producer_handle: HandleValue,
        options: Option<&DataPipeProducerOptions>,
    ) -> Result {
        let threshold = DataPipeProducerOptions::validate(options)?;
        let dispatcher = self.get_dispatcher_and_check_rights(
            producer_handle,
            HandleRights::SET_OPTIONS,
            EntrypointClass::DataPipeProducer,
        )?;
        dispatcher.set_producer_options(threshold)
    }

    pub fn get_data_pipe_producer_options(
        &self,
        producer_handle: HandleValue,
    ) -> Result<DataPipeProducerOptions> {
        let dispatcher = self.get_dispatcher_and_check_rights(
            producer_handle,
            HandleRights::GET_OPTIONS,
            EntrypointClass::DataPipeProducer,
        )?;
        Ok(DataPipeProducerOptions {
            write_threshold_num_bytes: dispatcher.producer_options()?,
            ..Default::default()
        })
    }

    /// Writes bytes into a data pipe, returning how many were accepted.
    pub fn write_data(
        &self,
        producer_handle: HandleValue,
        elements: &[u8],
        flags: WriteDataFlags,
    ) -> Result<u32> {
        let dispatcher = self.get_dispatcher_and_check_rights(
            producer_handle,
            HandleRights::WRITE,
            EntrypointClass::DataPipeProducer,
        )?;
        dispatcher.write_data(elements, flags.contains(WriteDataFlags::ALL_OR_NONE))
    }

    /// Starts a two-phase write, returning a pointer into the pipe's own
    /// buffer and its size. No flags apply to a two-phase write.
    pub fn begin_write_data(
        &self,
        producer_handle: HandleValue,
        flags: WriteDataFlags,
    ) -> Result<(*mut u8, u32)> {
        if !flags.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let dispatcher = self.get_dispatcher_and_check_rights(
            producer_handle,
            HandleRights::WRITE,
            EntrypointClass::DataPipeProducer,
        )?;
        dispatcher.begin_write_data()
    }

    pub fn end_write_data(&self, producer_handle: HandleValue, num_bytes_written: u32) -> Result {
        let dispatcher = self.get_dispatcher_and_check_rights(
            producer_handle,
            HandleRights::WRITE,
            EntrypointClass::DataPipeProducer,
        )?;
        dispatcher.end_write_data(num_bytes_written)
    }

    pub fn set_data_pipe_consumer_options(
        &self,
        consumer_handle: HandleValue,
        options: Option<&DataPipeConsumerOptions>,
    ) -> Result {
        let threshold = DataPipeConsumerOptions::validate(options)?;
        let dispatcher = self.get_dispatcher_and_check_rights(
            consumer_handle,
            HandleRights::SET_OPTIONS,
            EntrypointClass::DataPipeConsumer,
        )?;
        dispatcher.set_consumer_options(threshold)
    }

    pub fn get_data_pipe_consumer_options(
        &self,
        consumer_handle: HandleValue,
    ) -> Result<DataPipeConsumerOptions> {
        let dispatcher = self.get_dispatcher_and_check_rights(
            consumer_handle,
            HandleRights::GET_OPTIONS,
            EntrypointClass::DataPipeConsumer,
        )?;
        Ok(DataPipeConsumerOptions {
            read_threshold_num_bytes: dispatcher.consumer_options()?,
            ..Default::default()
        })
    }

    /// Reads, peeks, discards, or queries buffered data.
    ///
    /// `num_bytes` carries the requested byte count in and the affected
    /// count out; for [`ReadDataFlags::QUERY`] it is output only.
    pub fn read_data(
        &self,
        consumer_handle: HandleValue,
        elements: Option<&mut [u8]>,
        num_bytes: &mut u32,
        flags: ReadDataFlags,
    ) -> Result {
        let dispatcher = self.get_dispatcher_and_check_rights(
            consumer_handle,
            HandleRights::READ,
            EntrypointClass::DataPipeConsumer,
        )?;
        dispatcher.read_data(elements, num_bytes, flags)
    }

    /// Starts a two-phase read, returning a pointer to buffered data and
    /// its size. No flags apply to a two-phase read.
    pub fn begin_read_data(
        &self,
        consumer_handle: HandleValue,
        flags: ReadDataFlags,
    ) -> Result<(*const u8, u32)> {
        if !flags.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let dispatcher = self.get_dispatcher_and_check_rights(
            consumer_handle,
            HandleRights::READ,
            EntrypointClass::DataPipeConsumer,
        )?;
        dispatcher.begin_read_data()
    }

    pub fn end_read_data(&self, consumer_handle: HandleValue, num_bytes_read: u32) -> Result {
        let dispatcher = self.get_dispatcher_and_check_rights(
            consumer_handle,
            HandleRights::READ,
            EntrypointClass::DataPipeConsumer,
        )?;
        dispatcher.end_read_data(num_bytes_read)
    }

    // ── Shared buffers ──────────────────────────────────────────────

    /// Allocates a shared buffer of `num_bytes`.
    pub fn create_shared_buffer(
        &self,
        options: Option<&CreateSharedBufferOptions>,
        num_bytes: u64,
    ) -> Result<HandleValue> {
        CreateSharedBufferOptions::validate(options)?;
        let dispatcher = SharedBufferDispatcher::create(num_bytes, &self.config)?;

        let handle_value = self.add_handle(Handle::new(
            Arc::clone(&dispatcher),
            DEFAULT_SHARED_BUFFER_RIGHTS,
        ));
        if !handle_value.is_valid() {
            error!("handle table full");
            let _ = dispatcher.close();
            return Err(Error::ResourceExhausted);
        }
        Ok(handle_value)
    }

    /// Duplicates a buffer handle; options may restrict the duplicate (for
    /// example to read-only). Requires `DUPLICATE`.
    pub fn duplicate_buffer_handle(
        &self,
        buffer_handle: HandleValue,
        options: Option<&DuplicateBufferHandleOptions>,
    ) -> Result<HandleValue> {
        let handle = self.get_handle(buffer_handle)?;
        if !handle.has_rights(HandleRights::DUPLICATE) {
            return Err(
                if handle
                    .dispatcher()
                    .supports_entrypoint_class(EntrypointClass::Buffer)
                {
                    Error::PermissionDenied
                } else {
                    Error::InvalidArgument
                },
            );
        }

        // Option validation is the dispatcher's job.
        let (new_dispatcher, rights_to_remove) =
            handle.dispatcher().duplicate_buffer_handle(options)?;
        let rights = handle.rights() & !rights_to_remove;
        let new_value = self.add_handle(Handle::new(Arc::clone(&new_dispatcher), rights));
        if !new_value.is_valid() {
            error!("handle table full");
            let _ = new_dispatcher.close();
            return Err(Error::ResourceExhausted);
        }
        Ok(new_value)
    }

    pub fn get_buffer_information(&self, buffer_handle: HandleValue) -> Result<BufferInformation> {
        let dispatcher = self.get_dispatcher_and_check_rights(
            buffer_handle,
            HandleRights::GET_OPTIONS,
            EntrypointClass::Buffer,
        )?;
        dispatcher.buffer_information()
    }

    /// Maps `num_bytes` of a buffer at `offset`, returning the writable
    /// base address of the mapping. Requires both map rights, as mappings
    /// are currently always read-write.
    pub fn map_buffer(
        &self,
        buffer_handle: HandleValue,
        offset: u64,
        num_bytes: u64,
        flags: MapBufferFlags,
    ) -> Result<usize> {
        let dispatcher = self.get_dispatcher_and_check_rights(
            buffer_handle,
            HandleRights::MAP_READABLE | HandleRights::MAP_WRITABLE,
            EntrypointClass::Buffer,
        )?;
        let mapping = dispatcher.map_buffer(offset, num_bytes, flags)?;
        let address = mapping.address();
        self.mapping_table.lock().add(dispatcher, mapping)?;
        Ok(address)
    }

    /// Tears down a mapping by its base address.
    pub fn unmap_buffer(&self, address: usize) -> Result {
        self.mapping_table.lock().remove(address)
    }

    // ── Wait sets ───────────────────────────────────────────────────

    /// Creates a wait set.
    pub fn create_wait_set(&self, options: Option<&CreateWaitSetOptions>) -> Result<HandleValue> {
        CreateWaitSetOptions::validate(options)?;
        let dispatcher = WaitSetDispatcher::create(&self.config);

        let handle_value =
            self.add_handle(Handle::new(Arc::clone(&dispatcher), DEFAULT_WAIT_SET_RIGHTS));
        if !handle_value.is_valid() {
            error!("handle table full");
            let _ = dispatcher.close();
            return Err(Error::ResourceExhausted);
        }
        Ok(handle_value)
    }

    /// Adds a member to a wait set under a caller-chosen cookie.
    pub fn wait_set_add(
        &self,
        wait_set_handle: HandleValue,
        member_handle: HandleValue,
        signals: HandleSignals,
        cookie: u64,
        options: Option<&WaitSetAddOptions>,
    ) -> Result {
        if !wait_set_handle.is_valid() || !member_handle.is_valid() {
            return Err(Error::InvalidArgument);
        }

        // Resolve both under one table acquisition.
        let (wait_set, member) = {
            let table = self.handle_table.lock();
            (table.get(wait_set_handle)?, table.get(member_handle)?)
        };

        if !wait_set.has_rights(HandleRights::WRITE) {
            return Err(
                if wait_set
                    .dispatcher()
                    .supports_entrypoint_class(EntrypointClass::WaitSet)
                {
                    Error::PermissionDenied
                } else {
                    Error::InvalidArgument
                },
            );
        }

        wait_set
            .dispatcher()
            .wait_set_add(member.into_dispatcher(), signals, cookie, options)
    }

    /// Removes the member registered under `cookie`.
    pub fn wait_set_remove(&self, wait_set_handle: HandleValue, cookie: u64) -> Result {
        let dispatcher = self.get_dispatcher_and_check_rights(
            wait_set_handle,
            HandleRights::WRITE,
            EntrypointClass::WaitSet,
        )?;
        dispatcher.wait_set_remove(cookie)
    }

    /// Blocks until some member of the wait set triggers, filling `results`
    /// with up to `num_results` entries and reporting the total triggered
    /// count through `max_results`.
    pub fn wait_set_wait(
        &self,
        wait_set_handle: HandleValue,
        deadline: Deadline,
        results: &mut [WaitSetResult],
        num_results: &mut u32,
        max_results: Option<&mut u32>,
    ) -> Result {
        let dispatcher = self.get_dispatcher_and_check_rights(
            wait_set_handle,
            HandleRights::READ,
            EntrypointClass::WaitSet,
        )?;
        dispatcher.wait_set_wait(deadline, results, num_results, max_results)
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}
