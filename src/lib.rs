// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # axon-ipc
//!
//! Capability-based in-process IPC primitives behind a rights-checked
//! handle table.
//!
//! Callers hold opaque numeric handles naming kernel-style objects; every
//! operation goes through a [`Core`], which translates handle values to the
//! objects behind them, enforces per-handle rights, and coordinates blocking
//! waits and handle transfer.
//!
//! ## Objects
//!
//! | Object | What it does |
//! |--------|-------------|
//! | **Message pipe** | Bidirectional, message-framed byte transport. Messages can carry handles, transferring them to the receiver. |
//! | **Data pipe** | Unidirectional byte stream over a fixed ring, split into a producer handle and a consumer handle. Supports two-phase (zero-copy) transfers. |
//! | **Shared buffer** | Reference-counted memory region, mappable and duplicatable. |
//! | **Wait set** | Aggregates readiness over member handles so one thread can wait on many objects. |
//!
//! Handles carry a [`HandleRights`] mask fixed at creation and only ever
//! reducible. An operation invoked through a handle lacking the needed right
//! fails with [`Error::PermissionDenied`]; naming an unknown or closed
//! handle fails with [`Error::InvalidArgument`].
//!
//! ## Waiting
//!
//! Every waitable object exposes a [`SignalsState`]: which
//! [`HandleSignals`] are currently satisfied and which could still become
//! satisfied. [`Core::wait`] and [`Core::wait_many`] park the calling thread
//! until a watched signal fires, the signals become impossible, the handle
//! is closed out from under the waiter, or the deadline passes.
//!
//! ```
//! # fn main() -> axon_ipc::Result {
//! use axon_ipc::{Core, Deadline, HandleSignals};
//!
//! let core = Core::new();
//! let (sender, receiver) = core.create_message_pipe(None)?;
//!
//! core.write_message(sender, b"hello", &[], Default::default())?;
//! core.wait(
//!     receiver,
//!     HandleSignals::READABLE,
//!     Deadline::INDEFINITE,
//!     None,
//! )?;
//!
//! let mut buffer = [0u8; 16];
//! let mut size = 0u32;
//! core.read_message(
//!     receiver,
//!     Some(&mut buffer),
//!     Some(&mut size),
//!     None,
//!     None,
//!     Default::default(),
//! )?;
//! assert_eq!(&buffer[..size as usize], b"hello");
//!
//! core.close(sender)?;
//! core.close(receiver)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Transferring handles
//!
//! Writing a message may attach handles, which moves them: the sender's
//! handle values die and the receiver gets fresh ones naming the same
//! underlying objects. The transfer is transactional. While a transfer is
//! in flight the affected handles are *busy* and every other operation
//! naming them fails with [`Error::Busy`]; a failed write restores them
//! untouched. A handle is sendable only with the `TRANSFER` right.
//!
//! ```
//! # fn main() -> axon_ipc::Result {
//! use axon_ipc::{Core, HandleValue};
//!
//! let core = Core::new();
//! let (a0, a1) = core.create_message_pipe(None)?;
//! let (b0, b1) = core.create_message_pipe(None)?;
//!
//! // Send b1 across the a pipe.
//! core.write_message(a0, b"take this", &[b1], Default::default())?;
//!
//! let mut bytes = [0u8; 16];
//! let mut received = [HandleValue::INVALID; 1];
//! let mut num_handles = 0u32;
//! core.read_message(
//!     a1,
//!     Some(&mut bytes),
//!     None,
//!     Some(&mut received),
//!     Some(&mut num_handles),
//!     Default::default(),
//! )?;
//! assert_eq!(num_handles, 1);
//! assert_ne!(received[0], b1);
//!
//! // The sender's value is gone; the received one works.
//! assert!(core.close(b1).is_err());
//! core.write_message(b0, b"through the moved end", &[], Default::default())?;
//! # for h in [a0, a1, b0, received[0]] { core.close(h)?; }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency model
//!
//! All operations are thread-safe. Handle resolution happens under a single
//! handle-table mutex held only for the lookup; object operations run on
//! the object's own lock. Only `wait`, `wait_many`, and `wait_set_wait`
//! park. Wake-up delivery runs on the thread that caused the state change,
//! through the [`Awakable`] protocol; [`Waiter`] is the blocking one-shot
//! implementation behind the synchronous waits.

mod async_waiter;
mod awakable;
mod config;
mod core;
mod data_pipe;
mod dispatcher;
mod handle;
mod handle_table;
mod mapping_table;
mod message_pipe;
mod options;
mod result;
mod rights;
mod shared_buffer;
mod signals;
mod time;
mod wait_set;
mod waiter;

// ── Re-exports ───────────────────────────────────────────────────────

pub use crate::core::Core;

pub use awakable::{Awakable, AwakeReason};
pub use config::Config;
pub use dispatcher::{
    AddAwakableResult, Dispatcher, DispatcherType, EntrypointClass, HandleTransport,
};
pub use handle::{Handle, HandleValue};
pub use result::{Error, Result};
pub use rights::HandleRights;
pub use signals::{HandleSignals, SignalsState};
pub use time::{time_ticks_now, Deadline};
pub use waiter::{WaitOutcome, Waiter};

pub use data_pipe::{
    DataPipe, DataPipeConsumerDispatcher, DataPipeProducerDispatcher, ReadDataFlags,
    WriteDataFlags,
};
pub use message_pipe::{MessagePipe, MessagePipeDispatcher, ReadMessageFlags, WriteMessageFlags};
pub use options::{
    CreateDataPipeOptions, CreateMessagePipeOptions, CreateSharedBufferOptions,
    CreateWaitSetOptions, DataPipeConsumerOptions, DataPipeProducerOptions,
    DuplicateBufferHandleOptions, WaitSetAddOptions,
};
pub use shared_buffer::{
    BufferInformation, BufferMapping, MapBufferFlags, SharedBufferDispatcher,
};
pub use wait_set::{WaitSetDispatcher, WaitSetResult};
