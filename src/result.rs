// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Status codes shared by every operation in the crate.
//!
//! Errors are plain values. Every public operation returns [`Result`]; the
//! absence of an error is the only success signal, and failed operations
//! leave their inputs unchanged unless documented otherwise.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure codes for every operation in the crate.
///
/// The variants form a closed taxonomy:
///
/// | Group | Variants |
/// |-------|----------|
/// | Argument | [`InvalidArgument`](Error::InvalidArgument), [`OutOfRange`](Error::OutOfRange) |
/// | Capability | [`PermissionDenied`](Error::PermissionDenied) |
/// | Contention | [`Busy`](Error::Busy) |
/// | State | [`FailedPrecondition`](Error::FailedPrecondition), [`ShouldWait`](Error::ShouldWait), [`AlreadyExists`](Error::AlreadyExists), [`NotFound`](Error::NotFound) |
/// | Resources | [`ResourceExhausted`](Error::ResourceExhausted) |
/// | Timing | [`DeadlineExceeded`](Error::DeadlineExceeded) |
/// | Liveness | [`Cancelled`](Error::Cancelled) |
/// | Other | [`Unknown`](Error::Unknown), [`Unimplemented`](Error::Unimplemented) |
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error,
)]
pub enum Error {
    /// The object was closed while the operation was in progress.
    #[error("operation cancelled")]
    Cancelled,
    /// An error that does not fit any other category.
    #[error("unknown error")]
    Unknown,
    /// A malformed argument, an unknown handle value, or an operation the
    /// object kind does not expose.
    #[error("invalid argument")]
    InvalidArgument,
    /// A blocking operation timed out.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The entity being created already exists, or the watched condition was
    /// already satisfied at registration time.
    #[error("already exists")]
    AlreadyExists,
    /// The named entity does not exist.
    #[error("not found")]
    NotFound,
    /// A table or buffer is full, or an output buffer is too small.
    #[error("resource exhausted")]
    ResourceExhausted,
    /// The object is no longer in a state where the operation can ever
    /// succeed.
    #[error("failed precondition")]
    FailedPrecondition,
    /// The handle does not carry the rights the operation requires.
    #[error("permission denied")]
    PermissionDenied,
    /// The handle is reserved for a transfer, or a conflicting operation is
    /// in progress on the same object.
    #[error("busy")]
    Busy,
    /// The operation cannot complete right now but may once the object
    /// changes state; wait on the relevant signal and retry.
    #[error("should wait")]
    ShouldWait,
    /// The operation, or a requested option flag, is not implemented.
    #[error("unimplemented")]
    Unimplemented,
    /// A count or offset falls outside the representable or permitted range.
    #[error("out of range")]
    OutOfRange,
}

/// Crate-wide result alias. `Ok(())` is the "OK" status.
pub type Result<T = ()> = std::result::Result<T, Error>;
