// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Extensible options structs and their validation.
//!
//! Every options struct starts with `struct_size`, the number of bytes the
//! caller filled in. Fields beyond `struct_size` are treated as absent and
//! take their defaults, which lets older callers pass shorter structs to
//! newer revisions of the API. A `struct_size` smaller than the minimum is
//! `InvalidArgument`; unknown bits in a `flags` word are `Unimplemented`.

use std::mem::{offset_of, size_of};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::result::{Error, Result};

/// Minimum acceptable `struct_size`: the size field itself.
const MIN_STRUCT_SIZE: u32 = size_of::<u32>() as u32;

/// True when `struct_size` covers the field ending at `field_end` bytes.
fn field_present(struct_size: u32, field_end: usize) -> bool {
    struct_size as usize >= field_end
}

fn check_header(struct_size: u32) -> Result {
    if struct_size < MIN_STRUCT_SIZE {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

fn check_flags(flags: u32, known: u32) -> Result {
    if flags & !known != 0 {
        return Err(Error::Unimplemented);
    }
    Ok(())
}

macro_rules! field_end {
    ($type:ty, $field:ident) => {
        offset_of!($type, $field) + size_of::<u32>()
    };
}

// ── Message pipes ───────────────────────────────────────────────────

/// Options for creating a message pipe. No flags are currently defined.
#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreateMessagePipeOptions {
    pub struct_size: u32,
    pub flags: u32,
}

impl Default for CreateMessagePipeOptions {
    fn default() -> Self {
        Self {
            struct_size: size_of::<Self>() as u32,
            flags: 0,
        }
    }
}

impl CreateMessagePipeOptions {
    pub(crate) fn validate(options: Option<&Self>) -> Result {
        let Some(options) = options else {
            return Ok(());
        };
        check_header(options.struct_size)?;
        if field_present(options.struct_size, field_end!(Self, flags)) {
            check_flags(options.flags, 0)?;
        }
        Ok(())
    }
}

// ── Data pipes ──────────────────────────────────────────────────────

/// Options for creating a data pipe.
///
/// `element_num_bytes` is the indivisible unit of transfer; every count the
/// pipe accepts must be a multiple of it. A zero or absent
/// `capacity_num_bytes` selects the configured default capacity, rounded
/// down to a whole number of elements.
#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreateDataPipeOptions {
    pub struct_size: u32,
    pub flags: u32,
    pub element_num_bytes: u32,
    pub capacity_num_bytes: u32,
}

impl Default for CreateDataPipeOptions {
    fn default() -> Self {
        Self {
            struct_size: size_of::<Self>() as u32,
            flags: 0,
            element_num_bytes: 1,
            capacity_num_bytes: 0,
        }
    }
}

/// Fully resolved data pipe creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DataPipeParams {
    pub element_num_bytes: usize,
    pub capacity_num_bytes: usize,
}

impl CreateDataPipeOptions {
    pub(crate) fn validate(options: Option<&Self>, config: &Config) -> Result<DataPipeParams> {
        let defaulted = Self::default();
        let options = options.unwrap_or(&defaulted);
        check_header(options.struct_size)?;

        if field_present(options.struct_size, field_end!(Self, flags)) {
            check_flags(options.flags, 0)?;
        }

        let element_num_bytes =
            if field_present(options.struct_size, field_end!(Self, element_num_bytes)) {
                if options.element_num_bytes == 0 {
                    return Err(Error::InvalidArgument);
                }
                options.element_num_bytes as usize
            } else {
                1
            };

        let capacity_given =
            field_present(options.struct_size, field_end!(Self, capacity_num_bytes))
                && options.capacity_num_bytes != 0;
        let capacity_num_bytes = if capacity_given {
            let capacity = options.capacity_num_bytes as usize;
            if capacity % element_num_bytes != 0 {
                return Err(Error::InvalidArgument);
            }
            if capacity > config.max_data_pipe_capacity_bytes {
                return Err(Error::ResourceExhausted);
            }
            capacity
        } else {
            // Round the default down to a whole number of elements, but keep
            // room for at least one.
            let default = config.default_data_pipe_capacity_bytes;
            (default - default % element_num_bytes).max(element_num_bytes)
        };

        Ok(DataPipeParams {
            element_num_bytes,
            capacity_num_bytes,
        })
    }
}

/// Producer-side options: the write threshold, in bytes. Zero selects the
/// default of one element.
#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DataPipeProducerOptions {
    pub struct_size: u32,
    pub write_threshold_num_bytes: u32,
}

impl Default for DataPipeProducerOptions {
    fn default() -> Self {
        Self {
            struct_size: size_of::<Self>() as u32,
            write_threshold_num_bytes: 0,
        }
    }
}

impl DataPipeProducerOptions {
    /// Returns the requested threshold (0 meaning "default").
    pub(crate) fn validate(options: Option<&Self>) -> Result<u32> {
        let Some(options) = options else {
            return Ok(0);
        };
        check_header(options.struct_size)?;
        if field_present(
            options.struct_size,
            field_end!(Self, write_threshold_num_bytes),
        ) {
            Ok(options.write_threshold_num_bytes)
        } else {
            Ok(0)
        }
    }
}

/// Consumer-side options: the read threshold, in bytes. Zero selects the
/// default of one element.
#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DataPipeConsumerOptions {
    pub struct_size: u32,
    pub read_threshold_num_bytes: u32,
}

impl Default for DataPipeConsumerOptions {
    fn default() -> Self {
        Self {
            struct_size: size_of::<Self>() as u32,
            read_threshold_num_bytes: 0,
        }
    }
}

impl DataPipeConsumerOptions {
    pub(crate) fn validate(options: Option<&Self>) -> Result<u32> {
        let Some(options) = options else {
            return Ok(0);
        };
        check_header(options.struct_size)?;
        if field_present(
            options.struct_size,
            field_end!(Self, read_threshold_num_bytes),
        ) {
            Ok(options.read_threshold_num_bytes)
        } else {
            Ok(0)
        }
    }
}

// ── Shared buffers ──────────────────────────────────────────────────

/// Options for creating a shared buffer. No flags are currently defined.
#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreateSharedBufferOptions {
    pub struct_size: u32,
    pub flags: u32,
}

impl Default for CreateSharedBufferOptions {
    fn default() -> Self {
        Self {
            struct_size: size_of::<Self>() as u32,
            flags: 0,
        }
    }
}

impl CreateSharedBufferOptions {
    pub(crate) fn validate(options: Option<&Self>) -> Result {
        let Some(options) = options else {
            return Ok(());
        };
        check_header(options.struct_size)?;
        if field_present(options.struct_size, field_end!(Self, flags)) {
            check_flags(options.flags, 0)?;
        }
        Ok(())
    }
}

/// Options for duplicating a shared buffer handle.
#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DuplicateBufferHandleOptions {
    pub struct_size: u32,
    pub flags: u32,
}

impl DuplicateBufferHandleOptions {
    /// The duplicate loses write and writable/executable-map rights.
    pub const FLAG_READ_ONLY: u32 = 1 << 0;

    const KNOWN_FLAGS: u32 = Self::FLAG_READ_ONLY;

    /// Returns the validated flags word.
    pub(crate) fn validate(options: Option<&Self>) -> Result<u32> {
        let Some(options) = options else {
            return Ok(0);
        };
        check_header(options.struct_size)?;
        if field_present(options.struct_size, field_end!(Self, flags)) {
            check_flags(options.flags, Self::KNOWN_FLAGS)?;
            Ok(options.flags)
        } else {
            Ok(0)
        }
    }
}

impl Default for DuplicateBufferHandleOptions {
    fn default() -> Self {
        Self {
            struct_size: size_of::<Self>() as u32,
            flags: 0,
        }
    }
}

// ── Wait sets ───────────────────────────────────────────────────────

/// Options for creating a wait set. No flags are currently defined.
#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreateWaitSetOptions {
    pub struct_size: u32,
    pub flags: u32,
}

impl Default for CreateWaitSetOptions {
    fn default() -> Self {
        Self {
            struct_size: size_of::<Self>() as u32,
            flags: 0,
        }
    }
}

impl CreateWaitSetOptions {
    pub(crate) fn validate(options: Option<&Self>) -> Result {
        let Some(options) = options else {
            return Ok(());
        };
        check_header(options.struct_size)?;
        if field_present(options.struct_size, field_end!(Self, flags)) {
            check_flags(options.flags, 0)?;
        }
        Ok(())
    }
}

/// Options for adding a wait set member. No flags are currently defined.
#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaitSetAddOptions {
    pub struct_size: u32,
    pub flags: u32,
}

impl Default for WaitSetAddOptions {
    fn default() -> Self {
        Self {
            struct_size: size_of::<Self>() as u32,
            flags: 0,
        }
    }
}

impl WaitSetAddOptions {
    pub(crate) fn validate(options: Option<&Self>) -> Result {
        let Some(options) = options else {
            return Ok(());
        };
        check_header(options.struct_size)?;
        if field_present(options.struct_size, field_end!(Self, flags)) {
            check_flags(options.flags, 0)?;
        }
        Ok(())
    }
}
