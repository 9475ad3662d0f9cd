// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Shared memory buffers.
//!
//! The backing store is one stable in-process allocation, shared by every
//! dispatcher duplicated from the original and by every live mapping.
//! It is freed when the last of them goes away. Buffers expose no signals;
//! waiting on one fails immediately.

use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherType, EntrypointClass, Lifecycle};
use crate::options::DuplicateBufferHandleOptions;
use crate::result::{Error, Result};
use crate::rights::HandleRights;

bitflags! {
    /// Flags for mapping a buffer. None are currently defined.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MapBufferFlags: u32 {}
}

/// Default rights on a shared buffer handle. Buffers are duplicatable by
/// default.
pub(crate) const DEFAULT_SHARED_BUFFER_RIGHTS: HandleRights = HandleRights::TRANSFER
    .union(HandleRights::DUPLICATE)
    .union(HandleRights::GET_OPTIONS)
    .union(HandleRights::READ)
    .union(HandleRights::WRITE)
    .union(HandleRights::MAP_READABLE)
    .union(HandleRights::MAP_WRITABLE)
    .union(HandleRights::MAP_EXECUTABLE);

/// Size and attributes of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferInformation {
    pub flags: u32,
    pub num_bytes: u64,
}

/// The allocation itself. The base address never changes, so mapped
/// addresses stay valid as long as a mapping keeps this alive.
struct BufferBacking {
    ptr: *mut u8,
    size: usize,
}

unsafe impl Send for BufferBacking {}
unsafe impl Sync for BufferBacking {}

impl BufferBacking {
    fn allocate(size: usize) -> Self {
        debug_assert!(size > 0);
        let boxed = vec![0u8; size].into_boxed_slice();
        Self {
            ptr: Box::into_raw(boxed) as *mut u8,
            size,
        }
    }
}

impl Drop for BufferBacking {
    fn drop(&mut self) {
        unsafe {
            let _ = Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.ptr, self.size));
        }
    }
}

/// A live mapping of a buffer region.
///
/// The region is raw shared memory: concurrent writers see each other, as
/// with any shared mapping. The mapping keeps the backing allocation alive.
pub struct BufferMapping {
    backing: Arc<BufferBacking>,
    offset: usize,
    size: usize,
}

unsafe impl Send for BufferMapping {}
unsafe impl Sync for BufferMapping {}

impl BufferMapping {
    /// Base address of the mapped region.
    pub fn address(&self) -> usize {
        self.backing.ptr as usize + self.offset
    }

    /// Length of the mapped region in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Raw pointer to the mapped region.
    pub fn as_ptr(&self) -> *mut u8 {
        // Safety: offset was validated against the backing size at map time.
        unsafe { self.backing.ptr.add(self.offset) }
    }
}

/// Dispatcher for one shared buffer reference.
pub struct SharedBufferDispatcher {
    backing: Arc<BufferBacking>,
    lifecycle: Mutex<Lifecycle>,
}

impl SharedBufferDispatcher {
    /// Allocates a buffer of `num_bytes` and returns its first dispatcher.
    pub(crate) fn create(num_bytes: u64, config: &Config) -> Result<Arc<dyn Dispatcher>> {
        if num_bytes == 0 {
            return Err(Error::InvalidArgument);
        }
        if num_bytes > config.max_shared_buffer_num_bytes {
            return Err(Error::ResourceExhausted);
        }
        Ok(Arc::new(Self {
            backing: Arc::new(BufferBacking::allocate(num_bytes as usize)),
            lifecycle: Mutex::new(Lifecycle::default()),
        }))
    }

    fn share(&self) -> Arc<dyn Dispatcher> {
        Arc::new(Self {
            backing: Arc::clone(&self.backing),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }
}

impl Dispatcher for SharedBufferDispatcher {
    fn dispatcher_type(&self) -> DispatcherType {
        DispatcherType::SharedBuffer
    }

    fn supports_entrypoint_class(&self, class: EntrypointClass) -> bool {
        matches!(class, EntrypointClass::None | EntrypointClass::Buffer)
    }

    fn close(&self) -> Result {
        self.lifecycle.lock().close()
    }

    fn duplicate_dispatcher(&self) -> Result<Arc<dyn Dispatcher>> {
        self.lifecycle.lock().check_open()?;
        Ok(self.share())
    }

    fn begin_transit(&self) -> Result {
        self.lifecycle.lock().begin_transit()
    }

    fn end_transit(&self) -> Arc<dyn Dispatcher> {
        self.lifecycle.lock().end_transit();
        self.share()
    }

    fn cancel_transit(&self) {
        self.lifecycle.lock().cancel_transit();
    }

    fn duplicate_buffer_handle(
        &self,
        options: Option<&DuplicateBufferHandleOptions>,
    ) -> Result<(Arc<dyn Dispatcher>, HandleRights)> {
        self.lifecycle.lock().check_open()?;
        let flags = DuplicateBufferHandleOptions::validate(options)?;
        let rights_to_remove = if flags & DuplicateBufferHandleOptions::FLAG_READ_ONLY != 0 {
            HandleRights::WRITE | HandleRights::MAP_WRITABLE | HandleRights::MAP_EXECUTABLE
        } else {
            HandleRights::empty()
        };
        Ok((self.share(), rights_to_remove))
    }

    fn buffer_information(&self) -> Result<BufferInformation> {
        self.lifecycle.lock().check_open()?;
        Ok(BufferInformation {
            flags: 0,
            num_bytes: self.backing.size as u64,
        })
    }

    fn map_buffer(
        &self,
        offset: u64,
        num_bytes: u64,
        _flags: MapBufferFlags,
    ) -> Result<BufferMapping> {
        self.lifecycle.lock().check_open()?;
        if num_bytes == 0 {
            return Err(Error::InvalidArgument);
        }
        let end = offset.checked_add(num_bytes).ok_or(Error::InvalidArgument)?;
        if end > self.backing.size as u64 {
            return Err(Error::InvalidArgument);
        }
        Ok(BufferMapping {
            backing: Arc::clone(&self.backing),
            offset: offset as usize,
            size: num_bytes as usize,
        })
    }
}
