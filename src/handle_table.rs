// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The handle-value to handle map.
//!
//! Not internally synchronized: [`Core`](crate::Core) holds the table mutex
//! around every call, which lets multi-step sequences (mark a set of entries
//! busy, roll back on failure) stay atomic without re-locking.
//!
//! A *busy* entry is reserved by an in-flight transfer. Every lookup refuses
//! it with `Busy`; only the busy-clearing calls may touch it. This is what
//! makes sending a handle atomic with respect to every other operation
//! naming it.

use std::collections::HashMap;

use crate::dispatcher::HandleTransport;
use crate::handle::{Handle, HandleValue};
use crate::result::{Error, Result};
use crate::rights::HandleRights;

struct Entry {
    handle: Handle,
    busy: bool,
}

pub(crate) struct HandleTable {
    entries: HashMap<u32, Entry>,
    /// Invariant: never 0 (the invalid value).
    next_value: u32,
    max_size: usize,
}

impl HandleTable {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            next_value: 1,
            max_size,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns a clone of the handle for `value`, or `InvalidArgument` for
    /// an unknown value and `Busy` for a reserved one.
    pub(crate) fn get(&self, value: HandleValue) -> Result<Handle> {
        let entry = self
            .entries
            .get(&value.raw())
            .ok_or(Error::InvalidArgument)?;
        if entry.busy {
            return Err(Error::Busy);
        }
        Ok(entry.handle.clone())
    }

    /// Like [`get`](Self::get), but removes the entry on success.
    pub(crate) fn get_and_remove(&mut self, value: HandleValue) -> Result<Handle> {
        let entry = self
            .entries
            .get(&value.raw())
            .ok_or(Error::InvalidArgument)?;
        if entry.busy {
            return Err(Error::Busy);
        }
        let entry = self.entries.remove(&value.raw()).expect("entry present");
        Ok(entry.handle)
    }

    /// Inserts a handle, returning `INVALID` when the table is full.
    pub(crate) fn add(&mut self, handle: Handle) -> HandleValue {
        if self.entries.len() < self.max_size {
            self.add_unchecked(handle)
        } else {
            HandleValue::INVALID
        }
    }

    /// Inserts both handles or neither.
    pub(crate) fn add_pair(
        &mut self,
        handle0: Handle,
        handle1: Handle,
    ) -> Option<(HandleValue, HandleValue)> {
        if self.entries.len() + 1 < self.max_size {
            Some((self.add_unchecked(handle0), self.add_unchecked(handle1)))
        } else {
            None
        }
    }

    /// Inserts all of `handles` or none of them, writing the assigned
    /// values into `values` (which must be at least as long). On failure
    /// `handles` is left untouched so the caller can dispose of them.
    pub(crate) fn add_vector(
        &mut self,
        handles: &mut Vec<Handle>,
        values: &mut [HandleValue],
    ) -> bool {
        debug_assert!(values.len() >= handles.len());
        if self.entries.len() + handles.len() > self.max_size {
            return false;
        }
        for (i, handle) in handles.drain(..).enumerate() {
            values[i] = self.add_unchecked(handle);
        }
        true
    }

    /// Removes `value` and re-inserts the same dispatcher with
    /// `rights_to_remove` stripped, under a freshly assigned value.
    pub(crate) fn replace_with_reduced_rights(
        &mut self,
        value: HandleValue,
        rights_to_remove: HandleRights,
    ) -> Result<HandleValue> {
        let handle = self.get_and_remove(value)?;
        let replacement = handle.clone_with_reduced_rights(rights_to_remove);
        // No capacity check: this is a net zero-size change.
        Ok(self.add_unchecked(replacement))
    }

    /// Validates and reserves every handle in `values` for transfer,
    /// returning their transports in input order.
    ///
    /// `disallowed` is the handle carrying the message; naming it in
    /// `values` is refused with `Busy` (which also takes precedence over a
    /// missing `TRANSFER` right). A repeated value trips over its own fresh
    /// reservation and is likewise `Busy`. On any failure every reservation
    /// made so far is rolled back.
    pub(crate) fn mark_busy_for_transfer(
        &mut self,
        disallowed: HandleValue,
        values: &[HandleValue],
    ) -> Result<Vec<HandleTransport>> {
        let mut transports = Vec::with_capacity(values.len());
        let mut failure = None;

        for (i, &value) in values.iter().enumerate() {
            if value == disallowed {
                failure = Some((i, Error::Busy));
                break;
            }
            let Some(entry) = self.entries.get_mut(&value.raw()) else {
                failure = Some((i, Error::InvalidArgument));
                break;
            };
            if entry.busy {
                failure = Some((i, Error::Busy));
                break;
            }
            if !entry.handle.has_rights(HandleRights::TRANSFER) {
                failure = Some((i, Error::PermissionDenied));
                break;
            }
            entry.busy = true;
            transports.push(HandleTransport::new(
                std::sync::Arc::clone(entry.handle.dispatcher()),
                entry.handle.rights(),
            ));
        }

        if let Some((count, error)) = failure {
            for &value in &values[..count] {
                let entry = self
                    .entries
                    .get_mut(&value.raw())
                    .expect("reserved entry present");
                debug_assert!(entry.busy);
                entry.busy = false;
            }
            return Err(error);
        }
        Ok(transports)
    }

    /// Removes entries previously reserved by
    /// [`mark_busy_for_transfer`](Self::mark_busy_for_transfer).
    pub(crate) fn remove_busy(&mut self, values: &[HandleValue]) {
        for &value in values {
            let entry = self
                .entries
                .remove(&value.raw())
                .expect("busy entry present");
            debug_assert!(entry.busy);
        }
    }

    /// Clears the reservation on entries previously reserved by
    /// [`mark_busy_for_transfer`](Self::mark_busy_for_transfer).
    pub(crate) fn unmark_busy(&mut self, values: &[HandleValue]) {
        for &value in values {
            let entry = self
                .entries
                .get_mut(&value.raw())
                .expect("busy entry present");
            debug_assert!(entry.busy);
            entry.busy = false;
        }
    }

    fn add_unchecked(&mut self, handle: Handle) -> HandleValue {
        debug_assert!(self.entries.len() < self.max_size || self.max_size == 0);

        // Skip values still in use. With a u32 space and a monotonic
        // counter, recently freed values are not revisited for a long time.
        while self.entries.contains_key(&self.next_value) {
            self.next_value = self.next_value.wrapping_add(1).max(1);
        }
        let value = self.next_value;
        self.next_value = self.next_value.wrapping_add(1).max(1);
        self.entries.insert(value, Entry { handle, busy: false });
        HandleValue::from_raw(value)
    }
}
