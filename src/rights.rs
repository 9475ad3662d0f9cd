// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Handle rights.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// The rights carried by a handle, restricting which operations it
    /// permits. Rights can only ever be removed from a handle, never added.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HandleRights: u32 {
        /// The handle may be sent over a message pipe.
        const TRANSFER = 1 << 0;
        /// The handle may read (messages, data, buffer contents).
        const READ = 1 << 1;
        /// The handle may write (messages, data, buffer contents).
        const WRITE = 1 << 2;
        /// The handle may be duplicated.
        const DUPLICATE = 1 << 3;
        /// The handle may query per-object options.
        const GET_OPTIONS = 1 << 4;
        /// The handle may change per-object options.
        const SET_OPTIONS = 1 << 5;
        /// The underlying buffer may be mapped readable.
        const MAP_READABLE = 1 << 6;
        /// The underlying buffer may be mapped writable.
        const MAP_WRITABLE = 1 << 7;
        /// The underlying buffer may be mapped executable.
        const MAP_EXECUTABLE = 1 << 8;
    }
}

impl HandleRights {
    /// Returns true if every right in `required` is present.
    pub fn has_all(&self, required: HandleRights) -> bool {
        self.contains(required)
    }
}

impl fmt::Display for HandleRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
