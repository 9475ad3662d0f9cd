// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Handle values and the dispatcher references they name.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatcher::Dispatcher;
use crate::rights::HandleRights;

/// Opaque process-local capability identifier.
///
/// Zero is [`INVALID`](HandleValue::INVALID) and never names an object.
/// Values are allocated from a monotonic counter and are not eagerly reused
/// after being freed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleValue(u32);

impl HandleValue {
    /// The reserved "no handle" value.
    pub const INVALID: HandleValue = HandleValue(0);

    /// Reconstruct a handle value from its raw representation.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw representation.
    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl Display for HandleValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "HandleValue({})", self.0)
    }
}

/// What a handle value refers to: a dispatcher plus the rights this
/// particular reference carries.
///
/// A `Handle` owns one strong dispatcher reference. Cloning and dropping
/// only adjust that reference; closing the object is a separate, explicit
/// operation ([`Core::close`](crate::Core::close)).
#[derive(Clone)]
pub struct Handle {
    dispatcher: Arc<dyn Dispatcher>,
    rights: HandleRights,
}

impl Handle {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, rights: HandleRights) -> Self {
        Self { dispatcher, rights }
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Consumes the handle, yielding its dispatcher reference.
    pub fn into_dispatcher(self) -> Arc<dyn Dispatcher> {
        self.dispatcher
    }

    pub fn rights(&self) -> HandleRights {
        self.rights
    }

    /// True if every right in `required` is present.
    pub fn has_rights(&self, required: HandleRights) -> bool {
        self.rights.has_all(required)
    }

    /// Same dispatcher, with `rights_to_remove` stripped.
    pub fn clone_with_reduced_rights(&self, rights_to_remove: HandleRights) -> Handle {
        Handle {
            dispatcher: Arc::clone(&self.dispatcher),
            rights: self.rights & !rights_to_remove,
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("type", &self.dispatcher.dispatcher_type())
            .field("rights", &self.rights)
            .finish()
    }
}
