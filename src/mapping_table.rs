// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The base-address to buffer-mapping map.
//!
//! Like the handle table, this is not internally synchronized; `Core` holds
//! the mapping-table mutex around every call. A record keeps the mapped
//! buffer's backing alive and remembers the dispatcher it was mapped
//! through.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::result::{Error, Result};
use crate::shared_buffer::BufferMapping;

struct MappingRecord {
    #[allow(dead_code)]
    dispatcher: Arc<dyn Dispatcher>,
    #[allow(dead_code)]
    mapping: BufferMapping,
}

#[derive(Default)]
pub(crate) struct MappingTable {
    records: HashMap<usize, MappingRecord>,
}

impl MappingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Records a mapping under its base address.
    pub(crate) fn add(&mut self, dispatcher: Arc<dyn Dispatcher>, mapping: BufferMapping) -> Result {
        let address = mapping.address();
        if self.records.contains_key(&address) {
            return Err(Error::ResourceExhausted);
        }
        self.records.insert(
            address,
            MappingRecord {
                dispatcher,
                mapping,
            },
        );
        Ok(())
    }

    /// Removes the mapping at `address`; unknown addresses are an argument
    /// error.
    pub(crate) fn remove(&mut self, address: usize) -> Result {
        self.records
            .remove(&address)
            .map(|_| ())
            .ok_or(Error::InvalidArgument)
    }
}
