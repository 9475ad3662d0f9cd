// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Embedder-tunable limits.

use serde::{Deserialize, Serialize};

/// Limits applied by a [`Core`](crate::Core) instance.
///
/// The defaults are generous; embedders that host untrusted callers should
/// tighten them. All limits are fixed for the lifetime of the `Core`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of live entries in the handle table.
    pub max_handle_table_size: usize,
    /// Maximum number of handles attached to a single message.
    pub max_message_num_handles: usize,
    /// Maximum number of bytes in a single message.
    pub max_message_num_bytes: usize,
    /// Maximum number of handles accepted by a single multi-handle wait.
    pub max_wait_many_num_handles: usize,
    /// Maximum number of members in one wait set.
    pub max_wait_set_num_entries: usize,
    /// Data pipe capacity used when creation options leave it unspecified,
    /// rounded down to a whole number of elements.
    pub default_data_pipe_capacity_bytes: usize,
    /// Largest permitted data pipe capacity.
    pub max_data_pipe_capacity_bytes: usize,
    /// Largest permitted shared buffer.
    pub max_shared_buffer_num_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_handle_table_size: 1_000_000,
            max_message_num_handles: 10_000,
            max_message_num_bytes: 4 * 1024 * 1024,
            max_wait_many_num_handles: 1_000_000,
            max_wait_set_num_entries: 1_000_000,
            default_data_pipe_capacity_bytes: 1024 * 1024,
            max_data_pipe_capacity_bytes: 256 * 1024 * 1024,
            max_shared_buffer_num_bytes: 1024 * 1024 * 1024,
        }
    }
}
