// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Callback trampoline used by [`Core::async_wait`](crate::Core::async_wait).

use parking_lot::Mutex;

use crate::awakable::{Awakable, AwakeReason};
use crate::result::Result;
use crate::signals::SignalsState;

type Callback = Box<dyn FnOnce(Result) + Send + 'static>;

/// One-shot awakable that forwards the terminal wake reason to a callback.
///
/// The callback runs on whichever thread delivers the wake, while the
/// notifying dispatcher holds its lock, so it inherits the awakable
/// contract: no blocking, no re-entering the core.
pub(crate) struct AsyncWaiter {
    callback: Mutex<Option<Callback>>,
}

impl AsyncWaiter {
    pub(crate) fn new(callback: impl FnOnce(Result) + Send + 'static) -> Self {
        Self {
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }
}

impl Awakable for AsyncWaiter {
    fn awake(&self, _context: u64, reason: AwakeReason, _state: SignalsState) -> bool {
        if let Some(callback) = self.callback.lock().take() {
            callback(reason.to_result());
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Error;
    use std::sync::mpsc;

    #[test]
    fn forwards_terminal_reason_once() {
        let (tx, rx) = mpsc::channel();
        let waiter = AsyncWaiter::new(move |result| tx.send(result).unwrap());

        waiter.awake(0, AwakeReason::Satisfied, SignalsState::empty());
        waiter.awake(0, AwakeReason::Cancelled, SignalsState::empty());

        assert_eq!(rx.recv().unwrap(), Ok(()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cancelled_maps_to_cancelled() {
        let (tx, rx) = mpsc::channel();
        let waiter = AsyncWaiter::new(move |result| tx.send(result).unwrap());
        waiter.awake(0, AwakeReason::Cancelled, SignalsState::empty());
        assert_eq!(rx.recv().unwrap(), Err(Error::Cancelled));
    }
}
