// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Monotonic time and deadlines.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Current monotonic time in microseconds.
///
/// Non-zero, strictly non-decreasing within the process. The origin is
/// arbitrary; only differences are meaningful.
pub fn time_ticks_now() -> u64 {
    // +1 keeps the very first reading non-zero.
    EPOCH.elapsed().as_micros() as u64 + 1
}

/// A wait bound, expressed as a duration from the moment of the call.
///
/// Microsecond units. [`Deadline::INDEFINITE`] (all bits set) never times
/// out; a zero deadline polls, returning immediately after the initial
/// readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Deadline(u64);

impl Deadline {
    /// Never time out.
    pub const INDEFINITE: Deadline = Deadline(u64::MAX);

    /// Return immediately after the initial readiness check.
    pub const ZERO: Deadline = Deadline(0);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self(duration.as_micros().min(u64::MAX as u128) as u64)
    }

    pub const fn micros(&self) -> u64 {
        self.0
    }

    pub const fn is_indefinite(&self) -> bool {
        self.0 == u64::MAX
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The finite duration this deadline allows, or `None` for
    /// [`INDEFINITE`](Deadline::INDEFINITE).
    pub fn as_duration(&self) -> Option<Duration> {
        if self.is_indefinite() {
            None
        } else {
            Some(Duration::from_micros(self.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_nonzero_and_monotonic() {
        let first = time_ticks_now();
        assert_ne!(first, 0);
        let second = time_ticks_now();
        assert!(second >= first);
    }

    #[test]
    fn indefinite_has_no_duration() {
        assert!(Deadline::INDEFINITE.is_indefinite());
        assert_eq!(Deadline::INDEFINITE.as_duration(), None);
        assert_eq!(
            Deadline::from_micros(2_500).as_duration(),
            Some(Duration::from_micros(2_500))
        );
        assert!(Deadline::ZERO.is_zero());
    }
}
