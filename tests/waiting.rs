// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Blocking waits: timeouts, multi-handle waits, and cancellation.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use axon_ipc::{Core, Deadline, Error, HandleSignals, SignalsState};

#[test]
fn wait_times_out_within_bounds() {
    let core = Core::new();
    let (h0, h1) = core.create_message_pipe(None).unwrap();

    let deadline_micros = 50_000u64;
    let start = Instant::now();
    let result = core.wait(
        h1,
        HandleSignals::READABLE,
        Deadline::from_micros(deadline_micros),
        None,
    );
    let elapsed = start.elapsed();

    assert_eq!(result, Err(Error::DeadlineExceeded));
    assert!(elapsed >= Duration::from_micros(deadline_micros));
    // Allow generous scheduling slack, but it must not hang.
    assert!(elapsed < Duration::from_secs(5));

    core.close(h0).unwrap();
    core.close(h1).unwrap();
}

#[test]
fn cross_thread_write_wakes_a_parked_wait() {
    let core = Arc::new(Core::new());
    let (h0, h1) = core.create_message_pipe(None).unwrap();

    let writer_core = Arc::clone(&core);
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(25));
        writer_core
            .write_message(h0, b"wake", &[], Default::default())
            .unwrap();
    });

    let mut state = SignalsState::empty();
    core.wait(
        h1,
        HandleSignals::READABLE,
        Deadline::INDEFINITE,
        Some(&mut state),
    )
    .unwrap();
    assert!(state.satisfies(HandleSignals::READABLE));
    assert!(state.satisfiable.contains(state.satisfied));

    writer.join().unwrap();
    core.close(h0).unwrap();
    core.close(h1).unwrap();
}

#[test]
fn closing_a_waited_handle_cancels_the_wait() {
    let core = Arc::new(Core::new());
    let (h0, h1) = core.create_message_pipe(None).unwrap();

    let closer_core = Arc::clone(&core);
    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(25));
        closer_core.close(h1).unwrap();
    });

    let result = core.wait(h1, HandleSignals::READABLE, Deadline::INDEFINITE, None);
    assert_eq!(result, Err(Error::Cancelled));

    closer.join().unwrap();
    core.close(h0).unwrap();
}

#[test]
fn wait_many_returns_the_ready_index() {
    let core = Core::new();
    let (a0, a1) = core.create_message_pipe(None).unwrap();
    let (b0, b1) = core.create_message_pipe(None).unwrap();

    // Both initially idle; make the second one readable.
    core.write_message(b0, b"second", &[], Default::default())
        .unwrap();

    let mut index = usize::MAX;
    let mut states = [SignalsState::empty(); 2];
    core.wait_many(
        &[a1, b1],
        &[HandleSignals::READABLE, HandleSignals::READABLE],
        Deadline::INDEFINITE,
        Some(&mut index),
        Some(&mut states),
    )
    .unwrap();
    assert_eq!(index, 1);
    assert!(states[1].satisfies(HandleSignals::READABLE));
    assert!(!states[0].satisfies(HandleSignals::READABLE));
    for state in states {
        assert!(state.satisfiable.contains(state.satisfied));
    }

    for handle in [a0, a1, b0, b1] {
        core.close(handle).unwrap();
    }
}

#[test]
fn wait_many_wakes_on_the_first_event() {
    let core = Arc::new(Core::new());
    let (a0, a1) = core.create_message_pipe(None).unwrap();
    let (b0, b1) = core.create_message_pipe(None).unwrap();

    let writer_core = Arc::clone(&core);
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(25));
        writer_core
            .write_message(a0, b"first wins", &[], Default::default())
            .unwrap();
    });

    let mut index = usize::MAX;
    core.wait_many(
        &[a1, b1],
        &[HandleSignals::READABLE, HandleSignals::READABLE],
        Deadline::INDEFINITE,
        Some(&mut index),
        None,
    )
    .unwrap();
    assert_eq!(index, 0);

    writer.join().unwrap();
    for handle in [a0, a1, b0, b1] {
        core.close(handle).unwrap();
    }
}

#[test]
fn wait_many_unsatisfiable_reports_failed_precondition() {
    let core = Core::new();
    let (a0, a1) = core.create_message_pipe(None).unwrap();
    core.close(a0).unwrap();

    let mut index = usize::MAX;
    let result = core.wait_many(
        &[a1],
        &[HandleSignals::READABLE],
        Deadline::INDEFINITE,
        Some(&mut index),
        None,
    );
    assert_eq!(result, Err(Error::FailedPrecondition));
    assert_eq!(index, 0);
    core.close(a1).unwrap();
}

#[test]
fn wait_many_timeout_leaves_result_index_untouched() {
    let core = Core::new();
    let (a0, a1) = core.create_message_pipe(None).unwrap();

    let mut index = usize::MAX;
    let mut states = [SignalsState::empty(); 1];
    let result = core.wait_many(
        &[a1],
        &[HandleSignals::READABLE],
        Deadline::from_micros(10_000),
        Some(&mut index),
        Some(&mut states),
    );
    assert_eq!(result, Err(Error::DeadlineExceeded));
    assert_eq!(index, usize::MAX);
    // Final states are still reported on timeout.
    assert!(states[0].satisfies(HandleSignals::WRITABLE));

    core.close(a0).unwrap();
    core.close(a1).unwrap();
}

#[test]
fn wait_many_accepts_duplicate_handles() {
    let core = Core::new();
    let (a0, a1) = core.create_message_pipe(None).unwrap();
    core.write_message(a0, b"x", &[], Default::default())
        .unwrap();

    let mut index = usize::MAX;
    core.wait_many(
        &[a1, a1],
        &[HandleSignals::WRITABLE, HandleSignals::READABLE],
        Deadline::INDEFINITE,
        Some(&mut index),
        None,
    )
    .unwrap();
    // The first entry is already satisfied.
    assert_eq!(index, 0);

    core.close(a0).unwrap();
    core.close(a1).unwrap();
}

#[test]
fn zero_deadline_polls_without_parking() {
    let core = Core::new();
    let (a0, a1) = core.create_message_pipe(None).unwrap();

    let start = Instant::now();
    assert_eq!(
        core.wait(a1, HandleSignals::READABLE, Deadline::ZERO, None),
        Err(Error::DeadlineExceeded)
    );
    assert!(start.elapsed() < Duration::from_secs(1));

    // A zero deadline still sees an already-satisfied signal.
    core.write_message(a0, b"x", &[], Default::default())
        .unwrap();
    core.wait(a1, HandleSignals::READABLE, Deadline::ZERO, None)
        .unwrap();

    core.close(a0).unwrap();
    core.close(a1).unwrap();
}

#[test]
fn many_threads_wait_on_the_same_pipe() {
    let core = Arc::new(Core::new());
    let (h0, h1) = core.create_message_pipe(None).unwrap();

    let mut waiters = Vec::new();
    for _ in 0..4 {
        let waiter_core = Arc::clone(&core);
        waiters.push(thread::spawn(move || {
            waiter_core.wait(h1, HandleSignals::READABLE, Deadline::INDEFINITE, None)
        }));
    }

    thread::sleep(Duration::from_millis(20));
    core.write_message(h0, b"all of you", &[], Default::default())
        .unwrap();

    // The message stays queued, so every waiter sees READABLE satisfied.
    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), Ok(()));
    }

    core.close(h0).unwrap();
    core.close(h1).unwrap();
}
