// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Wait sets driven through `Core`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use axon_ipc::{
    Core, Deadline, Error, HandleRights, HandleSignals, HandleValue, SignalsState, WaitSetResult,
};

fn wait_collect(
    core: &Core,
    wait_set: HandleValue,
    deadline: Deadline,
) -> axon_ipc::Result<(Vec<WaitSetResult>, u32)> {
    let mut results = [WaitSetResult {
        cookie: 0,
        result: Ok(()),
        signals_state: SignalsState::empty(),
    }; 8];
    let mut num_results = 8u32;
    let mut max_results = 0u32;
    core.wait_set_wait(
        wait_set,
        deadline,
        &mut results,
        &mut num_results,
        Some(&mut max_results),
    )?;
    Ok((results[..num_results as usize].to_vec(), max_results))
}

#[test]
fn wait_set_reports_ready_members_by_cookie() {
    let core = Core::new();
    let wait_set = core.create_wait_set(None).unwrap();
    let (a0, a1) = core.create_message_pipe(None).unwrap();
    let (b0, b1) = core.create_message_pipe(None).unwrap();

    core.wait_set_add(wait_set, a1, HandleSignals::READABLE, 100, None)
        .unwrap();
    core.wait_set_add(wait_set, b1, HandleSignals::READABLE, 200, None)
        .unwrap();

    assert_eq!(
        wait_collect(&core, wait_set, Deadline::from_micros(10_000)).unwrap_err(),
        Error::DeadlineExceeded
    );

    core.write_message(b0, b"second pipe", &[], Default::default())
        .unwrap();
    let (results, total) = wait_collect(&core, wait_set, Deadline::INDEFINITE).unwrap();
    assert_eq!(total, 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].cookie, 200);
    assert_eq!(results[0].result, Ok(()));
    assert!(results[0].signals_state.satisfies(HandleSignals::READABLE));

    for handle in [wait_set, a0, a1, b0, b1] {
        core.close(handle).unwrap();
    }
}

#[test]
fn duplicate_cookie_and_unknown_cookie() {
    let core = Core::new();
    let wait_set = core.create_wait_set(None).unwrap();
    let (_a0, a1) = core.create_message_pipe(None).unwrap();

    core.wait_set_add(wait_set, a1, HandleSignals::READABLE, 5, None)
        .unwrap();
    assert_eq!(
        core.wait_set_add(wait_set, a1, HandleSignals::WRITABLE, 5, None),
        Err(Error::AlreadyExists)
    );
    assert_eq!(core.wait_set_remove(wait_set, 6), Err(Error::NotFound));
    core.wait_set_remove(wait_set, 5).unwrap();
    assert_eq!(core.wait_set_remove(wait_set, 5), Err(Error::NotFound));

    core.close(wait_set).unwrap();
}

#[test]
fn wait_set_wakes_a_parked_waiter() {
    let core = Arc::new(Core::new());
    let wait_set = core.create_wait_set(None).unwrap();
    let (a0, a1) = core.create_message_pipe(None).unwrap();
    core.wait_set_add(wait_set, a1, HandleSignals::READABLE, 1, None)
        .unwrap();

    let writer_core = Arc::clone(&core);
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(25));
        writer_core
            .write_message(a0, b"wake the set", &[], Default::default())
            .unwrap();
    });

    let (results, _) = wait_collect(&core, wait_set, Deadline::INDEFINITE).unwrap();
    assert_eq!(results[0].cookie, 1);
    writer.join().unwrap();

    for handle in [wait_set, a0, a1] {
        core.close(handle).unwrap();
    }
}

#[test]
fn closing_a_member_reports_cancelled() {
    let core = Core::new();
    let wait_set = core.create_wait_set(None).unwrap();
    let (a0, a1) = core.create_message_pipe(None).unwrap();
    core.wait_set_add(wait_set, a1, HandleSignals::READABLE, 77, None)
        .unwrap();

    core.close(a1).unwrap();
    let (results, _) = wait_collect(&core, wait_set, Deadline::INDEFINITE).unwrap();
    assert_eq!(results[0].cookie, 77);
    assert_eq!(results[0].result, Err(Error::Cancelled));

    core.close(wait_set).unwrap();
    core.close(a0).unwrap();
}

#[test]
fn unsatisfiable_member_reports_failed_precondition() {
    let core = Core::new();
    let wait_set = core.create_wait_set(None).unwrap();
    let (a0, a1) = core.create_message_pipe(None).unwrap();
    core.wait_set_add(wait_set, a1, HandleSignals::READABLE, 3, None)
        .unwrap();

    core.close(a0).unwrap();
    let (results, _) = wait_collect(&core, wait_set, Deadline::INDEFINITE).unwrap();
    assert_eq!(results[0].result, Err(Error::FailedPrecondition));

    core.close(wait_set).unwrap();
    core.close(a1).unwrap();
}

#[test]
fn wait_set_needs_write_to_add_and_read_to_wait() {
    let core = Core::new();
    let wait_set = core.create_wait_set(None).unwrap();
    let (_a0, a1) = core.create_message_pipe(None).unwrap();

    let no_write = core
        .replace_handle_with_reduced_rights(wait_set, HandleRights::WRITE)
        .unwrap();
    assert_eq!(
        core.wait_set_add(no_write, a1, HandleSignals::READABLE, 1, None),
        Err(Error::PermissionDenied)
    );

    let no_read = core
        .replace_handle_with_reduced_rights(no_write, HandleRights::READ)
        .unwrap();
    let mut num_results = 0u32;
    assert_eq!(
        core.wait_set_wait(no_read, Deadline::ZERO, &mut [], &mut num_results, None),
        Err(Error::PermissionDenied)
    );

    core.close(no_read).unwrap();
}

#[test]
fn wait_sets_cannot_be_transferred() {
    let core = Core::new();
    let (m0, m1) = core.create_message_pipe(None).unwrap();
    let wait_set = core.create_wait_set(None).unwrap();

    // Wait sets are created without the TRANSFER right.
    assert_eq!(
        core.write_message(m0, b"", &[wait_set], Default::default()),
        Err(Error::PermissionDenied)
    );

    for handle in [m0, m1, wait_set] {
        core.close(handle).unwrap();
    }
}

#[test]
fn waiting_on_a_member_after_removal_times_out() {
    let core = Core::new();
    let wait_set = core.create_wait_set(None).unwrap();
    let (a0, a1) = core.create_message_pipe(None).unwrap();

    core.wait_set_add(wait_set, a1, HandleSignals::READABLE, 9, None)
        .unwrap();
    core.write_message(a0, b"x", &[], Default::default())
        .unwrap();
    assert_eq!(
        wait_collect(&core, wait_set, Deadline::ZERO).unwrap().1,
        1
    );

    core.wait_set_remove(wait_set, 9).unwrap();
    assert_eq!(
        wait_collect(&core, wait_set, Deadline::from_micros(5_000)).unwrap_err(),
        Error::DeadlineExceeded
    );

    for handle in [wait_set, a0, a1] {
        core.close(handle).unwrap();
    }
}
