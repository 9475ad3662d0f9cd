// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Axon IPC Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Data pipe streaming through `Core`.

use axon_ipc::{
    Core, CreateDataPipeOptions, DataPipeConsumerOptions, Deadline, Error, HandleSignals,
    ReadDataFlags, WriteDataFlags,
};

fn small_pipe(core: &Core, element: u32, capacity: u32) -> (axon_ipc::HandleValue, axon_ipc::HandleValue) {
    let options = CreateDataPipeOptions {
        element_num_bytes: element,
        capacity_num_bytes: capacity,
        ..Default::default()
    };
    core.create_data_pipe(Some(&options)).unwrap()
}

#[test]
fn stream_round_trips_bytes() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 1, 32);

    assert_eq!(
        core.write_data(producer, b"streaming", WriteDataFlags::empty()),
        Ok(9)
    );

    let mut buffer = [0u8; 9];
    let mut num_bytes = 9u32;
    core.read_data(
        consumer,
        Some(&mut buffer),
        &mut num_bytes,
        ReadDataFlags::empty(),
    )
    .unwrap();
    assert_eq!(num_bytes, 9);
    assert_eq!(&buffer, b"streaming");

    core.close(producer).unwrap();
    core.close(consumer).unwrap();
}

#[test]
fn capacity_backpressure() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 1, 4);

    assert_eq!(
        core.write_data(producer, b"abcdef", WriteDataFlags::empty()),
        Ok(4)
    );
    assert_eq!(
        core.write_data(producer, b"x", WriteDataFlags::empty()),
        Err(Error::ShouldWait)
    );
    assert_eq!(
        core.write_data(producer, b"xy", WriteDataFlags::ALL_OR_NONE),
        Err(Error::OutOfRange)
    );

    // Draining restores writability.
    let mut buffer = [0u8; 2];
    let mut num_bytes = 2u32;
    core.read_data(
        consumer,
        Some(&mut buffer),
        &mut num_bytes,
        ReadDataFlags::empty(),
    )
    .unwrap();
    assert_eq!(
        core.write_data(producer, b"gh", WriteDataFlags::ALL_OR_NONE),
        Ok(2)
    );

    core.close(producer).unwrap();
    core.close(consumer).unwrap();
}

#[test]
fn query_peek_discard() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 1, 32);
    core.write_data(producer, b"abcdef", WriteDataFlags::empty())
        .unwrap();

    let mut num_bytes = 0u32;
    core.read_data(consumer, None, &mut num_bytes, ReadDataFlags::QUERY)
        .unwrap();
    assert_eq!(num_bytes, 6);

    let mut buffer = [0u8; 2];
    let mut num_bytes = 2u32;
    core.read_data(
        consumer,
        Some(&mut buffer),
        &mut num_bytes,
        ReadDataFlags::PEEK,
    )
    .unwrap();
    assert_eq!(&buffer, b"ab");

    let mut num_bytes = 4u32;
    core.read_data(consumer, None, &mut num_bytes, ReadDataFlags::DISCARD)
        .unwrap();
    assert_eq!(num_bytes, 4);

    let mut buffer = [0u8; 2];
    let mut num_bytes = 2u32;
    core.read_data(
        consumer,
        Some(&mut buffer),
        &mut num_bytes,
        ReadDataFlags::empty(),
    )
    .unwrap();
    assert_eq!(&buffer, b"ef");

    core.close(producer).unwrap();
    core.close(consumer).unwrap();
}

#[test]
fn element_alignment_is_enforced_end_to_end() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 4, 16);

    assert_eq!(
        core.write_data(producer, b"abc", WriteDataFlags::empty()),
        Err(Error::InvalidArgument)
    );
    core.write_data(producer, b"abcd1234", WriteDataFlags::empty())
        .unwrap();

    let mut buffer = [0u8; 6];
    let mut num_bytes = 6u32;
    assert_eq!(
        core.read_data(
            consumer,
            Some(&mut buffer),
            &mut num_bytes,
            ReadDataFlags::empty(),
        ),
        Err(Error::InvalidArgument)
    );

    core.close(producer).unwrap();
    core.close(consumer).unwrap();
}

#[test]
fn two_phase_write_and_read_via_core() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 1, 16);

    let (buffer, max) = core.begin_write_data(producer, Default::default()).unwrap();
    assert_eq!(max, 16);
    unsafe {
        std::ptr::copy_nonoverlapping(b"zero-copy".as_ptr(), buffer, 9);
    }
    core.end_write_data(producer, 9).unwrap();

    let (buffer, max) = core.begin_read_data(consumer, Default::default()).unwrap();
    assert_eq!(max, 9);
    let mut seen = vec![0u8; 9];
    unsafe {
        std::ptr::copy_nonoverlapping(buffer, seen.as_mut_ptr(), 9);
    }
    core.end_read_data(consumer, 9).unwrap();
    assert_eq!(seen, b"zero-copy");

    core.close(producer).unwrap();
    core.close(consumer).unwrap();
}

#[test]
fn two_phase_begin_rejects_flags() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 1, 16);
    assert_eq!(
        core.begin_write_data(producer, WriteDataFlags::ALL_OR_NONE)
            .err(),
        Some(Error::InvalidArgument)
    );
    assert_eq!(
        core.begin_read_data(consumer, ReadDataFlags::PEEK).err(),
        Some(Error::InvalidArgument)
    );
    assert_eq!(
        core.begin_read_data(consumer, ReadDataFlags::QUERY).err(),
        Some(Error::InvalidArgument)
    );
    core.close(producer).unwrap();
    core.close(consumer).unwrap();
}

#[test]
fn single_shot_is_busy_during_two_phase() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 1, 16);
    core.write_data(producer, b"seed", WriteDataFlags::empty())
        .unwrap();

    let _ = core.begin_write_data(producer, Default::default()).unwrap();
    assert_eq!(
        core.write_data(producer, b"x", WriteDataFlags::empty()),
        Err(Error::Busy)
    );

    let _ = core.begin_read_data(consumer, Default::default()).unwrap();
    let mut buffer = [0u8; 1];
    let mut num_bytes = 1u32;
    assert_eq!(
        core.read_data(
            consumer,
            Some(&mut buffer),
            &mut num_bytes,
            ReadDataFlags::empty(),
        ),
        Err(Error::Busy)
    );

    core.end_write_data(producer, 0).unwrap();
    core.end_read_data(consumer, 0).unwrap();
    core.close(producer).unwrap();
    core.close(consumer).unwrap();
}

#[test]
fn producer_close_drains_then_fails() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 1, 16);
    core.write_data(producer, b"last", WriteDataFlags::empty())
        .unwrap();
    core.close(producer).unwrap();

    core.wait(consumer, HandleSignals::READABLE, Deadline::ZERO, None)
        .unwrap();

    let mut buffer = [0u8; 4];
    let mut num_bytes = 4u32;
    core.read_data(
        consumer,
        Some(&mut buffer),
        &mut num_bytes,
        ReadDataFlags::empty(),
    )
    .unwrap();
    assert_eq!(&buffer, b"last");

    let mut num_bytes = 1u32;
    assert_eq!(
        core.read_data(
            consumer,
            Some(&mut [0u8; 1]),
            &mut num_bytes,
            ReadDataFlags::empty(),
        ),
        Err(Error::FailedPrecondition)
    );
    core.close(consumer).unwrap();
}

#[test]
fn consumer_close_makes_writes_fail() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 1, 16);
    core.close(consumer).unwrap();
    assert_eq!(
        core.write_data(producer, b"x", WriteDataFlags::empty()),
        Err(Error::FailedPrecondition)
    );
    core.wait(producer, HandleSignals::PEER_CLOSED, Deadline::ZERO, None)
        .unwrap();
    core.close(producer).unwrap();
}

#[test]
fn read_threshold_controls_the_signal_and_options_round_trip() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 2, 16);

    let options = DataPipeConsumerOptions {
        read_threshold_num_bytes: 6,
        ..Default::default()
    };
    core.set_data_pipe_consumer_options(consumer, Some(&options))
        .unwrap();
    assert_eq!(
        core.get_data_pipe_consumer_options(consumer)
            .unwrap()
            .read_threshold_num_bytes,
        6
    );

    core.write_data(producer, b"abcd", WriteDataFlags::empty())
        .unwrap();
    assert_eq!(
        core.wait(consumer, HandleSignals::READ_THRESHOLD, Deadline::ZERO, None),
        Err(Error::DeadlineExceeded)
    );
    core.write_data(producer, b"ef", WriteDataFlags::empty())
        .unwrap();
    core.wait(consumer, HandleSignals::READ_THRESHOLD, Deadline::ZERO, None)
        .unwrap();

    // An unaligned threshold is rejected.
    let bad = DataPipeConsumerOptions {
        read_threshold_num_bytes: 3,
        ..Default::default()
    };
    assert_eq!(
        core.set_data_pipe_consumer_options(consumer, Some(&bad)),
        Err(Error::InvalidArgument)
    );

    core.close(producer).unwrap();
    core.close(consumer).unwrap();
}

#[test]
fn producer_rights_do_not_open_consumer_operations() {
    let core = Core::new();
    let (producer, consumer) = small_pipe(&core, 1, 16);

    // A producer handle has WRITE but its dispatcher has no consumer
    // operations: argument error rather than permission error.
    let mut num_bytes = 0u32;
    assert_eq!(
        core.read_data(producer, None, &mut num_bytes, ReadDataFlags::QUERY),
        Err(Error::InvalidArgument)
    );
    // A consumer handle lacks WRITE and its dispatcher has no producer
    // operations either.
    assert_eq!(
        core.write_data(consumer, b"x", WriteDataFlags::empty()),
        Err(Error::InvalidArgument)
    );

    core.close(producer).unwrap();
    core.close(consumer).unwrap();
}
