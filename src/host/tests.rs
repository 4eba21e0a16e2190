//! End-to-end tests of the coordinator against the in-memory controller.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::*;
use crate::att::opcode;
use crate::core::{
    AttributeServer, HCI_ACL_DATA_PKT, HostError, L2CAP_CID_ATT, L2CAP_CID_SMP, TrySendError,
};
use crate::gap::{AdvertisingConfig, GapEvent, GapState};
use crate::hci::{Command, ConnHandle, Event, Frame, LeConnection, Opcode, Role, status};
use crate::transport::{ControllerHandle, MemoryTransport};

const HANDLE: ConnHandle = ConnHandle::new(0x0040);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn config() -> HostConfigBuilder {
    HostConfigBuilder::new()
        .poll_timeout(Duration::from_millis(10))
        .reset_timeout(Duration::from_millis(500))
}

fn started(config: HostConfig) -> (Host<MemoryTransport>, ControllerHandle) {
    init_tracing();
    let (transport, controller) = MemoryTransport::new();
    controller.acknowledge_commands();
    let host = Host::new(transport, config).unwrap();
    host.start().unwrap();
    (host, controller)
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn reset_frame() -> Vec<u8> {
    Command::Reset.encode().unwrap().as_bytes().to_vec()
}

fn connection_complete(handle: ConnHandle) -> Event {
    Event::LeConnectionComplete(LeConnection {
        status: status::SUCCESS,
        handle,
        role: Role::Peripheral,
        peer_address_type: 0,
        peer_address: [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
        interval: 24,
        latency: 0,
        supervision_timeout: 400,
    })
}

/// Unfragmented ACL packet as a controller would deliver it.
fn acl_packet(handle: ConnHandle, channel: u16, payload: &[u8]) -> Vec<u8> {
    let l2cap_len = payload.len() as u16;
    let acl_len = l2cap_len + 4;
    let word = handle.raw() | 0x2000;
    let mut packet = vec![HCI_ACL_DATA_PKT];
    packet.extend_from_slice(&word.to_le_bytes());
    packet.extend_from_slice(&acl_len.to_le_bytes());
    packet.extend_from_slice(&l2cap_len.to_le_bytes());
    packet.extend_from_slice(&channel.to_le_bytes());
    packet.extend_from_slice(payload);
    packet
}

fn connect(host: &Host<MemoryTransport>, controller: &ControllerHandle) {
    controller.inject_event(&connection_complete(HANDLE));
    assert!(matches!(
        host.next_event_timeout(Duration::from_secs(1)),
        Some(GapEvent::Connected(_))
    ));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_start_resets_controller() {
    init_tracing();
    let (transport, controller) = MemoryTransport::new();
    controller.acknowledge_commands();
    let host = Host::new(transport, config().reset_timeout(Duration::from_secs(2)).build().unwrap())
        .unwrap();
    assert_eq!(host.phase(), HostPhase::Created);

    let start = Instant::now();
    host.start().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(host.is_running());
    assert_eq!(host.state(), GapState::Idle);
    assert_eq!(controller.written(), vec![reset_frame()]);

    host.stop();
    assert_eq!(host.phase(), HostPhase::Stopped);
}

#[test]
fn test_reset_is_single_and_skips_unrelated_packets() {
    init_tracing();
    let (transport, controller) = MemoryTransport::new();
    // Stale traffic left over from before the reset.
    controller.inject_event(&connection_complete(HANDLE));
    controller.inject(acl_packet(HANDLE, L2CAP_CID_ATT, &[opcode::EXCHANGE_MTU_REQ, 0x00, 0x01]));
    controller.acknowledge_commands();

    let host = Host::new(transport, config().build().unwrap()).unwrap();
    host.start().unwrap();

    assert_eq!(controller.pending_inbound(), 0);
    assert_eq!(host.state(), GapState::Idle);
    assert_eq!(host.connection_handle(), None);
    assert_eq!(host.next_event_timeout(Duration::from_millis(50)), None);

    // Nothing but the one reset reached the controller.
    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.written(), vec![reset_frame()]);
}

#[test]
fn test_reset_timeout_leaves_host_restartable() {
    init_tracing();
    let (transport, controller) = MemoryTransport::new();
    let host = Host::new(
        transport,
        config().reset_timeout(Duration::from_millis(50)).build().unwrap(),
    )
    .unwrap();

    assert!(matches!(host.start(), Err(HostError::ResetTimeout(_))));
    assert_eq!(host.phase(), HostPhase::Created);

    controller.acknowledge_commands();
    host.start().unwrap();
    assert!(host.is_running());
}

#[test]
fn test_reset_failure_status() {
    init_tracing();
    let (transport, controller) = MemoryTransport::new();
    controller.set_responder(|_| {
        vec![
            Event::CommandComplete {
                num_hci_packets: 1,
                opcode: Opcode::RESET,
                status: status::COMMAND_DISALLOWED,
            }
            .to_packet(),
        ]
    });
    let host = Host::new(transport, config().build().unwrap()).unwrap();
    assert!(matches!(
        host.start(),
        Err(HostError::ResetFailed(status::COMMAND_DISALLOWED))
    ));
    assert_eq!(host.phase(), HostPhase::Created);
}

#[test]
fn test_lifecycle_misuse() {
    let (host, _controller) = started(config().build().unwrap());
    assert!(matches!(host.start(), Err(HostError::AlreadyRunning)));

    host.stop();
    host.stop();
    assert!(matches!(host.start(), Err(HostError::Stopped)));
    assert!(matches!(
        host.send_data(HANDLE, L2CAP_CID_ATT, &[1]),
        Err(HostError::NotRunning)
    ));
    assert!(matches!(
        host.start_advertising(&AdvertisingConfig::default()),
        Err(HostError::NotRunning)
    ));
}

#[test]
fn test_api_before_start() {
    let (transport, _controller) = MemoryTransport::new();
    let host = Host::new(transport, config().build().unwrap()).unwrap();
    assert!(matches!(host.stop_advertising(), Err(HostError::NotRunning)));
    assert!(matches!(host.notify(HANDLE, 3, &[1]), Err(HostError::NotRunning)));
    assert_eq!(host.try_next_event(), None);

    // Stopping a never-started host closes the event queue.
    host.stop();
    assert_eq!(host.phase(), HostPhase::Stopped);
    assert_eq!(host.next_event(), None);
}

#[test]
fn test_invalid_config_rejected() {
    let (transport, _controller) = MemoryTransport::new();
    let config = HostConfig {
        acl_fragment_size: 0,
        ..HostConfig::default()
    };
    assert!(matches!(
        Host::new(transport, config),
        Err(HostError::Config(_))
    ));
}

#[test]
fn test_concurrent_stop() {
    let (host, _controller) = started(config().build().unwrap());
    let host = Arc::new(host);

    let stoppers: Vec<_> = (0..2)
        .map(|_| {
            let host = Arc::clone(&host);
            thread::spawn(move || host.stop())
        })
        .collect();
    for stopper in stoppers {
        stopper.join().unwrap();
    }
    assert_eq!(host.phase(), HostPhase::Stopped);
}

#[test]
fn test_stop_is_bounded_when_transport_stalls() {
    let (host, controller) = started(config().build().unwrap());
    controller.set_writable(false);
    host.send_data(HANDLE, L2CAP_CID_ATT, &[0u8; 64]).unwrap();
    thread::sleep(Duration::from_millis(30));

    let start = Instant::now();
    host.stop();
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_stop_is_bounded_when_idle() {
    let (host, _controller) = started(config().build().unwrap());
    let start = Instant::now();
    host.stop();
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_stop_wakes_blocked_consumer() {
    let (host, _controller) = started(config().build().unwrap());
    let host = Arc::new(host);

    let consumer = {
        let host = Arc::clone(&host);
        thread::spawn(move || host.next_event())
    };
    thread::sleep(Duration::from_millis(30));
    host.stop();
    assert_eq!(consumer.join().unwrap(), None);
}

#[test]
fn test_events_survive_stop() {
    let (host, controller) = started(config().build().unwrap());
    controller.inject_event(&connection_complete(HANDLE));
    controller.inject_event(&Event::DisconnectionComplete {
        status: status::SUCCESS,
        handle: HANDLE,
        reason: status::REMOTE_USER_TERMINATED,
    });
    assert!(wait_until(Duration::from_secs(1), || host.shared.events.len() == 2));

    host.stop();
    assert!(matches!(host.next_event(), Some(GapEvent::Connected(_))));
    assert_eq!(
        host.try_next_event(),
        Some(GapEvent::Disconnected {
            handle: HANDLE,
            reason: status::REMOTE_USER_TERMINATED
        })
    );
    assert_eq!(host.next_event(), None);
}

#[test]
fn test_drop_stops_loops() {
    let (host, controller) = started(config().build().unwrap());
    let shared = Arc::clone(&host.shared);
    drop(host);
    assert!(shared.tx.is_closed());
    assert!(shared.events.is_closed());
    // Only the test holds the shared state once both loops have exited.
    assert_eq!(Arc::strong_count(&shared), 1);
    drop(controller);
}

// =============================================================================
// GAP
// =============================================================================

#[test]
fn test_advertising_round_trip() {
    let (host, controller) = started(config().build().unwrap());
    host.start_advertising(&AdvertisingConfig::with_name("ble-host"))
        .unwrap();
    assert_eq!(host.state(), GapState::Advertising);

    assert!(controller.wait_for_written(5, Duration::from_secs(1)));
    let opcodes: Vec<u16> = controller.written()[1..]
        .iter()
        .map(|f| u16::from_le_bytes([f[1], f[2]]))
        .collect();
    assert_eq!(
        opcodes,
        vec![
            Opcode::LE_SET_ADV_PARAMS.raw(),
            Opcode::LE_SET_ADV_DATA.raw(),
            Opcode::LE_SET_SCAN_RSP_DATA.raw(),
            Opcode::LE_SET_ADV_ENABLE.raw(),
        ]
    );
    assert_eq!(
        host.next_event_timeout(Duration::from_secs(1)),
        Some(GapEvent::AdvertisingStarted)
    );

    host.stop_advertising().unwrap();
    assert_eq!(
        host.next_event_timeout(Duration::from_secs(1)),
        Some(GapEvent::AdvertisingStopped)
    );
    assert!(matches!(
        host.stop_advertising(),
        Err(HostError::Gap(_))
    ));
}

#[test]
fn test_connect_and_disconnect() {
    let (host, controller) = started(config().build().unwrap());
    connect(&host, &controller);
    assert_eq!(host.state(), GapState::Connected);
    assert_eq!(host.connection_handle(), Some(HANDLE));

    controller.take_written();
    host.disconnect(HANDLE, status::REMOTE_USER_TERMINATED).unwrap();
    assert_eq!(host.state(), GapState::Disconnecting);
    assert!(controller.wait_for_written(1, Duration::from_secs(1)));
    assert_eq!(
        controller.written()[0],
        hex::decode("01060403400013").unwrap()
    );

    controller.inject_event(&Event::DisconnectionComplete {
        status: status::SUCCESS,
        handle: HANDLE,
        reason: status::LOCAL_HOST_TERMINATED,
    });
    assert_eq!(
        host.next_event_timeout(Duration::from_secs(1)),
        Some(GapEvent::Disconnected {
            handle: HANDLE,
            reason: status::LOCAL_HOST_TERMINATED
        })
    );
    assert_eq!(host.state(), GapState::Idle);
}

#[test]
fn test_stop_flushes_queued_disconnect() {
    let (host, controller) = started(config().build().unwrap());
    connect(&host, &controller);
    controller.take_written();

    host.disconnect(HANDLE, status::REMOTE_USER_TERMINATED).unwrap();
    host.stop();

    assert_eq!(
        controller.written(),
        vec![hex::decode("01060403400013").unwrap()]
    );
}

#[cfg(feature = "async")]
#[tokio::test]
async fn test_event_stream_wakes_on_event_and_stop() {
    let (host, controller) = started(config().build().unwrap());
    let mut events = host.event_stream();

    controller.inject_event(&connection_complete(HANDLE));
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap();
    assert!(matches!(event, Some(GapEvent::Connected(_))));

    host.stop();
    let end = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap();
    assert_eq!(end, None);
}

#[test]
fn test_full_queue_drops_reactive_commands() {
    let (host, controller) = started(config().tx_queue_capacity(4).build().unwrap());

    let adv = AdvertisingConfig::default().restart_on_disconnect(true);
    host.start_advertising(&adv).unwrap();
    assert!(controller.wait_for_written(5, Duration::from_secs(1)));
    assert_eq!(
        host.next_event_timeout(Duration::from_secs(1)),
        Some(GapEvent::AdvertisingStarted)
    );
    connect(&host, &controller);

    // Stall the link and fill the outbound queue.
    controller.set_writable(false);
    let filler = Frame::from_slice(&[0x01, 0x03, 0x0c, 0x00]).unwrap();
    let start = Instant::now();
    loop {
        match host.shared.tx.try_send(filler.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => break,
            Err(TrySendError::Closed(_)) => panic!("queue closed"),
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    // The disconnect makes GAP re-issue the four advertising commands.
    controller.inject_event(&Event::DisconnectionComplete {
        status: status::SUCCESS,
        handle: HANDLE,
        reason: status::REMOTE_USER_TERMINATED,
    });
    assert_eq!(
        host.next_event_timeout(Duration::from_secs(1)),
        Some(GapEvent::Disconnected {
            handle: HANDLE,
            reason: status::REMOTE_USER_TERMINATED
        })
    );
    assert_eq!(host.stats().dropped_commands, 4);

    // The read loop keeps going.
    controller.inject(vec![0x04, 0x57, 0x00]);
    assert!(controller.wait_for_drained(Duration::from_secs(1)));
    assert!(wait_until(Duration::from_secs(1), || host.stats().packets_read >= 7));

    let start = Instant::now();
    host.stop();
    assert!(start.elapsed() < Duration::from_millis(500));
}

// =============================================================================
// Data path
// =============================================================================

#[test]
fn test_send_data_fragments() {
    let (host, controller) = started(config().acl_fragment_size(251).build().unwrap());
    let payload: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
    host.send_data(HANDLE, L2CAP_CID_ATT, &payload).unwrap();

    assert!(controller.wait_for_written(4, Duration::from_secs(1)));
    let frames = controller.written();
    assert_eq!(frames.len(), 4);

    let bodies: Vec<&[u8]> = vec![&frames[1][9..], &frames[2][5..], &frames[3][5..]];
    assert_eq!(
        bodies.iter().map(|b| b.len()).collect::<Vec<_>>(),
        vec![251, 251, 98]
    );
    assert_eq!(bodies.concat(), payload);

    // L2CAP header carries the full SDU length on the first fragment only.
    assert_eq!(&frames[1][5..9], &[0x58, 0x02, 0x04, 0x00]);
    assert_eq!(frames[2][2] >> 4, 0b01);
    // the reset bypasses the write loop
    assert!(wait_until(Duration::from_secs(1), || host.stats().frames_written == 3));
}

#[test]
fn test_empty_send_data() {
    let (host, controller) = started(config().build().unwrap());
    host.send_data(HANDLE, L2CAP_CID_ATT, &[]).unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.written().len(), 1);
}

#[test]
fn test_notify_and_indicate() {
    let (host, controller) = started(config().build().unwrap());
    host.notify(HANDLE, 0x0003, &[0x2a]).unwrap();
    host.indicate(HANDLE, 0x0005, &[]).unwrap();

    assert!(controller.wait_for_written(3, Duration::from_secs(1)));
    let frames = controller.written();
    assert_eq!(frames[1], hex::decode("0240000800040004001b03002a").unwrap());
    assert_eq!(frames[2], hex::decode("0240000700030004001d0500").unwrap());
}

#[test]
fn test_mtu_exchange_through_default_server() {
    let (host, controller) = started(config().build().unwrap());
    controller.take_written();
    controller.inject(acl_packet(
        HANDLE,
        L2CAP_CID_ATT,
        &[opcode::EXCHANGE_MTU_REQ, 0x00, 0x02],
    ));

    assert!(controller.wait_for_written(1, Duration::from_secs(1)));
    // ACL start, 7 bytes; L2CAP 3 bytes on CID 4; MTU response 247
    assert_eq!(
        controller.written()[0],
        hex::decode("02400007000300040003f700").unwrap()
    );
    drop(host);
}

#[test]
fn test_att_responses_served_while_streaming_notifications() {
    let (host, controller) = started(config().tx_queue_capacity(64).build().unwrap());
    let host = Arc::new(host);
    controller.take_written();
    let mtu_response = hex::decode("02400007000300040003f700").unwrap();

    let streaming = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let notifier = {
        let host = Arc::clone(&host);
        let streaming = Arc::clone(&streaming);
        thread::spawn(move || {
            let mut sent = 0u32;
            while streaming.load(std::sync::atomic::Ordering::Relaxed) {
                host.notify(HANDLE, 0x0003, &[0u8; 20]).unwrap();
                sent += 1;
                thread::sleep(Duration::from_micros(50));
            }
            sent
        })
    };

    let mut responses = 0;
    for i in 1..=100 {
        controller.inject(acl_packet(
            HANDLE,
            L2CAP_CID_ATT,
            &[opcode::EXCHANGE_MTU_REQ, 0x00, 0x02],
        ));
        assert!(wait_until(Duration::from_secs(1), || {
            responses += controller
                .take_written()
                .iter()
                .filter(|frame| **frame == mtu_response)
                .count();
            responses == i
        }));
    }

    streaming.store(false, std::sync::atomic::Ordering::Relaxed);
    assert!(notifier.join().unwrap() > 0);
    assert_eq!(host.stats().dropped_att_responses, 0);
}

struct LargeResponder;

impl AttributeServer for LargeResponder {
    fn handle_pdu(&mut self, _: ConnHandle, request: &[u8], response: &mut [u8]) -> Option<usize> {
        if request.first() != Some(&opcode::READ_REQ) {
            return None;
        }
        for (i, byte) in response[..300].iter_mut().enumerate() {
            *byte = i as u8;
        }
        Some(300)
    }
}

#[test]
fn test_att_response_is_fragmented() {
    init_tracing();
    let (transport, controller) = MemoryTransport::new();
    controller.acknowledge_commands();
    let host = Host::with_attribute_server(
        transport,
        config().acl_fragment_size(247).build().unwrap(),
        LargeResponder,
    )
    .unwrap();
    host.start().unwrap();
    controller.take_written();

    controller.inject(acl_packet(HANDLE, L2CAP_CID_ATT, &[opcode::READ_REQ, 0x03, 0x00]));
    assert!(controller.wait_for_written(2, Duration::from_secs(1)));
    thread::sleep(Duration::from_millis(30));

    let frames = controller.written();
    assert_eq!(frames.len(), 2);
    // first: PB 00, ACL length 251 = 4 + 247, L2CAP length 300
    assert_eq!(&frames[0][..9], &[0x02, 0x40, 0x00, 0xfb, 0x00, 0x2c, 0x01, 0x04, 0x00]);
    // second: PB 01, 53 bytes
    assert_eq!(&frames[1][..5], &[0x02, 0x40, 0x10, 0x35, 0x00]);

    let mut joined = frames[0][9..].to_vec();
    joined.extend_from_slice(&frames[1][5..]);
    let expected: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
    assert_eq!(joined, expected);
}

#[test]
fn test_unknown_channel_and_bad_packets_are_skipped() {
    let (host, controller) = started(config().build().unwrap());
    controller.take_written();

    controller.inject(acl_packet(HANDLE, L2CAP_CID_SMP, &[0x01, 0x02]));
    controller.inject(acl_packet(HANDLE, 0x0040, &[0x01]));
    controller.inject(vec![0x03, 0x00, 0x00, 0x00]);
    controller.inject(vec![0x04, 0x0e, 0x09, 0x01]);
    controller.inject(vec![0x02, 0x40, 0x20, 0x09, 0x00, 0x01]);
    controller.inject(vec![0x02, 0x40, 0x10, 0x01, 0x00, 0x01]);
    controller.inject(vec![0xff]);

    assert!(wait_until(Duration::from_secs(1), || {
        let stats = host.stats();
        stats.ignored_packets == 4 && stats.decode_errors == 3
    }));
    assert_eq!(host.stats().packets_read, 7);

    // Still serving after the garbage.
    connect(&host, &controller);
    assert!(controller.written().is_empty());
}
