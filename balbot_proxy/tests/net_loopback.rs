//! Server/client protocol tests over a real loopback socket.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use balbot_common::client::{ClientError, ProxyClient};
use balbot_common::records::{
    ControlRecord, TelemetryRecord, WireRecord, CONTROL_RECORD_SIZE, TELEMETRY_RECORD_SIZE,
};
use balbot_common::wire::{Handshake, HANDSHAKE_LEN};
use balbot_proxy::server::Server;

const TICK: Duration = Duration::from_millis(1);
const DEADLINE: Duration = Duration::from_secs(5);

fn bind_server() -> (Server, std::net::SocketAddr) {
    let server = Server::bind(0).unwrap_or_else(|e| panic!("bind failed: {e}"));
    let addr = server.local_addr().unwrap_or_else(|e| panic!("no addr: {e}"));
    (server, addr)
}

#[test]
fn handshake_carries_record_sizes_and_snapshot() {
    let (mut server, addr) = bind_server();
    let mut tel = TelemetryRecord::default();
    let mut control = ControlRecord::default();
    control.target_tick_ms = 7.0;

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(DEADLINE))
            .unwrap();
        let mut header = [0u8; HANDSHAKE_LEN];
        stream.read_exact(&mut header).unwrap();
        let mut snapshot = [0u8; CONTROL_RECORD_SIZE];
        stream.read_exact(&mut snapshot).unwrap();
        (Handshake::decode(&header), snapshot)
    });

    // Tick the server until the peer thread has what it needs.
    while !peer.is_finished() {
        server.update(&mut tel, &mut control);
        thread::sleep(TICK);
    }
    let (handshake, snapshot) = peer.join().unwrap();
    assert_eq!(handshake.telemetry_size as usize, TELEMETRY_RECORD_SIZE);
    assert_eq!(handshake.control_size as usize, CONTROL_RECORD_SIZE);
    let mut received = ControlRecord::default();
    received.read_bytes(&snapshot);
    assert_eq!(received.target_tick_ms, 7.0);
}

#[test]
fn mismatched_record_sizes_reject_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    // A peer compiled against a different telemetry layout.
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut bogus = Handshake::local();
        bogus.telemetry_size += 8;
        stream.write_all(&bogus.encode()).unwrap();
        // Hold the socket open until the client has read the header.
        thread::sleep(Duration::from_millis(100));
    });

    let mut control = ControlRecord::default();
    let result = ProxyClient::connect(addr, DEADLINE, &mut control);
    peer.join().unwrap();

    match result {
        Err(ClientError::VersionMismatch {
            peer_telemetry,
            local_telemetry,
            ..
        }) => assert_eq!(peer_telemetry, local_telemetry + 8),
        Err(other) => panic!("expected a size mismatch, got {other}"),
        Ok(_) => panic!("a mismatched handshake must not connect"),
    }
}

#[test]
fn telemetry_streams_in_order_and_control_updates_apply() {
    let (mut server, addr) = bind_server();
    let mut tel = TelemetryRecord::default();
    let mut control = ControlRecord::default();
    // Keep the eventual hang-up from clearing the enable flags under test.
    control.stop_motors_on_disconnect = 0;

    let peer = thread::spawn(move || {
        let mut control = ControlRecord::default();
        let mut client =
            ProxyClient::connect(addr, DEADLINE, &mut control).unwrap_or_else(|e| panic!("{e}"));

        // Request motion; the counter bump schedules exactly one send.
        control.axes[0].enable_motor = 1;
        control.counter += 1;

        let mut ticks = Vec::new();
        let deadline = Instant::now() + DEADLINE;
        while ticks.len() < 20 && Instant::now() < deadline {
            client
                .update(&control, |t| ticks.push(t.tick))
                .unwrap_or_else(|e| panic!("{e}"));
            thread::sleep(TICK);
        }
        ticks
    });

    let deadline = Instant::now() + DEADLINE;
    while !peer.is_finished() && Instant::now() < deadline {
        server.update(&mut tel, &mut control);
        tel.tick = tel.tick.wrapping_add(1);
        thread::sleep(TICK);
    }
    let ticks = peer.join().unwrap();

    assert!(ticks.len() >= 20);
    for pair in ticks.windows(2) {
        assert_eq!(pair[1], pair[0] + 1, "telemetry out of order");
    }
    assert_eq!(control.axes[0].enable_motor, 1);
    assert_eq!(control.counter, 1);
}

#[test]
fn partial_control_record_is_not_applied() {
    let (mut server, addr) = bind_server();
    let mut tel = TelemetryRecord::default();
    let mut control = ControlRecord::default();

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(DEADLINE)).unwrap();
        let mut header = [0u8; HANDSHAKE_LEN];
        stream.read_exact(&mut header).unwrap();
        let mut snapshot = [0u8; CONTROL_RECORD_SIZE];
        stream.read_exact(&mut snapshot).unwrap();

        let mut edited = ControlRecord::default();
        edited.counter = 9;
        edited.axes[1].enable_motor = 1;
        edited.stop_motors_on_disconnect = 0;
        let bytes = edited.as_bytes().to_vec();

        // First half only; the live record must stay untouched.
        stream.write_all(&bytes[..CONTROL_RECORD_SIZE / 2]).unwrap();
        thread::sleep(Duration::from_millis(50));
        stream.write_all(&bytes[CONTROL_RECORD_SIZE / 2..]).unwrap();
        // Keep the socket open long enough for the server to drain it.
        thread::sleep(Duration::from_millis(100));
    });

    let mut saw_partial_pause = false;
    let deadline = Instant::now() + DEADLINE;
    while !peer.is_finished() && Instant::now() < deadline {
        server.update(&mut tel, &mut control);
        if control.counter == 0 {
            saw_partial_pause = true;
        }
        thread::sleep(TICK);
    }
    server.update(&mut tel, &mut control);
    peer.join().unwrap();

    assert!(saw_partial_pause, "half a record must not change anything");
    assert_eq!(control.counter, 9);
    assert_eq!(control.axes[1].enable_motor, 1);
}

#[test]
fn backlog_preserves_records_across_a_slow_reader() {
    let (mut server, addr) = bind_server();
    let mut tel = TelemetryRecord::default();
    let mut control = ControlRecord::default();
    control.stop_motors_on_disconnect = 0;

    let peer = thread::spawn(move || {
        let mut control = ControlRecord::default();
        let mut client =
            ProxyClient::connect(addr, DEADLINE, &mut control).unwrap_or_else(|e| panic!("{e}"));

        // Do not read anything while the server keeps producing.
        thread::sleep(Duration::from_millis(200));

        let mut ticks = Vec::new();
        let deadline = Instant::now() + DEADLINE;
        while ticks.len() < 50 && Instant::now() < deadline {
            client
                .update(&control, |t| ticks.push(t.tick))
                .unwrap_or_else(|e| panic!("{e}"));
            thread::sleep(TICK);
        }
        ticks
    });

    let deadline = Instant::now() + DEADLINE;
    while !peer.is_finished() && Instant::now() < deadline {
        server.update(&mut tel, &mut control);
        tel.tick = tel.tick.wrapping_add(1);
        thread::sleep(TICK);
    }
    let ticks = peer.join().unwrap();

    assert!(ticks.len() >= 50);
    // Every record produced while the reader stalled arrives, in order.
    for pair in ticks.windows(2) {
        assert_eq!(pair[1], pair[0] + 1);
    }
}

#[test]
fn disconnect_applies_motor_stop_policy() {
    let (mut server, addr) = bind_server();
    let mut tel = TelemetryRecord::default();
    let mut control = ControlRecord::default();
    control.stop_motors_on_disconnect = 1;
    control.axes[0].enable_motor = 1;

    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(DEADLINE)).unwrap();
        let mut header = [0u8; HANDSHAKE_LEN];
        stream.read_exact(&mut header).unwrap();
        let mut snapshot = [0u8; CONTROL_RECORD_SIZE];
        stream.read_exact(&mut snapshot).unwrap();
        // Hang up without sending anything.
    });

    let deadline = Instant::now() + DEADLINE;
    while control.axes[0].enable_motor != 0 && Instant::now() < deadline {
        server.update(&mut tel, &mut control);
        thread::sleep(TICK);
    }
    peer.join().unwrap();
    assert_eq!(control.axes[0].enable_motor, 0);
}
