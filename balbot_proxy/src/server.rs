//! TCP side of the proxy: one monitoring client at a time.
//!
//! The control loop must never wait on the network, so the listener and
//! the client socket run non-blocking and all transfers are best-effort
//! per tick. Telemetry that cannot be sent right away is kept in a
//! growable backlog and retried next tick, preserving record order, so a
//! temporarily congested link loses nothing. Only the handshake directly
//! after accept is blocking; at that point no client was being served
//! anyway.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Instant;

use balbot_common::records::{
    ControlRecord, TelemetryRecord, WireRecord, CONTROL_RECORD_SIZE,
};
use balbot_common::wire::Handshake;
use tracing::{info, warn};

use crate::error::ProxyError;

/// Telemetry/control server for the monitoring client.
pub struct Server {
    listener: TcpListener,
    client: Option<TcpStream>,
    /// Unsent telemetry, oldest first.
    send_buffer: Vec<u8>,
    recv_buffer: Box<[u8; CONTROL_RECORD_SIZE]>,
    recv_pos: usize,
}

impl Server {
    pub fn bind(port: u16) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        info!(port = listener.local_addr()?.port(), "listening for monitor client");
        Ok(Self {
            listener,
            client: None,
            send_buffer: Vec::new(),
            recv_buffer: Box::new([0; CONTROL_RECORD_SIZE]),
            recv_pos: 0,
        })
    }

    /// Bound address, mainly useful when binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// One network tick: accept, apply received control, stream telemetry.
    pub fn update(&mut self, tel: &mut TelemetryRecord, control: &mut ControlRecord) {
        let started = Instant::now();

        if self.client.is_none() {
            self.try_accept(control);
        }
        self.drain_control(control);
        if self.client.is_some() {
            self.send_buffer.extend_from_slice(tel.as_bytes());
            self.flush(control);
        }

        tel.delta_time_network_us = started.elapsed().as_micros() as u32;
    }

    pub fn close(&mut self, control: &mut ControlRecord) {
        self.disconnect(control);
    }

    /// Accept a pending connection and run the blocking handshake: the
    /// size header followed by one control-record snapshot, then switch
    /// the socket to non-blocking for steady state.
    fn try_accept(&mut self, control: &ControlRecord) {
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!(error = %e, "accept failed");
                return;
            }
        };
        if let Err(e) = Self::handshake(&stream, control) {
            warn!(peer = %peer, error = %e, "handshake failed");
            return;
        }
        info!(peer = %peer, "monitor client connected");
        self.client = Some(stream);
    }

    fn handshake(mut stream: &TcpStream, control: &ControlRecord) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.write_all(&Handshake::local().encode())?;
        stream.write_all(control.as_bytes())?;
        stream.set_nonblocking(true)
    }

    /// Apply received control snapshots; only complete records count.
    fn drain_control(&mut self, control: &mut ControlRecord) {
        while let Some(stream) = self.client.as_mut() {
            match stream.read(&mut self.recv_buffer[self.recv_pos..]) {
                Ok(0) => {
                    self.disconnect(control);
                }
                Ok(n) => {
                    self.recv_pos += n;
                    if self.recv_pos == CONTROL_RECORD_SIZE {
                        control.read_bytes(&self.recv_buffer[..]);
                        self.recv_pos = 0;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "recv failed");
                    self.disconnect(control);
                }
            }
        }
    }

    /// Best-effort send of the whole backlog; the unsent tail stays
    /// queued for the next tick.
    fn flush(&mut self, control: &mut ControlRecord) {
        while !self.send_buffer.is_empty() {
            let stream = match self.client.as_mut() {
                Some(stream) => stream,
                None => return,
            };
            match stream.write(&self.send_buffer) {
                Ok(0) => {
                    warn!(pending = self.send_buffer.len(), "send made no progress");
                    self.disconnect(control);
                }
                Ok(n) => {
                    self.send_buffer.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "send failed");
                    self.disconnect(control);
                }
            }
        }
    }

    /// Drop the client and release buffers. Motors are stopped through
    /// the control record when the policy flag asks for it; the device
    /// loop picks the change up on its next tick.
    fn disconnect(&mut self, control: &mut ControlRecord) {
        if self.client.take().is_some() {
            info!("monitor client disconnected");
            if control.stop_motors_on_disconnect != 0 {
                for axis in control.axes.iter_mut() {
                    axis.enable_motor = 0;
                }
            }
        }
        self.send_buffer.clear();
        self.send_buffer.shrink_to_fit();
        self.recv_pos = 0;
    }
}
