//! Monitoring-client half of the network protocol.
//!
//! A visualization front end links this module to talk to the proxy: it
//! connects, validates the size handshake, receives the initial control
//! snapshot, then each frame drains the telemetry stream and pushes the
//! control record back whenever its change counter moved.
//!
//! The connect and handshake phase is blocking (bounded by timeouts); the
//! steady state is non-blocking so a stalled link never stalls the UI.
//!
//! A short control write marks the record as sent and retains the unsent
//! tail, which flushes before anything new goes on the wire. The committed
//! bytes are already-serialized record content, so delivery is identical to
//! holding the counter back and resending the whole record.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::records::{ControlRecord, TelemetryRecord, WireRecord, CONTROL_RECORD_SIZE, TELEMETRY_RECORD_SIZE};
use crate::wire::{Handshake, HANDSHAKE_LEN};

/// Client-side protocol errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    /// The proxy was compiled against different record layouts. Fatal for
    /// this connection; there is no renegotiation.
    #[error(
        "record size mismatch: peer telemetry={peer_telemetry} control={peer_control}, \
         local telemetry={local_telemetry} control={local_control}"
    )]
    VersionMismatch {
        peer_telemetry: u32,
        peer_control: u32,
        local_telemetry: u32,
        local_control: u32,
    },

    /// The proxy closed the connection.
    #[error("proxy closed the connection")]
    PeerClosed,
}

/// Connection to a running proxy.
pub struct ProxyClient {
    stream: TcpStream,
    recv_buf: Box<[u8; TELEMETRY_RECORD_SIZE]>,
    recv_pos: usize,
    /// Control-record counter value last committed to the stream; `None`
    /// forces one send after connect.
    sent_counter: Option<u32>,
    /// Unsent tail of a short control write, retained for the next tick.
    pending: Vec<u8>,
}

impl ProxyClient {
    /// Connect to a proxy, run the handshake and read the initial control
    /// snapshot into `control`.
    pub fn connect(
        addr: SocketAddr,
        timeout: Duration,
        control: &mut ControlRecord,
    ) -> Result<Self, ClientError> {
        let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let mut header = [0u8; HANDSHAKE_LEN];
        stream.read_exact(&mut header)?;
        let handshake = Handshake::decode(&header);
        if !handshake.matches_local() {
            let local = Handshake::local();
            return Err(ClientError::VersionMismatch {
                peer_telemetry: handshake.telemetry_size,
                peer_control: handshake.control_size,
                local_telemetry: local.telemetry_size,
                local_control: local.control_size,
            });
        }

        let mut snapshot = [0u8; CONTROL_RECORD_SIZE];
        stream.read_exact(&mut snapshot)?;
        control.read_bytes(&snapshot);

        stream.set_read_timeout(None)?;
        stream.set_nonblocking(true)?;
        info!(%addr, "connected to proxy");

        Ok(Self {
            stream,
            recv_buf: Box::new([0u8; TELEMETRY_RECORD_SIZE]),
            recv_pos: 0,
            sent_counter: None,
            pending: Vec::new(),
        })
    }

    /// One client tick: drain complete telemetry records into
    /// `on_telemetry`, then send the control record if its counter moved.
    ///
    /// Returns [`ClientError::PeerClosed`] when the proxy hung up; the
    /// caller drops the client and reconnects explicitly.
    pub fn update(
        &mut self,
        control: &ControlRecord,
        mut on_telemetry: impl FnMut(&TelemetryRecord),
    ) -> Result<(), ClientError> {
        self.drain_telemetry(&mut on_telemetry)?;
        self.flush_pending()?;
        self.send_control(control)?;
        Ok(())
    }

    fn drain_telemetry(
        &mut self,
        on_telemetry: &mut impl FnMut(&TelemetryRecord),
    ) -> Result<(), ClientError> {
        loop {
            match self.stream.read(&mut self.recv_buf[self.recv_pos..]) {
                Ok(0) => return Err(ClientError::PeerClosed),
                Ok(n) => {
                    self.recv_pos += n;
                    if self.recv_pos == TELEMETRY_RECORD_SIZE {
                        let mut record = TelemetryRecord::default();
                        record.read_bytes(&self.recv_buf[..]);
                        self.recv_pos = 0;
                        on_telemetry(&record);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Retry the unsent tail of a previous short write before anything new
    /// goes on the wire, so record boundaries stay intact.
    fn flush_pending(&mut self) -> Result<(), ClientError> {
        while !self.pending.is_empty() {
            match self.stream.write(&self.pending) {
                Ok(0) => return Err(ClientError::PeerClosed),
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn send_control(&mut self, control: &ControlRecord) -> Result<(), ClientError> {
        if !self.pending.is_empty() || self.sent_counter == Some(control.counter) {
            return Ok(());
        }
        let bytes = control.as_bytes();
        match self.stream.write(bytes) {
            Ok(0) => Err(ClientError::PeerClosed),
            Ok(n) => {
                // Bytes are committed to the stream, so the record counts
                // as sent; a short write just leaves its tail pending.
                if n < bytes.len() {
                    warn!(sent = n, size = bytes.len(), "short control write, retaining tail");
                    self.pending.extend_from_slice(&bytes[n..]);
                }
                self.sent_counter = Some(control.counter);
                Ok(())
            }
            // Would block with nothing written: the counter stays
            // unadvanced and the whole record is retried next tick.
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
