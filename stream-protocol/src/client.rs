//! Best-effort TCP delivery to the consumer.
//!
//! The client never blocks its caller. Connecting is fire-and-forget: a
//! non-blocking `connect` is issued and the socket is used straight away.
//! Whether the handshake finished is only learned from the next write:
//!
//! ```text
//! Disconnected ──send/ensure_connected──▶ Pending (connecting or connected)
//!      ▲                                        │
//!      └──────── write error (not WouldBlock) ──┘
//! ```
//!
//! There is no retry timer and no backoff. A failed write drops the socket
//! and the following `send` reconnects, so there is at most one connect
//! attempt per message. Nothing is queued: a message that cannot be written
//! immediately is dropped.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, info, warn};

/// Whether a socket currently exists. "Connecting" and "connected" are one
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Pending,
}

/// Result of a single [`StreamClient::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Bytes accepted by the kernel. A short write is reported, not resumed.
    Sent(usize),
    /// Kernel buffer full or handshake still in flight; message dropped.
    Dropped,
    /// Write failed; the socket was closed and the next send reconnects.
    ConnectionLost,
    /// No socket could be opened for this message.
    Unavailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub connect_attempts: u64,
    pub write_attempts: u64,
    pub sent: u64,
    pub dropped: u64,
    pub connection_losses: u64,
}

// ── StreamClient ─────────────────────────────────────────────────────────────

pub struct StreamClient {
    target: SocketAddr,
    stream: Option<TcpStream>,
    /// Last write reached the kernel. Only used to keep state-change logs quiet.
    last_send_ok: bool,
    stats: StreamStats,
}

impl StreamClient {
    /// Create a disconnected client for `target`. Nothing is opened yet.
    pub fn new(target: SocketAddr) -> Self {
        StreamClient {
            target,
            stream: None,
            last_send_ok: false,
            stats: StreamStats::default(),
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn state(&self) -> ConnectionState {
        if self.stream.is_some() {
            ConnectionState::Pending
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn last_send_ok(&self) -> bool {
        self.last_send_ok
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Open a socket and issue a non-blocking connect if none exists.
    ///
    /// A connect that is still in progress counts as success.
    pub fn ensure_connected(&mut self) -> ConnectionState {
        if self.stream.is_some() {
            return ConnectionState::Pending;
        }

        self.stats.connect_attempts += 1;
        match open_nonblocking(self.target) {
            Ok(stream) => {
                debug!(addr = %self.target, "stream connect issued");
                self.stream = Some(stream);
            }
            Err(e) => {
                debug!(addr = %self.target, error = %e, "stream connect failed");
            }
        }
        self.state()
    }

    /// Write `message` in one call. Never blocks and never fails loudly.
    pub fn send(&mut self, message: &str) -> SendOutcome {
        if self.ensure_connected() == ConnectionState::Disconnected {
            self.last_send_ok = false;
            self.stats.dropped += 1;
            return SendOutcome::Unavailable;
        }
        let Some(stream) = self.stream.as_mut() else {
            return SendOutcome::Unavailable;
        };

        self.stats.write_attempts += 1;
        match stream.write(message.as_bytes()) {
            Ok(n) => {
                if n < message.len() {
                    debug!(written = n, len = message.len(), "short write, remainder dropped");
                }
                if !self.last_send_ok {
                    info!(addr = %self.target, "streaming to consumer");
                }
                self.last_send_ok = true;
                self.stats.sent += 1;
                SendOutcome::Sent(n)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.stats.dropped += 1;
                SendOutcome::Dropped
            }
            Err(e) => {
                if self.last_send_ok {
                    warn!(addr = %self.target, error = %e, "consumer connection lost");
                } else {
                    debug!(addr = %self.target, error = %e, "send failed");
                }
                self.close();
                self.last_send_ok = false;
                self.stats.connection_losses += 1;
                SendOutcome::ConnectionLost
            }
        }
    }

    /// Drop the socket if one is open. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Socket helpers ───────────────────────────────────────────────────────────

fn open_nonblocking(target: SocketAddr) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(target), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    match socket.connect(&SockAddr::from(target)) {
        Ok(()) => {}
        Err(e) if connect_in_progress(&e) => {}
        Err(e) => return Err(e),
    }
    Ok(socket.into())
}

fn connect_in_progress(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    false
}

// ── Tests ─────────────────────────────────────────────────────────────────────
