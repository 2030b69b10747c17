//! RREF subscriptions on X-Plane's UDP data interface.
//!
//! A subscription is a `RREF\0` command naming a dataref, the index the
//! client wants it reported under, and a rate in Hz. X-Plane answers with
//! `RREF,` datagrams holding `(index, value)` pairs. Rate 0 cancels.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use crate::error::UdpBridgeError;

/// Fixed, NUL-padded path field in a `RREF\0` command.
pub const RREF_PATH_LEN: usize = 400;

const COMMAND_PREFIX: &[u8] = b"RREF\0";
const REPLY_PREFIX: &[u8] = b"RREF,";
const PAIR_LEN: usize = 8;

/// Values in `(SNAP_BELOW_ZERO, 0)` are reported as 0.
const SNAP_BELOW_ZERO: f32 = -0.001;

/// Build a subscribe (or, with `freq == 0`, unsubscribe) command.
pub fn encode_command(freq: i32, index: i32, path: &str) -> Result<Vec<u8>, UdpBridgeError> {
    // One byte is kept for the terminator.
    if path.len() >= RREF_PATH_LEN {
        return Err(UdpBridgeError::PathTooLong { len: path.len(), max: RREF_PATH_LEN - 1 });
    }
    let mut out = Vec::with_capacity(COMMAND_PREFIX.len() + 8 + RREF_PATH_LEN);
    out.extend_from_slice(COMMAND_PREFIX);
    out.extend_from_slice(&freq.to_le_bytes());
    out.extend_from_slice(&index.to_le_bytes());
    out.extend_from_slice(path.as_bytes());
    out.resize(COMMAND_PREFIX.len() + 8 + RREF_PATH_LEN, 0);
    Ok(out)
}

/// Decode an `RREF,` reply. `None` for any other datagram.
///
/// A trailing partial pair is ignored.
pub fn parse_reply(packet: &[u8]) -> Option<Vec<(i32, f32)>> {
    let body = packet.strip_prefix(REPLY_PREFIX)?;
    let pairs = body
        .chunks_exact(PAIR_LEN)
        .map(|c| {
            let index = i32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            let value = f32::from_le_bytes([c[4], c[5], c[6], c[7]]);
            (index, snap(value))
        })
        .collect();
    Some(pairs)
}

/// Build an `RREF,` reply; what X-Plane would send.
pub fn encode_reply(pairs: &[(i32, f32)]) -> Vec<u8> {
    let mut out = REPLY_PREFIX.to_vec();
    for (index, value) in pairs {
        out.extend_from_slice(&index.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn snap(value: f32) -> f32 {
    if value < 0.0 && value > SNAP_BELOW_ZERO { 0.0 } else { value }
}

// ── Subscription table ────────────────────────────────────────────────────────

/// Index allocation and latest values for the active subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    next_index: i32,
    by_index:   HashMap<i32, String>,
    by_path:    HashMap<String, i32>,
    values:     HashMap<i32, f32>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `path`, allocating a fresh one if it is not subscribed.
    pub fn register(&mut self, path: &str) -> i32 {
        if let Some(&index) = self.by_path.get(path) {
            return index;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.by_index.insert(index, path.to_string());
        self.by_path.insert(path.to_string(), index);
        index
    }

    /// Forget `path` and its last value. Returns the index it had.
    pub fn remove(&mut self, path: &str) -> Option<i32> {
        let index = self.by_path.remove(path)?;
        self.by_index.remove(&index);
        self.values.remove(&index);
        Some(index)
    }

    /// Record a reported value. Unknown indices are dropped.
    pub fn store(&mut self, index: i32, value: f32) -> bool {
        if self.by_index.contains_key(&index) {
            self.values.insert(index, value);
            true
        } else {
            false
        }
    }

    /// Latest value for `path`, if one has arrived since subscribing.
    pub fn get(&self, path: &str) -> Option<f32> {
        self.by_path.get(path).and_then(|index| self.values.get(index)).copied()
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, i32)> {
        self.by_path.iter().map(|(p, &i)| (p.as_str(), i))
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// The datagram channel to one X-Plane instance.
pub trait RrefSocket {
    fn send_command(&mut self, command: &[u8]) -> io::Result<()>;

    /// Non-blocking receive; `Ok(None)` when nothing is queued.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Non-blocking UDP socket on an ephemeral port, talking to `target`.
pub struct UdpRrefSocket {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpRrefSocket {
    pub fn open(target: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_nonblocking(true)?;
        Ok(UdpRrefSocket { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl RrefSocket for UdpRrefSocket {
    fn send_command(&mut self, command: &[u8]) -> io::Result<()> {
        self.socket.send_to(command, self.target).map(|_| ())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.recv_from(buf) {
            Ok((n, _)) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Test implementation: records commands, replays queued datagrams.
#[derive(Debug, Default)]
pub struct MockRrefSocket {
    pub sent:  Vec<Vec<u8>>,
    pub inbox: VecDeque<Vec<u8>>,
}

/// A `RREF\0` command as seen by [`MockRrefSocket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub freq:  i32,
    pub index: i32,
    pub path:  String,
}

impl MockRrefSocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&mut self, pairs: &[(i32, f32)]) {
        self.inbox.push_back(encode_reply(pairs));
    }

    /// Sent commands, decoded.
    pub fn commands(&self) -> Vec<SentCommand> {
        self.sent
            .iter()
            .filter_map(|c| {
                let body = c.strip_prefix(COMMAND_PREFIX)?;
                let freq = i32::from_le_bytes(body.get(0..4)?.try_into().ok()?);
                let index = i32::from_le_bytes(body.get(4..8)?.try_into().ok()?);
                let raw = body.get(8..)?;
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                let path = String::from_utf8_lossy(&raw[..end]).into_owned();
                Some(SentCommand { freq, index, path })
            })
            .collect()
    }

    /// Index of the most recent subscription to `path`.
    pub fn index_of(&self, path: &str) -> Option<i32> {
        self.commands()
            .into_iter()
            .rev()
            .find(|c| c.path == path && c.freq > 0)
            .map(|c| c.index)
    }
}

impl RrefSocket for MockRrefSocket {
    fn send_command(&mut self, command: &[u8]) -> io::Result<()> {
        self.sent.push(command.to_vec());
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.inbox.pop_front() {
            Some(packet) => {
                let n = packet.len().min(buf.len());
                buf[..n].copy_from_slice(&packet[..n]);
                Ok(Some(n))
            }
            None => Ok(None),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_layout() {
        let cmd = encode_command(10, 3, "sim/time/paused").unwrap();
        assert_eq!(cmd.len(), 5 + 4 + 4 + 400);
        assert_eq!(&cmd[..5], b"RREF\0");
        assert_eq!(&cmd[5..9], &10i32.to_le_bytes());
        assert_eq!(&cmd[9..13], &3i32.to_le_bytes());
        assert_eq!(&cmd[13..28], b"sim/time/paused");
        assert!(cmd[28..].iter().all(|&b| b == 0));
    }

    #[test]
    fn overlong_path_is_rejected() {
        let path = "x".repeat(400);
        assert!(matches!(
            encode_command(1, 0, &path),
            Err(UdpBridgeError::PathTooLong { len: 400, max: 399 }),
        ));
        assert!(encode_command(1, 0, &path[..399]).is_ok());
    }

    #[test]
    fn reply_pairs_are_decoded_and_snapped() {
        let mut packet = encode_reply(&[(0, 51.5), (1, -0.0005), (2, -0.5)]);
        packet.extend_from_slice(&[1, 2, 3]);
        let pairs = parse_reply(&packet).unwrap();
        assert_eq!(pairs, vec![(0, 51.5), (1, 0.0), (2, -0.5)]);
    }

    #[test]
    fn non_reply_packets_are_ignored() {
        assert_eq!(parse_reply(b"BECN\0..."), None);
        assert_eq!(parse_reply(b"RREF,"), Some(Vec::new()));
    }

    #[test]
    fn table_allocates_once_and_forgets_on_remove() {
        let mut table = SubscriptionTable::new();
        let a = table.register("a");
        let b = table.register("b");
        assert_eq!(table.register("a"), a);
        assert_ne!(a, b);

        assert!(table.store(a, 2.0));
        assert!(!table.store(99, 1.0));
        assert_eq!(table.get("a"), Some(2.0));
        assert_eq!(table.get("b"), None);

        assert_eq!(table.remove("a"), Some(a));
        assert_eq!(table.get("a"), None);
        assert!(!table.store(a, 3.0));
        assert_eq!(table.len(), 1);

        // Fresh index after removal.
        assert_ne!(table.register("a"), a);
    }

    #[test]
    fn mock_decodes_what_it_was_sent() {
        let mut mock = MockRrefSocket::new();
        mock.send_command(&encode_command(1, 7, "sim/aircraft/view/acf_ICAO[0]").unwrap()).unwrap();
        mock.send_command(&encode_command(0, 7, "sim/aircraft/view/acf_ICAO[0]").unwrap()).unwrap();
        assert_eq!(
            mock.commands()[1],
            SentCommand { freq: 0, index: 7, path: "sim/aircraft/view/acf_ICAO[0]".into() },
        );
        assert_eq!(mock.index_of("sim/aircraft/view/acf_ICAO[0]"), Some(7));
    }

    #[test]
    fn udp_socket_round_trips_on_loopback() {
        let xplane = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut sock = UdpRrefSocket::open(xplane.local_addr().unwrap()).unwrap();
        let mut buf = [0u8; 2048];
        assert_eq!(sock.try_recv(&mut buf).unwrap(), None);

        sock.send_command(&encode_command(1, 0, "sim/time/paused").unwrap()).unwrap();
        let (n, from) = xplane.recv_from(&mut buf).unwrap();
        assert_eq!(n, 413);

        let port = sock.local_addr().unwrap().port();
        assert_eq!(from.port(), port);
        xplane.send_to(&encode_reply(&[(0, 1.0)]), ("127.0.0.1", port)).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if let Some(n) = sock.try_recv(&mut buf).unwrap() {
                assert_eq!(parse_reply(&buf[..n]), Some(vec![(0, 1.0)]));
                break;
            }
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }
}
