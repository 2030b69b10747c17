//! X-Plane discovery through the `BECN` multicast beacon.
//!
//! Every running X-Plane announces itself on 239.255.1.1:49707 about once a
//! second. The beacon carries the port its UDP data interface listens on;
//! the sender address of the datagram is the host.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};

use crate::error::UdpBridgeError;

pub const BEACON_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 1, 1);
pub const BEACON_PORT: u16 = 49707;
pub const BEACON_TIMEOUT: Duration = Duration::from_secs(5);

const BEACON_PREFIX: &[u8] = b"BECN\0";
/// Prefix + major, minor, host id, version, role, port.
const BEACON_FIXED_LEN: usize = 21;

const SUPPORTED_MAJOR: u8 = 1;
const MAX_SUPPORTED_MINOR: u8 = 2;
/// Application host id 1 is X-Plane itself (2 would be PlaneMaker).
const HOST_XPLANE: i32 = 1;

/// A decoded `BECN` packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub host:     IpAddr,
    pub port:     u16,
    pub hostname: String,
    /// e.g. 120014 for 12.0.14.
    pub version:  i32,
    /// 1 master, 2 external visual, 3 IOS.
    pub role:     u32,
}

impl Beacon {
    /// Where RREF commands go.
    pub fn data_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Decode a beacon datagram received from `sender`.
pub fn parse_beacon(packet: &[u8], sender: IpAddr) -> Result<Beacon, UdpBridgeError> {
    if !packet.starts_with(BEACON_PREFIX) {
        return Err(UdpBridgeError::NotABeacon);
    }
    if packet.len() < BEACON_FIXED_LEN {
        return Err(UdpBridgeError::TruncatedBeacon { len: packet.len() });
    }

    let major = packet[5];
    let minor = packet[6];
    let host_id = i32::from_le_bytes([packet[7], packet[8], packet[9], packet[10]]);
    if major != SUPPORTED_MAJOR || minor > MAX_SUPPORTED_MINOR || host_id != HOST_XPLANE {
        return Err(UdpBridgeError::UnsupportedBeacon { major, minor, host: host_id });
    }

    let version = i32::from_le_bytes([packet[11], packet[12], packet[13], packet[14]]);
    let role = u32::from_le_bytes([packet[15], packet[16], packet[17], packet[18]]);
    let port = u16::from_le_bytes([packet[19], packet[20]]);

    let name = &packet[BEACON_FIXED_LEN..];
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    let hostname = String::from_utf8_lossy(&name[..end]).into_owned();

    Ok(Beacon { host: sender, port, hostname, version, role })
}

/// Bind the beacon port with `SO_REUSEADDR` and join the multicast group.
///
/// Address reuse lets several listeners share the port on one machine.
pub fn open_beacon_socket() -> Result<UdpSocket, UdpBridgeError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, BEACON_PORT)).into())?;
    socket.join_multicast_v4(&BEACON_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    Ok(socket.into())
}

/// Wait on `socket` until a supported beacon arrives or `timeout` elapses.
///
/// Datagrams that are not beacons are skipped. A beacon from an unsupported
/// X-Plane version ends the wait with an error.
pub fn wait_for_beacon(socket: &UdpSocket, timeout: Duration) -> Result<Beacon, UdpBridgeError> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 2048];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(UdpBridgeError::BeaconTimeout(timeout));
        }
        socket.set_read_timeout(Some(remaining))?;

        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                return Err(UdpBridgeError::BeaconTimeout(timeout));
            }
            Err(e) => return Err(e.into()),
        };

        match parse_beacon(&buf[..n], from.ip()) {
            Ok(beacon) => return Ok(beacon),
            Err(UdpBridgeError::NotABeacon) => {
                debug!(from = %from, len = n, "ignoring non-beacon datagram");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Find a running X-Plane on the local network.
pub fn discover(timeout: Duration) -> Result<Beacon, UdpBridgeError> {
    let socket = open_beacon_socket()?;
    info!(group = %BEACON_GROUP, port = BEACON_PORT, "waiting for X-Plane beacon");
    let beacon = wait_for_beacon(&socket, timeout)?;
    info!(
        host = %beacon.host,
        port = beacon.port,
        hostname = %beacon.hostname,
        version = beacon.version,
        "found X-Plane",
    );
    Ok(beacon)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon_packet(major: u8, minor: u8, host: i32, hostname: &[u8]) -> Vec<u8> {
        let mut p = BEACON_PREFIX.to_vec();
        p.push(major);
        p.push(minor);
        p.extend_from_slice(&host.to_le_bytes());
        p.extend_from_slice(&120014i32.to_le_bytes());
        p.extend_from_slice(&1u32.to_le_bytes());
        p.extend_from_slice(&49000u16.to_le_bytes());
        p.extend_from_slice(hostname);
        p
    }

    const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

    #[test]
    fn decodes_port_version_role_and_hostname() {
        let beacon = parse_beacon(&beacon_packet(1, 2, 1, b"SIMPC\0\0\0"), LOCAL).unwrap();
        assert_eq!(beacon.port, 49000);
        assert_eq!(beacon.version, 120014);
        assert_eq!(beacon.role, 1);
        assert_eq!(beacon.hostname, "SIMPC");
        assert_eq!(beacon.data_addr(), "192.168.1.20:49000".parse().unwrap());
    }

    #[test]
    fn hostname_without_terminator_is_taken_whole() {
        let beacon = parse_beacon(&beacon_packet(1, 1, 1, b"rig"), LOCAL).unwrap();
        assert_eq!(beacon.hostname, "rig");
    }

    #[test]
    fn rejects_unsupported_versions_and_hosts() {
        for (major, minor, host) in [(2, 0, 1), (1, 3, 1), (1, 2, 2)] {
            let err = parse_beacon(&beacon_packet(major, minor, host, b"x\0"), LOCAL).unwrap_err();
            assert!(matches!(err, UdpBridgeError::UnsupportedBeacon { .. }), "{major}.{minor}/{host}");
        }
    }

    #[test]
    fn rejects_foreign_and_truncated_packets() {
        assert!(matches!(parse_beacon(b"RREF,\0\0\0", LOCAL), Err(UdpBridgeError::NotABeacon)));
        assert!(matches!(
            parse_beacon(&beacon_packet(1, 2, 1, b"")[..15], LOCAL),
            Err(UdpBridgeError::TruncatedBeacon { len: 15 }),
        ));
    }

    #[test]
    fn wait_skips_noise_and_returns_first_beacon() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();
        tx.send_to(b"hello", rx.local_addr().unwrap()).unwrap();
        tx.send_to(&beacon_packet(1, 2, 1, b"local\0"), rx.local_addr().unwrap()).unwrap();

        let beacon = wait_for_beacon(&rx, Duration::from_secs(2)).unwrap();
        assert_eq!(beacon.hostname, "local");
        assert_eq!(beacon.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn wait_times_out_without_beacon() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        let started = Instant::now();
        let err = wait_for_beacon(&rx, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, UdpBridgeError::BeaconTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
