use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum UdpBridgeError {
    #[error("no X-Plane beacon received within {0:?}; is X-Plane running on this network?")]
    BeaconTimeout(Duration),

    #[error("packet is not an X-Plane beacon")]
    NotABeacon,

    #[error("beacon packet truncated ({len} bytes)")]
    TruncatedBeacon { len: usize },

    #[error("X-Plane beacon {major}.{minor} from host type {host} is not supported")]
    UnsupportedBeacon { major: u8, minor: u8, host: i32 },

    #[error("dataref path is {len} bytes, limit is {max}")]
    PathTooLong { len: usize, max: usize },

    #[error("UDP I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
