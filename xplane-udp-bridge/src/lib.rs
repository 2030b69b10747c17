//! X-Plane adapter that runs outside the simulator, over the UDP data
//! interface: beacon discovery, RREF subscriptions and byte-wise string
//! assembly.

pub mod beacon;
pub mod bridge;
pub mod error;
pub mod rref;

pub use beacon::{discover, Beacon, BEACON_TIMEOUT};
pub use bridge::UdpBridge;
pub use error::UdpBridgeError;
pub use rref::{MockRrefSocket, RrefSocket, UdpRrefSocket};
