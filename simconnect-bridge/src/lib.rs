//! MSFS adapter: polls SimConnect for the user aircraft and forwards
//! canonical telemetry to the consumer stream.

pub mod bridge;
pub mod error;
pub mod records;
pub mod simconnect_shim;

#[cfg(windows)]
pub mod real;

pub use bridge::{LoopControl, SimConnectBridge};
pub use error::SimConnectError;
pub use simconnect_shim::{Dispatch, MockSimConnect, SimConnectApi};

/// Client name announced to the simulator on `SimConnect_Open`.
pub const CLIENT_NAME: &str = "Telemetry Bridge SimConnect Client";
