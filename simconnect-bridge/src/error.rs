/// Failures that stop the bridge from talking to the simulator.
///
/// Anything past setup (dispatch hiccups, failed position requests) is
/// logged and retried on the next tick instead.
#[derive(Debug, thiserror::Error)]
pub enum SimConnectError {
    #[error("SimConnect library could not be loaded from {path}")]
    LibraryNotFound { path: String },

    #[error("SimConnect library has no export named {0}")]
    MissingSymbol(&'static str),

    #[error("SimConnect_Open failed (HRESULT 0x{0:08X}); is the simulator running?")]
    OpenFailed(u32),

    #[error("{call} failed (HRESULT 0x{hresult:08X})")]
    CallFailed { call: &'static str, hresult: u32 },

    #[error("SimConnect is only available on Windows")]
    Unsupported,
}

/// Map an HRESULT into `Ok` or [`SimConnectError::CallFailed`].
pub fn check_hresult(call: &'static str, hresult: i32) -> Result<(), SimConnectError> {
    if hresult >= 0 {
        Ok(())
    } else {
        Err(SimConnectError::CallFailed { call, hresult: hresult as u32 })
    }
}
