//! X-Plane 12 plugin that streams user-aircraft telemetry to a local tracker.
//!
//! Built as a `.xpl` library. The `XPlugin*` exports and the `XPLM*` imports
//! exist only in plugin builds; tests drive `BridgePlugin` through `MockXplm`.

pub mod logging;
pub mod plugin;
pub mod xplm_shim;

// XPLM imports, bound by X-Plane when it loads the library. Left out under
// `mock_xplm` so test binaries link on their own.
#[cfg(not(any(test, feature = "mock_xplm")))]
pub(crate) mod xplm_sys {
    use std::ffi::{c_char, c_float, c_int, c_void};

    pub type XPLMDataRef = *mut c_void;

    extern "C" {
        pub fn XPLMFindDataRef(inDataRefName: *const c_char) -> XPLMDataRef;
        pub fn XPLMGetDataf(inDataRef: XPLMDataRef) -> c_float;
        pub fn XPLMGetDatad(inDataRef: XPLMDataRef) -> f64;
        pub fn XPLMGetDatai(inDataRef: XPLMDataRef) -> c_int;
        pub fn XPLMGetDatavi(
            inDataRef:  XPLMDataRef,
            outValues:  *mut c_int,
            inOffset:   c_int,
            inMax:      c_int,
        ) -> c_int;
        pub fn XPLMGetDatab(
            inDataRef:  XPLMDataRef,
            outValue:   *mut c_void,
            inOffset:   c_int,
            inMaxBytes: c_int,
        ) -> c_int;
        pub fn XPLMDebugString(inString: *const c_char);
        pub fn XPLMRegisterFlightLoopCallback(
            inFlightLoop: Option<
                unsafe extern "C" fn(f32, f32, c_int, *mut c_void) -> f32,
            >,
            inInterval: c_float,
            inRefcon:   *mut c_void,
        );
        pub fn XPLMUnregisterFlightLoopCallback(
            inFlightLoop: Option<
                unsafe extern "C" fn(f32, f32, c_int, *mut c_void) -> f32,
            >,
            inRefcon: *mut c_void,
        );
    }
}

// ── Plugin exports ────────────────────────────────────────────────────────────

#[cfg(not(any(test, feature = "mock_xplm")))]
mod entry {
    use super::plugin::{BridgePlugin, FLIGHT_LOOP_INTERVAL_S};
    use super::xplm_shim::RealXplm;
    use std::ffi::{c_char, c_int, c_void, CString};
    use std::sync::{Mutex, OnceLock};
    use stream_protocol::{default_target, StreamPublisher};
    use tracing::{error, info};

    /// Plugin state plus the stream it publishes into.
    struct PluginState {
        plugin:    BridgePlugin,
        publisher: StreamPublisher,
    }

    static STATE: OnceLock<Mutex<PluginState>> = OnceLock::new();

    #[no_mangle]
    pub unsafe extern "C" fn XPluginStart(
        out_name: *mut c_char,
        out_sig:  *mut c_char,
        out_desc: *mut c_char,
    ) -> c_int {
        write_cstr(out_name, "Telemetry Bridge");
        write_cstr(out_sig,  "telemetry.bridge.xp12");
        write_cstr(out_desc, "Streams flight telemetry to a local tracker on port 6746");

        super::logging::init(debug_string);

        let state = PluginState {
            plugin:    BridgePlugin::new(Box::new(RealXplm)),
            publisher: StreamPublisher::new(default_target()),
        };
        if STATE.set(Mutex::new(state)).is_err() {
            error!("plugin state already initialized");
            return 0;
        }

        info!(target_addr = %default_target(), "XPluginStart OK");
        1
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginStop() {
        if let Some(state) = STATE.get() {
            if let Ok(mut s) = state.lock() {
                s.publisher.shutdown();
            }
        }
        info!("XPluginStop");
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginEnable() -> c_int {
        let Some(state) = STATE.get() else {
            debug_string("Telemetry Bridge: XPluginEnable, plugin not initialized\n");
            return 0;
        };
        let Ok(mut s) = state.lock() else { return 0 };
        s.plugin.find_handles();

        super::xplm_sys::XPLMRegisterFlightLoopCallback(
            Some(flight_loop_cb),
            FLIGHT_LOOP_INTERVAL_S,
            std::ptr::null_mut(),
        );
        info!("XPluginEnable OK");
        1
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginDisable() {
        super::xplm_sys::XPLMUnregisterFlightLoopCallback(
            Some(flight_loop_cb),
            std::ptr::null_mut(),
        );
        if let Some(state) = STATE.get() {
            if let Ok(mut s) = state.lock() {
                s.publisher.shutdown();
            }
        }
        info!("XPluginDisable");
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginReceiveMessage(
        from:  c_int,
        msg:   c_int,
        param: *mut c_void,
    ) {
        if let Some(state) = STATE.get() {
            if let Ok(mut s) = state.lock() {
                let PluginState { plugin, publisher } = &mut *s;
                plugin.handle_message(from, msg, param as usize, publisher);
            }
        }
    }

    unsafe extern "C" fn flight_loop_cb(
        _since_last_call:  f32,
        _since_last_floop: f32,
        _counter:          c_int,
        _refcon:           *mut c_void,
    ) -> f32 {
        if let Some(state) = STATE.get() {
            if let Ok(mut s) = state.lock() {
                let PluginState { plugin, publisher } = &mut *s;
                return plugin.flight_loop_tick(publisher);
            }
        }
        FLIGHT_LOOP_INTERVAL_S
    }

    /// Line sink for the tracing writer: X-Plane's `Log.txt`.
    fn debug_string(line: &str) {
        let Ok(line) = CString::new(line) else { return };
        unsafe { super::xplm_sys::XPLMDebugString(line.as_ptr()) }
    }

    /// X-Plane hands over 256-byte buffers for name, signature and description.
    unsafe fn write_cstr(dst: *mut c_char, text: &str) {
        let n = text.len().min(255);
        std::ptr::copy_nonoverlapping(text.as_ptr().cast::<c_char>(), dst, n);
        dst.add(n).write(0);
    }
}

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use plugin::{BridgePlugin, FLIGHT_LOOP_INTERVAL_S, FRAME_RATE_FALLBACK_HZ, XPLM_MSG_LIVERY_LOADED};
pub use stream_protocol::STREAM_PORT;
