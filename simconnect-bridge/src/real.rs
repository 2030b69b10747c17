//! `SimConnect.dll` bound at runtime.
//!
//! The DLL ships with the simulator SDK rather than with Windows, so it is
//! loaded with `LoadLibraryW` and its five exports resolved by name. Nothing
//! is linked at build time.

use std::ffi::{c_char, c_void, CString};

use tracing::{debug, info};
use windows::core::{HSTRING, PCSTR, PCWSTR};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

use crate::error::{check_hresult, SimConnectError};
use crate::simconnect_shim::{
    DataType, DefineId, Dispatch, Period, RequestFlag, RequestId, SimConnectApi, OBJECT_ID_USER,
};

type Handle = *mut c_void;

type DispatchProc = unsafe extern "system" fn(*const RecvHeader, u32, *mut c_void);

type OpenFn = unsafe extern "system" fn(*mut Handle, *const c_char, *mut c_void, u32, *mut c_void, u32) -> i32;
type CloseFn = unsafe extern "system" fn(Handle) -> i32;
type CallDispatchFn = unsafe extern "system" fn(Handle, DispatchProc, *mut c_void) -> i32;
type AddToDataDefinitionFn =
    unsafe extern "system" fn(Handle, u32, *const c_char, *const c_char, u32, f32, u32) -> i32;
type RequestDataOnSimObjectFn =
    unsafe extern "system" fn(Handle, u32, u32, u32, u32, u32, u32, u32, u32) -> i32;

/// `SIMCONNECT_UNUSED`.
const UNUSED: u32 = u32::MAX;

// ── Receive layout ────────────────────────────────────────────────────────────

#[repr(C)]
#[allow(dead_code)]
struct RecvHeader {
    size:    u32,
    version: u32,
    id:      u32,
}

// ── RealSimConnect ────────────────────────────────────────────────────────────

pub struct RealSimConnect {
    handle:        Handle,
    close:         CloseFn,
    call_dispatch: CallDispatchFn,
    add_to_data_definition: AddToDataDefinitionFn,
    request_data_on_sim_object: RequestDataOnSimObjectFn,
}

impl RealSimConnect {
    /// Load the DLL from `library` and open a client session named `client_name`.
    pub fn open(library: &str, client_name: &str) -> Result<Self, SimConnectError> {
        let wide = HSTRING::from(library);
        let module = unsafe { LoadLibraryW(PCWSTR(wide.as_ptr())) }
            .map_err(|_| SimConnectError::LibraryNotFound { path: library.to_string() })?;
        debug!(library, "SimConnect library loaded");

        macro_rules! export {
            ($name:literal, $ty:ty) => {{
                let proc = unsafe { GetProcAddress(module, PCSTR(concat!($name, "\0").as_ptr())) }
                    .ok_or(SimConnectError::MissingSymbol($name))?;
                unsafe { std::mem::transmute::<_, $ty>(proc) }
            }};
        }

        let open: OpenFn = export!("SimConnect_Open", OpenFn);
        let close: CloseFn = export!("SimConnect_Close", CloseFn);
        let call_dispatch: CallDispatchFn = export!("SimConnect_CallDispatch", CallDispatchFn);
        let add_to_data_definition: AddToDataDefinitionFn =
            export!("SimConnect_AddToDataDefinition", AddToDataDefinitionFn);
        let request_data_on_sim_object: RequestDataOnSimObjectFn =
            export!("SimConnect_RequestDataOnSimObject", RequestDataOnSimObjectFn);

        let name = CString::new(client_name).unwrap_or_default();
        let mut handle: Handle = std::ptr::null_mut();
        let hr = unsafe {
            open(&mut handle, name.as_ptr(), std::ptr::null_mut(), 0, std::ptr::null_mut(), 0)
        };
        if hr < 0 || handle.is_null() {
            return Err(SimConnectError::OpenFailed(hr as u32));
        }
        info!(client = client_name, "connected to SimConnect");

        Ok(RealSimConnect {
            handle,
            close,
            call_dispatch,
            add_to_data_definition,
            request_data_on_sim_object,
        })
    }
}

impl SimConnectApi for RealSimConnect {
    fn add_to_data_definition(
        &mut self,
        define: DefineId,
        name: &str,
        unit: Option<&str>,
        datatype: DataType,
    ) -> Result<(), SimConnectError> {
        let name = CString::new(name).unwrap_or_default();
        let unit = unit.and_then(|u| CString::new(u).ok());
        let unit_ptr = unit.as_ref().map_or(std::ptr::null(), |u| u.as_ptr());
        let hr = unsafe {
            (self.add_to_data_definition)(
                self.handle,
                define,
                name.as_ptr(),
                unit_ptr,
                datatype.raw(),
                0.0,
                UNUSED,
            )
        };
        check_hresult("SimConnect_AddToDataDefinition", hr)
    }

    fn request_data_on_sim_object(
        &mut self,
        request: RequestId,
        define: DefineId,
        period: Period,
        flag: RequestFlag,
    ) -> Result<(), SimConnectError> {
        let hr = unsafe {
            (self.request_data_on_sim_object)(
                self.handle,
                request,
                define,
                OBJECT_ID_USER,
                period.raw(),
                flag.raw(),
                0,
                0,
                0,
            )
        };
        check_hresult("SimConnect_RequestDataOnSimObject", hr)
    }

    fn drain_dispatch(&mut self, out: &mut Vec<Dispatch>) -> Result<(), SimConnectError> {
        let context = out as *mut Vec<Dispatch> as *mut c_void;
        let hr = unsafe { (self.call_dispatch)(self.handle, collect_dispatch, context) };
        check_hresult("SimConnect_CallDispatch", hr)
    }
}

impl Drop for RealSimConnect {
    fn drop(&mut self) {
        unsafe {
            (self.close)(self.handle);
        }
    }
}

/// Copies each message out of the driver's buffer before it is reused.
unsafe extern "system" fn collect_dispatch(data: *const RecvHeader, cb_data: u32, context: *mut c_void) {
    if data.is_null() || context.is_null() {
        return;
    }
    let out = &mut *(context as *mut Vec<Dispatch>);
    let header = &*data;
    let len = (header.size.min(cb_data)) as usize;
    let bytes = std::slice::from_raw_parts(data as *const u8, len);
    out.push(Dispatch::from_recv(header.id, bytes));
}
