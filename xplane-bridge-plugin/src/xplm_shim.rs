//! XPLM abstraction layer.
//!
//! Every X-Plane SDK read goes through the `XplmApi` trait so that unit tests
//! can substitute `MockXplm` without a running simulator. The bridge only
//! reads; nothing here writes back into the sim.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Opaque handle to a cached X-Plane dataref (pointer-sized).
pub type DataRefHandle = usize;

// ── DataRefValue (mock storage) ───────────────────────────────────────────────

/// Value stored in the mock shim for a single dataref.
#[derive(Debug, Clone)]
pub enum DataRefValue {
    Float(f32),
    Double(f64),
    Int(i32),
    IntArray(Vec<i32>),
    /// Byte dataref such as `acf_ICAO`. May or may not carry a trailing NUL.
    Bytes(Vec<u8>),
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Abstraction over the XPLM dataref reads used by the bridge.
///
/// `Send + Sync` so the trait object can live in a global `OnceLock`.
pub trait XplmApi: Send + Sync {
    fn find_dataref(&self, path: &str) -> Option<DataRefHandle>;
    fn get_float(&self, handle: DataRefHandle) -> f32;
    fn get_double(&self, handle: DataRefHandle) -> f64;
    fn get_int(&self, handle: DataRefHandle) -> i32;
    /// Read up to `out.len()` ints starting at `offset`.
    fn get_int_array(&self, handle: DataRefHandle, offset: usize, out: &mut [i32]);
    /// Copy up to `out.len()` bytes from the start of a byte dataref.
    /// Returns the number of bytes written.
    fn get_bytes(&self, handle: DataRefHandle, out: &mut [u8]) -> usize;
    fn log(&self, message: &str);
}

// ── MockXplm ─────────────────────────────────────────────────────────────────

impl DataRefValue {
    /// Scalar view used by the numeric getters; arrays and bytes have none.
    fn scalar(&self) -> Option<f64> {
        match *self {
            DataRefValue::Float(v)  => Some(v as f64),
            DataRefValue::Double(v) => Some(v),
            DataRefValue::Int(v)    => Some(v as f64),
            DataRefValue::IntArray(_) | DataRefValue::Bytes(_) => None,
        }
    }
}

#[derive(Default)]
struct MockState {
    /// The slot index is the dataref handle.
    slots: Vec<(String, DataRefValue)>,
    lines: Vec<String>,
}

impl MockState {
    fn slot_of(&self, path: &str) -> Option<DataRefHandle> {
        self.slots.iter().position(|(p, _)| p == path)
    }

    fn scalar(&self, handle: DataRefHandle) -> Option<f64> {
        self.slots.get(handle).and_then(|(_, v)| v.scalar())
    }
}

/// Test implementation: serves values set with [`MockXplm::set_dataref`] and
/// records everything passed to `log`.
#[derive(Default)]
pub struct MockXplm {
    state: Mutex<MockState>,
}

impl MockXplm {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set or replace a dataref. Replacing keeps the existing handle.
    pub fn set_dataref(&self, path: &str, value: DataRefValue) {
        let mut st = self.state();
        match st.slot_of(path) {
            Some(h) => st.slots[h].1 = value,
            None => st.slots.push((path.to_string(), value)),
        }
    }

    /// Every line logged so far.
    pub fn log_messages(&self) -> Vec<String> {
        self.state().lines.clone()
    }
}

impl XplmApi for MockXplm {
    fn find_dataref(&self, path: &str) -> Option<DataRefHandle> {
        self.state().slot_of(path)
    }

    fn get_float(&self, handle: DataRefHandle) -> f32 {
        self.state().scalar(handle).unwrap_or(0.0) as f32
    }

    fn get_double(&self, handle: DataRefHandle) -> f64 {
        self.state().scalar(handle).unwrap_or(0.0)
    }

    fn get_int(&self, handle: DataRefHandle) -> i32 {
        self.state().scalar(handle).unwrap_or(0.0) as i32
    }

    fn get_int_array(&self, handle: DataRefHandle, offset: usize, out: &mut [i32]) {
        let st = self.state();
        let values: &[i32] = match st.slots.get(handle) {
            Some((_, DataRefValue::IntArray(v))) => v,
            _ => &[],
        };
        for (slot, i) in out.iter_mut().zip(offset..) {
            *slot = values.get(i).copied().unwrap_or(0);
        }
    }

    fn get_bytes(&self, handle: DataRefHandle, out: &mut [u8]) -> usize {
        let st = self.state();
        let Some((_, DataRefValue::Bytes(bytes))) = st.slots.get(handle) else { return 0 };
        let n = bytes.len().min(out.len());
        out[..n].copy_from_slice(&bytes[..n]);
        n
    }

    fn log(&self, message: &str) {
        self.state().lines.push(message.to_string());
    }
}

// ── RealXplm (plugin builds only) ─────────────────────────────────────────────

#[cfg(not(any(test, feature = "mock_xplm")))]
pub use real::RealXplm;

#[cfg(not(any(test, feature = "mock_xplm")))]
mod real {
    use super::{DataRefHandle, XplmApi};
    use std::ffi::CString;

    /// Production implementation wrapping raw XPLM extern calls.
    pub struct RealXplm;

    impl XplmApi for RealXplm {
        fn find_dataref(&self, path: &str) -> Option<DataRefHandle> {
            let c = CString::new(path).ok()?;
            let h = unsafe { crate::xplm_sys::XPLMFindDataRef(c.as_ptr()) };
            if h.is_null() { None } else { Some(h as usize) }
        }

        fn get_float(&self, handle: DataRefHandle) -> f32 {
            unsafe { crate::xplm_sys::XPLMGetDataf(handle as _) }
        }

        fn get_double(&self, handle: DataRefHandle) -> f64 {
            unsafe { crate::xplm_sys::XPLMGetDatad(handle as _) }
        }

        fn get_int(&self, handle: DataRefHandle) -> i32 {
            unsafe { crate::xplm_sys::XPLMGetDatai(handle as _) }
        }

        fn get_int_array(&self, handle: DataRefHandle, offset: usize, out: &mut [i32]) {
            unsafe {
                crate::xplm_sys::XPLMGetDatavi(
                    handle as _,
                    out.as_mut_ptr(),
                    offset as i32,
                    out.len() as i32,
                );
            }
        }

        fn get_bytes(&self, handle: DataRefHandle, out: &mut [u8]) -> usize {
            let n = unsafe {
                crate::xplm_sys::XPLMGetDatab(
                    handle as _,
                    out.as_mut_ptr().cast(),
                    0,
                    out.len() as i32,
                )
            };
            (n.max(0) as usize).min(out.len())
        }

        fn log(&self, message: &str) {
            if let Ok(c) = CString::new(message) {
                unsafe { crate::xplm_sys::XPLMDebugString(c.as_ptr()) }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
