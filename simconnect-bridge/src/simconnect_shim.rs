//! SimConnect abstraction layer.
//!
//! The bridge only needs three SimConnect calls. They sit behind the
//! `SimConnectApi` trait so tests can drive the bridge with `MockSimConnect`
//! and a scripted queue of inbound messages.

use std::collections::VecDeque;

use crate::error::SimConnectError;

pub type DefineId  = u32;
pub type RequestId = u32;

/// `SIMCONNECT_OBJECT_ID_USER`.
pub const OBJECT_ID_USER: u32 = 0;

// ── Enumerations (numeric values match SimConnect.h) ──────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Float64,
    String256,
}

impl DataType {
    pub fn raw(self) -> u32 {
        match self {
            DataType::Float64   => 4,
            DataType::String256 => 9,
        }
    }

    /// Bytes this field occupies in a `SIMOBJECT_DATA` payload.
    pub fn size(self) -> usize {
        match self {
            DataType::Float64   => 8,
            DataType::String256 => 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Once,
    SimFrame,
}

impl Period {
    pub fn raw(self) -> u32 {
        match self {
            Period::Once     => 1,
            Period::SimFrame => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFlag {
    Default,
    /// Only deliver when a field differs from the last delivery.
    Changed,
}

impl RequestFlag {
    pub fn raw(self) -> u32 {
        match self {
            RequestFlag::Default => 0,
            RequestFlag::Changed => 1,
        }
    }
}

// ── Inbound messages ──────────────────────────────────────────────────────────

/// One received SimConnect message, copied out of the driver's buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Open,
    Quit,
    Exception { code: u32 },
    /// Payload is the raw field block starting at `dwData`.
    SimObjectData { request: RequestId, payload: Vec<u8> },
    Other { id: u32 },
}

// ── Receive layout ────────────────────────────────────────────────────────────

const RECV_ID_EXCEPTION: u32      = 1;
const RECV_ID_OPEN: u32           = 2;
const RECV_ID_QUIT: u32           = 3;
const RECV_ID_SIMOBJECT_DATA: u32 = 8;

/// Offset of `dwRequestID` in `SIMCONNECT_RECV_SIMOBJECT_DATA`.
const SIMOBJECT_REQUEST_OFFSET: usize = 12;
/// Offset of `dwData`: header (12) + request, object, define, flags,
/// entry number, out-of, define count (7 × 4).
const SIMOBJECT_DATA_OFFSET: usize = 40;
/// Offset of `dwException` in `SIMCONNECT_RECV_EXCEPTION`.
const EXCEPTION_CODE_OFFSET: usize = 12;

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map_or(0, u32::from_le_bytes)
}

impl Dispatch {
    /// Decode a raw `SIMCONNECT_RECV*` message (header included).
    ///
    /// Truncated messages decode with zeroed ids and an empty payload.
    pub fn from_recv(id: u32, bytes: &[u8]) -> Dispatch {
        match id {
            RECV_ID_OPEN => Dispatch::Open,
            RECV_ID_QUIT => Dispatch::Quit,
            RECV_ID_EXCEPTION => Dispatch::Exception { code: read_u32(bytes, EXCEPTION_CODE_OFFSET) },
            RECV_ID_SIMOBJECT_DATA => Dispatch::SimObjectData {
                request: read_u32(bytes, SIMOBJECT_REQUEST_OFFSET),
                payload: bytes.get(SIMOBJECT_DATA_OFFSET..).unwrap_or_default().to_vec(),
            },
            other => Dispatch::Other { id: other },
        }
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

pub trait SimConnectApi {
    fn add_to_data_definition(
        &mut self,
        define: DefineId,
        name: &str,
        unit: Option<&str>,
        datatype: DataType,
    ) -> Result<(), SimConnectError>;

    fn request_data_on_sim_object(
        &mut self,
        request: RequestId,
        define: DefineId,
        period: Period,
        flag: RequestFlag,
    ) -> Result<(), SimConnectError>;

    /// Run one dispatch pass, appending whatever arrived to `out`.
    fn drain_dispatch(&mut self, out: &mut Vec<Dispatch>) -> Result<(), SimConnectError>;
}

// ── MockSimConnect ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionCall {
    pub define:   DefineId,
    pub name:     String,
    pub unit:     Option<String>,
    pub datatype: DataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestCall {
    pub request: RequestId,
    pub define:  DefineId,
    pub period:  Period,
    pub flag:    RequestFlag,
}

/// Test implementation: records every call and replays queued messages.
#[derive(Debug, Default)]
pub struct MockSimConnect {
    pub definitions: Vec<DefinitionCall>,
    pub requests:    Vec<RequestCall>,
    pub inbox:       VecDeque<Dispatch>,
    /// Number of `drain_dispatch` calls.
    pub dispatch_passes: usize,
    /// When set, every request call fails with this HRESULT.
    pub fail_requests: Option<u32>,
}

impl MockSimConnect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Dispatch) {
        self.inbox.push_back(message);
    }

    pub fn requests_for(&self, request: RequestId) -> usize {
        self.requests.iter().filter(|r| r.request == request).count()
    }
}

impl SimConnectApi for MockSimConnect {
    fn add_to_data_definition(
        &mut self,
        define: DefineId,
        name: &str,
        unit: Option<&str>,
        datatype: DataType,
    ) -> Result<(), SimConnectError> {
        self.definitions.push(DefinitionCall {
            define,
            name: name.to_string(),
            unit: unit.map(str::to_string),
            datatype,
        });
        Ok(())
    }

    fn request_data_on_sim_object(
        &mut self,
        request: RequestId,
        define: DefineId,
        period: Period,
        flag: RequestFlag,
    ) -> Result<(), SimConnectError> {
        if let Some(hresult) = self.fail_requests {
            return Err(SimConnectError::CallFailed {
                call: "SimConnect_RequestDataOnSimObject",
                hresult,
            });
        }
        self.requests.push(RequestCall { request, define, period, flag });
        Ok(())
    }

    fn drain_dispatch(&mut self, out: &mut Vec<Dispatch>) -> Result<(), SimConnectError> {
        self.dispatch_passes += 1;
        out.extend(self.inbox.drain(..));
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn recv(id: u32, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(12 + body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(&id.to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn simobject_data_payload_starts_after_fixed_fields() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_le_bytes()); // request id
        body.extend_from_slice(&[0u8; 24]);          // object .. define count
        body.extend_from_slice(&42.5f64.to_le_bytes());

        let msg = Dispatch::from_recv(8, &recv(8, &body));
        assert_eq!(
            msg,
            Dispatch::SimObjectData { request: 1, payload: 42.5f64.to_le_bytes().to_vec() },
        );
    }

    #[test]
    fn exception_carries_its_code() {
        let msg = Dispatch::from_recv(1, &recv(1, &7u32.to_le_bytes()));
        assert_eq!(msg, Dispatch::Exception { code: 7 });
    }

    #[test]
    fn truncated_and_unknown_messages_do_not_panic() {
        assert_eq!(
            Dispatch::from_recv(8, &[0u8; 6]),
            Dispatch::SimObjectData { request: 0, payload: Vec::new() },
        );
        assert_eq!(Dispatch::from_recv(3, &[]), Dispatch::Quit);
        assert_eq!(Dispatch::from_recv(99, &[]), Dispatch::Other { id: 99 });
    }

    #[test]
    fn enum_values_match_the_sdk_header() {
        assert_eq!(DataType::Float64.raw(), 4);
        assert_eq!(DataType::String256.raw(), 9);
        assert_eq!(Period::Once.raw(), 1);
        assert_eq!(Period::SimFrame.raw(), 3);
        assert_eq!(RequestFlag::Changed.raw(), 1);
    }

    #[test]
    fn mock_records_requests_and_replays_inbox() {
        let mut mock = MockSimConnect::new();
        mock.push(Dispatch::Open);
        mock.request_data_on_sim_object(0, 0, Period::Once, RequestFlag::Default).unwrap();

        let mut out = Vec::new();
        mock.drain_dispatch(&mut out).unwrap();
        assert_eq!(out, vec![Dispatch::Open]);
        assert_eq!(mock.requests_for(0), 1);

        mock.fail_requests = Some(0x8000_4005);
        assert!(mock.request_data_on_sim_object(0, 0, Period::Once, RequestFlag::Default).is_err());
    }
}
