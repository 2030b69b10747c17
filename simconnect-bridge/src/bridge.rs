//! SimConnect bridge: registration, request routing and the poll loop body.

use std::time::{Duration, Instant};

use telemetry_schema::{PollTimer, SimPlatform, SourceAdapter, TelemetrySink};
use tracing::{debug, info, warn};

use crate::error::SimConnectError;
use crate::records::{AircraftRecord, PositionRecord, SimVar, AIRCRAFT_VARS, POSITION_VARS};
use crate::simconnect_shim::{DefineId, Dispatch, Period, RequestFlag, RequestId, SimConnectApi};

pub const DEFINITION_POSITION: DefineId = 0;
pub const DEFINITION_AIRCRAFT: DefineId = 1;

pub const REQUEST_POSITION: RequestId = 0;
pub const REQUEST_AIRCRAFT: RequestId = 1;

/// What the host loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Quit,
}

pub struct SimConnectBridge<A: SimConnectApi> {
    api:   A,
    timer: PollTimer,
    inbox: Vec<Dispatch>,
    quit:  bool,
}

impl<A: SimConnectApi> SimConnectBridge<A> {
    pub fn new(api: A, poll_interval: Duration, now: Instant) -> Self {
        SimConnectBridge {
            api,
            timer: PollTimer::new(poll_interval, now),
            inbox: Vec::new(),
            quit:  false,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    /// `true` once the simulator has sent `Quit`.
    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// Register both data definitions and the change-driven identity request.
    ///
    /// Called once before the loop starts; any failure is fatal.
    pub fn register(&mut self) -> Result<(), SimConnectError> {
        self.add_definition(DEFINITION_POSITION, &POSITION_VARS)?;
        self.add_definition(DEFINITION_AIRCRAFT, &AIRCRAFT_VARS)?;

        self.api.request_data_on_sim_object(
            REQUEST_AIRCRAFT,
            DEFINITION_AIRCRAFT,
            Period::SimFrame,
            RequestFlag::Changed,
        )?;
        info!(
            position_fields = POSITION_VARS.len(),
            aircraft_fields = AIRCRAFT_VARS.len(),
            "SimConnect data definitions registered",
        );
        Ok(())
    }

    fn add_definition(&mut self, define: DefineId, vars: &[SimVar]) -> Result<(), SimConnectError> {
        for var in vars {
            self.api.add_to_data_definition(define, var.name, var.unit, var.datatype)?;
        }
        Ok(())
    }

    /// One loop iteration: drain inbound messages, then issue the timed
    /// position request if due.
    pub fn tick(&mut self, now: Instant, sink: &mut dyn TelemetrySink) -> LoopControl {
        let mut inbox = std::mem::take(&mut self.inbox);
        if let Err(e) = self.api.drain_dispatch(&mut inbox) {
            debug!(error = %e, "dispatch pass failed");
        }
        for message in inbox.drain(..) {
            if self.handle(message, sink) == LoopControl::Quit {
                self.quit = true;
            }
        }
        self.inbox = inbox;

        if self.quit {
            return LoopControl::Quit;
        }

        if self.timer.fire(now) {
            if let Err(e) = self.api.request_data_on_sim_object(
                REQUEST_POSITION,
                DEFINITION_POSITION,
                Period::Once,
                RequestFlag::Default,
            ) {
                warn!(error = %e, "position request failed");
            }
        }
        LoopControl::Continue
    }

    /// Route one inbound message.
    pub fn handle(&mut self, message: Dispatch, sink: &mut dyn TelemetrySink) -> LoopControl {
        match message {
            Dispatch::SimObjectData { request: REQUEST_POSITION, payload } => {
                let snapshot = PositionRecord::decode(&payload).to_snapshot();
                sink.publish_position(&snapshot);
            }
            Dispatch::SimObjectData { request: REQUEST_AIRCRAFT, payload } => {
                let identity = AircraftRecord::decode(&payload).to_identity();
                info!(
                    title = %identity.title,
                    registration = %identity.registration,
                    "aircraft changed",
                );
                sink.publish_aircraft(&identity);
            }
            Dispatch::SimObjectData { request, .. } => {
                debug!(request, "data for unknown request ignored");
            }
            Dispatch::Quit => {
                info!("simulator quit received");
                return LoopControl::Quit;
            }
            Dispatch::Exception { code } => {
                warn!(code, "SimConnect exception");
            }
            Dispatch::Open => {
                debug!("SimConnect session open");
            }
            Dispatch::Other { id } => {
                debug!(id, "unhandled SimConnect message");
            }
        }
        LoopControl::Continue
    }
}

impl<A: SimConnectApi> SourceAdapter for SimConnectBridge<A> {
    fn platform(&self) -> SimPlatform {
        SimPlatform::Msfs
    }

    fn pump(&mut self, now: Instant, sink: &mut dyn TelemetrySink) {
        self.tick(now, sink);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::STRING256_LEN;
    use crate::simconnect_shim::{DataType, MockSimConnect};
    use telemetry_schema::MemorySink;

    fn make_bridge(t0: Instant) -> SimConnectBridge<MockSimConnect> {
        let mut bridge = SimConnectBridge::new(MockSimConnect::new(), Duration::from_millis(100), t0);
        bridge.register().unwrap();
        bridge
    }

    fn position_payload(lat: f64, brake: f64) -> Vec<u8> {
        let mut values = [0.0f64; 20];
        values[0] = lat;
        values[14] = 1.0;
        values[17] = brake;
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn aircraft_payload(title: &str, reg: &str) -> Vec<u8> {
        let mut payload = vec![0u8; STRING256_LEN * 4];
        payload[..title.len()].copy_from_slice(title.as_bytes());
        let reg_at = STRING256_LEN * 3;
        payload[reg_at..reg_at + reg.len()].copy_from_slice(reg.as_bytes());
        payload
    }

    #[test]
    fn register_adds_both_definitions_and_identity_request() {
        let bridge = make_bridge(Instant::now());
        let api = bridge.api();

        let position: Vec<_> = api.definitions.iter().filter(|d| d.define == DEFINITION_POSITION).collect();
        let aircraft: Vec<_> = api.definitions.iter().filter(|d| d.define == DEFINITION_AIRCRAFT).collect();
        assert_eq!(position.len(), 20);
        assert_eq!(aircraft.len(), 4);
        assert!(position.iter().all(|d| d.datatype == DataType::Float64));
        assert_eq!(position[7].name, "GROUND VELOCITY");
        assert_eq!(position[7].unit.as_deref(), Some("knots"));
        assert!(aircraft.iter().all(|d| d.datatype == DataType::String256));

        assert_eq!(api.requests.len(), 1);
        let req = api.requests[0];
        assert_eq!(req.request, REQUEST_AIRCRAFT);
        assert_eq!(req.period, Period::SimFrame);
        assert_eq!(req.flag, RequestFlag::Changed);
    }

    #[test]
    fn position_requests_are_timer_gated() {
        let t0 = Instant::now();
        let mut bridge = make_bridge(t0);
        let mut sink = MemorySink::new();

        for ms in [10, 50, 99, 100, 110, 150, 199, 200, 250] {
            bridge.tick(t0 + Duration::from_millis(ms), &mut sink);
        }

        let api = bridge.api();
        assert_eq!(api.requests_for(REQUEST_POSITION), 2);
        assert_eq!(api.dispatch_passes, 9);
        let last = api.requests.last().unwrap();
        assert_eq!((last.period, last.flag), (Period::Once, RequestFlag::Default));
    }

    #[test]
    fn data_is_routed_by_request_id() {
        let t0 = Instant::now();
        let mut bridge = make_bridge(t0);
        let mut sink = MemorySink::new();

        bridge.api_mut().push(Dispatch::SimObjectData {
            request: REQUEST_POSITION,
            payload: position_payload(51.5, 1.0),
        });
        bridge.api_mut().push(Dispatch::SimObjectData {
            request: REQUEST_AIRCRAFT,
            payload: aircraft_payload("Cessna Skyhawk", "N172SP"),
        });
        bridge.api_mut().push(Dispatch::SimObjectData { request: 77, payload: vec![1, 2, 3] });

        assert_eq!(bridge.tick(t0, &mut sink), LoopControl::Continue);

        assert_eq!(sink.events.len(), 2);
        let pos = sink.positions()[0];
        assert_eq!(pos.latitude_deg, 51.5);
        assert!(pos.parking_brake_set);
        assert_eq!(pos.platform, SimPlatform::Msfs);
        let id = sink.aircraft()[0];
        assert_eq!(id.title, "Cessna Skyhawk");
        assert_eq!(id.registration, "N172SP");
    }

    #[test]
    fn quit_stops_the_loop_and_skips_requests() {
        let t0 = Instant::now();
        let mut bridge = make_bridge(t0);
        let mut sink = MemorySink::new();

        bridge.api_mut().push(Dispatch::Exception { code: 3 });
        bridge.api_mut().push(Dispatch::Quit);

        assert_eq!(bridge.tick(t0 + Duration::from_millis(500), &mut sink), LoopControl::Quit);
        assert!(bridge.quit_requested());
        assert_eq!(bridge.api().requests_for(REQUEST_POSITION), 0);
        assert_eq!(bridge.tick(t0 + Duration::from_secs(1), &mut sink), LoopControl::Quit);
    }

    #[test]
    fn failed_position_request_does_not_stop_the_loop() {
        let t0 = Instant::now();
        let mut bridge = make_bridge(t0);
        let mut sink = MemorySink::new();
        bridge.api_mut().fail_requests = Some(0x8000_4005);

        assert_eq!(
            bridge.tick(t0 + Duration::from_millis(100), &mut sink),
            LoopControl::Continue,
        );
    }

    #[test]
    fn pump_drives_the_same_tick() {
        let t0 = Instant::now();
        let mut bridge = make_bridge(t0);
        let mut sink = MemorySink::new();
        bridge.pump(t0 + Duration::from_millis(100), &mut sink);
        assert_eq!(bridge.platform(), SimPlatform::Msfs);
        assert_eq!(bridge.api().requests_for(REQUEST_POSITION), 1);
    }
}
