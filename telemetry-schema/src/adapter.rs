//! The seam between simulator adapters and the delivery pipeline.
//!
//! Adapters own everything platform-specific (field subscriptions, unit
//! conversion, identity recovery) and hand canonical records to a
//! [`TelemetrySink`]. The production sink encodes and streams them; tests
//! use [`MemorySink`].

use std::time::Instant;

use crate::{AircraftIdentity, PositionSnapshot, SimPlatform};

/// A canonical record produced by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Position(PositionSnapshot),
    Aircraft(AircraftIdentity),
}

/// Consumer of canonical records. Implementations must not block.
pub trait TelemetrySink {
    fn publish_position(&mut self, snapshot: &PositionSnapshot);
    fn publish_aircraft(&mut self, identity: &AircraftIdentity);
}

/// A simulator data source translated into canonical records.
///
/// `pump` is called from the host's loop or callback. Each call does a
/// bounded amount of work and publishes whatever became available.
pub trait SourceAdapter {
    fn platform(&self) -> SimPlatform;
    fn pump(&mut self, now: Instant, sink: &mut dyn TelemetrySink);
}

// ── MemorySink ────────────────────────────────────────────────────────────────

/// Sink that keeps every published record, in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<TelemetryEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positions(&self) -> Vec<&PositionSnapshot> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::Position(p) => Some(p),
                TelemetryEvent::Aircraft(_) => None,
            })
            .collect()
    }

    pub fn aircraft(&self) -> Vec<&AircraftIdentity> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::Aircraft(a) => Some(a),
                TelemetryEvent::Position(_) => None,
            })
            .collect()
    }
}

impl TelemetrySink for MemorySink {
    fn publish_position(&mut self, snapshot: &PositionSnapshot) {
        self.events.push(TelemetryEvent::Position(snapshot.clone()));
    }

    fn publish_aircraft(&mut self, identity: &AircraftIdentity) {
        self.events.push(TelemetryEvent::Aircraft(identity.clone()));
    }
}
