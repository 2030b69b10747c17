//! Canonical telemetry records shared by every simulator bridge.
//!
//! Each adapter translates its platform's native values into these shapes
//! (feet, knots, degrees, kilograms) before anything is encoded for the
//! consumer. Values are built fresh per tick and never mutated afterwards.

pub mod adapter;
pub mod registration;
pub mod schedule;
pub mod text;

use serde::{Deserialize, Serialize};

pub use adapter::{MemorySink, SourceAdapter, TelemetryEvent, TelemetrySink};
pub use registration::{extract_registration, registration_or_tail_number};
pub use schedule::{PollTimer, POSITION_POLL_INTERVAL};
pub use text::{bounded_text, finite_or_zero, truncate_on_char_boundary};

/// Meters → feet, applied to altitude fields only.
pub const METERS_TO_FT: f64 = 3.28084;

// ── SimPlatform ──────────────────────────────────────────────────────────────

/// Simulator that produced a record. Fixes the `sim_abbreviation` and
/// `sim_version` fields the consumer uses to label a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimPlatform {
    #[default]
    Msfs,
    XPlane12,
}

impl SimPlatform {
    pub fn abbreviation(self) -> &'static str {
        match self {
            SimPlatform::Msfs     => "msfs",
            SimPlatform::XPlane12 => "xp12",
        }
    }

    pub fn version(self) -> &'static str {
        match self {
            SimPlatform::Msfs     => "11.0",
            SimPlatform::XPlane12 => "12.320",
        }
    }
}

// ── PositionSnapshot ─────────────────────────────────────────────────────────

/// One poll tick of user-aircraft state, already unit-normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub platform: SimPlatform,

    // ── Position ──────────────────────────────────────────────────────────────
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_amsl_ft: f64,
    pub altitude_agl_ft: f64,

    // ── Attitude ──────────────────────────────────────────────────────────────
    pub pitch_deg: f64,
    pub bank_deg: f64,
    pub heading_true_deg: f64,

    // ── Speeds ────────────────────────────────────────────────────────────────
    pub ground_speed_kt: f64,
    pub vertical_speed_fpm: f64,

    // ── Aircraft ──────────────────────────────────────────────────────────────
    pub fuel_kg: f64,
    /// Multiplier of standard gravity. MSFS does not expose it; always 1.0 there.
    pub gravity: f64,
    /// Squawk as the decimal reading of its four octal digits (7000 → 7000).
    pub transponder_code: u16,

    // ── Sim state flags ───────────────────────────────────────────────────────
    pub on_ground: bool,
    pub slew_active: bool,
    pub paused: bool,
    pub in_replay_mode: bool,
    pub autopilot_engaged: bool,
    pub engines_running: bool,
    pub parking_brake_set: bool,

    // ── Sim performance ───────────────────────────────────────────────────────
    pub frame_rate_hz: f64,
    pub time_acceleration: f64,

    // ── Weather ───────────────────────────────────────────────────────────────
    pub wind_speed_kt: f64,
    pub wind_direction_deg: f64,
}

impl Default for PositionSnapshot {
    fn default() -> Self {
        Self {
            platform: SimPlatform::default(),
            latitude_deg: 0.0,
            longitude_deg: 0.0,
            altitude_amsl_ft: 0.0,
            altitude_agl_ft: 0.0,
            pitch_deg: 0.0,
            bank_deg: 0.0,
            heading_true_deg: 0.0,
            ground_speed_kt: 0.0,
            vertical_speed_fpm: 0.0,
            fuel_kg: 0.0,
            gravity: 1.0,
            transponder_code: 0,
            on_ground: false,
            slew_active: false,
            paused: false,
            in_replay_mode: false,
            autopilot_engaged: false,
            engines_running: false,
            parking_brake_set: false,
            frame_rate_hz: 0.0,
            time_acceleration: 1.0,
            wind_speed_kt: 0.0,
            wind_direction_deg: 0.0,
        }
    }
}

/// Convert a raw squawk reading to the canonical code.
///
/// Negative, non-finite and out-of-range readings collapse into `0..=9999`.
pub fn transponder_from_raw(raw: f64) -> u16 {
    let code = finite_or_zero(raw).trunc();
    code.clamp(0.0, 9999.0) as u16
}

// ── AircraftIdentity ─────────────────────────────────────────────────────────

/// User-aircraft identity, emitted when the simulator reports a change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AircraftIdentity {
    /// Free-text title. Only MSFS provides one.
    pub title: String,
    pub icao_type: String,
    pub model: String,
    pub registration: String,
    /// Reserved by the consumer protocol; no source fills it yet.
    pub airline: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
