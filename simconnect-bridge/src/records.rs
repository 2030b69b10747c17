//! Data definitions registered with SimConnect and the decoders for the
//! records they produce.
//!
//! Field order here is the wire order of the `SIMOBJECT_DATA` payload. The
//! decoders read owned bytes only: short payloads decode as zero / empty,
//! string fields are bounded to 256 bytes whether or not they are terminated.

use telemetry_schema::{
    bounded_text, finite_or_zero, transponder_from_raw, AircraftIdentity, PositionSnapshot,
    SimPlatform,
};

use crate::simconnect_shim::DataType;

/// A simulation variable in a data definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimVar {
    pub name:     &'static str,
    pub unit:     Option<&'static str>,
    pub datatype: DataType,
}

const fn float64(name: &'static str, unit: &'static str) -> SimVar {
    SimVar { name, unit: Some(unit), datatype: DataType::Float64 }
}

const fn string256(name: &'static str) -> SimVar {
    SimVar { name, unit: None, datatype: DataType::String256 }
}

// ── Position definition ───────────────────────────────────────────────────────

pub const POSITION_VARS: [SimVar; 20] = [
    float64("PLANE LATITUDE",             "degrees"),
    float64("PLANE LONGITUDE",            "degrees"),
    float64("PLANE ALTITUDE",             "feet"),
    float64("PLANE ALT ABOVE GROUND",     "feet"),
    float64("PLANE PITCH DEGREES",        "degrees"),
    float64("PLANE BANK DEGREES",         "degrees"),
    float64("PLANE HEADING DEGREES TRUE", "degrees"),
    float64("GROUND VELOCITY",            "knots"),
    float64("VERTICAL SPEED",             "feet/minute"),
    float64("FUEL TOTAL QUANTITY WEIGHT", "kilograms"),
    float64("TRANSPONDER CODE:1",         "number"),
    float64("SIM ON GROUND",              "bool"),
    float64("IS SLEW ACTIVE",             "bool"),
    float64("FRAME RATE",                 "number"),
    float64("SIMULATION RATE",            "number"),
    float64("AUTOPILOT MASTER",           "bool"),
    float64("GENERAL ENG COMBUSTION:1",   "bool"),
    float64("BRAKE PARKING POSITION",     "position"),
    float64("AMBIENT WIND VELOCITY",      "knots"),
    float64("AMBIENT WIND DIRECTION",     "degrees"),
];

/// Boolean simvars arrive as 0.0 / 1.0.
const BOOL_THRESHOLD: f64 = 0.5;
/// Parking brake position is 0..1; anything past a light touch counts as set.
const PARKING_BRAKE_THRESHOLD: f64 = 0.1;
/// Simulation rate below this means the sim is paused.
const PAUSED_SIM_RATE: f64 = 0.001;

/// Raw position record, one `f64` per [`POSITION_VARS`] entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionRecord {
    pub latitude:          f64,
    pub longitude:         f64,
    pub altitude_ft:       f64,
    pub altitude_agl_ft:   f64,
    pub pitch_deg:         f64,
    pub bank_deg:          f64,
    pub heading_true_deg:  f64,
    pub ground_speed_kt:   f64,
    pub vertical_speed_fpm: f64,
    pub fuel_kg:           f64,
    pub transponder_code:  f64,
    pub on_ground:         f64,
    pub slew_active:       f64,
    pub frame_rate:        f64,
    pub sim_rate:          f64,
    pub autopilot_master:  f64,
    pub engine_combustion: f64,
    pub parking_brake:     f64,
    pub wind_speed_kt:     f64,
    pub wind_direction_deg: f64,
}

impl PositionRecord {
    pub fn decode(payload: &[u8]) -> Self {
        let f = |i: usize| -> f64 {
            let start = i * DataType::Float64.size();
            payload
                .get(start..start + 8)
                .and_then(|b| b.try_into().ok())
                .map_or(0.0, f64::from_le_bytes)
        };

        PositionRecord {
            latitude:           f(0),
            longitude:          f(1),
            altitude_ft:        f(2),
            altitude_agl_ft:    f(3),
            pitch_deg:          f(4),
            bank_deg:           f(5),
            heading_true_deg:   f(6),
            ground_speed_kt:    f(7),
            vertical_speed_fpm: f(8),
            fuel_kg:            f(9),
            transponder_code:   f(10),
            on_ground:          f(11),
            slew_active:        f(12),
            frame_rate:         f(13),
            sim_rate:           f(14),
            autopilot_master:   f(15),
            engine_combustion:  f(16),
            parking_brake:      f(17),
            wind_speed_kt:      f(18),
            wind_direction_deg: f(19),
        }
    }

    /// Map to the canonical snapshot. MSFS reports feet and knots natively.
    pub fn to_snapshot(&self) -> PositionSnapshot {
        let v = finite_or_zero;
        PositionSnapshot {
            platform:           SimPlatform::Msfs,
            latitude_deg:       v(self.latitude),
            longitude_deg:      v(self.longitude),
            altitude_amsl_ft:   v(self.altitude_ft),
            altitude_agl_ft:    v(self.altitude_agl_ft),
            pitch_deg:          v(self.pitch_deg),
            bank_deg:           v(self.bank_deg),
            heading_true_deg:   v(self.heading_true_deg),
            ground_speed_kt:    v(self.ground_speed_kt),
            vertical_speed_fpm: v(self.vertical_speed_fpm),
            fuel_kg:            v(self.fuel_kg),
            gravity:            1.0,
            transponder_code:   transponder_from_raw(self.transponder_code),
            on_ground:          self.on_ground > BOOL_THRESHOLD,
            slew_active:        self.slew_active > BOOL_THRESHOLD,
            paused:             v(self.sim_rate) < PAUSED_SIM_RATE,
            in_replay_mode:     false,
            autopilot_engaged:  self.autopilot_master > BOOL_THRESHOLD,
            engines_running:    self.engine_combustion > BOOL_THRESHOLD,
            parking_brake_set:  self.parking_brake > PARKING_BRAKE_THRESHOLD,
            frame_rate_hz:      v(self.frame_rate),
            time_acceleration:  v(self.sim_rate),
            wind_speed_kt:      v(self.wind_speed_kt),
            wind_direction_deg: v(self.wind_direction_deg),
        }
    }
}

// ── Aircraft definition ───────────────────────────────────────────────────────

pub const AIRCRAFT_VARS: [SimVar; 4] = [
    string256("TITLE"),
    string256("ATC MODEL"),
    string256("ATC TYPE"),
    string256("ATC ID"),
];

pub const STRING256_LEN: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AircraftRecord {
    pub title:     String,
    pub atc_model: String,
    pub atc_type:  String,
    pub atc_id:    String,
}

impl AircraftRecord {
    pub fn decode(payload: &[u8]) -> Self {
        let s = |i: usize| -> String {
            let start = (i * STRING256_LEN).min(payload.len());
            bounded_text(&payload[start..], STRING256_LEN)
        };

        AircraftRecord {
            title:     s(0),
            atc_model: s(1),
            atc_type:  s(2),
            atc_id:    s(3),
        }
    }

    pub fn to_identity(&self) -> AircraftIdentity {
        AircraftIdentity {
            title:        self.title.clone(),
            icao_type:    self.atc_type.clone(),
            model:        self.atc_model.clone(),
            registration: self.atc_id.clone(),
            airline:      String::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
