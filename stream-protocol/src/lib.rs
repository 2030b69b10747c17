//! JSON stream codec for the consumer's telemetry port.
//!
//! Every message is one self-contained JSON object, written back-to-back on
//! a TCP stream with no delimiter:
//!
//! ```text
//! {"type":"STREAM","name":"POSITION_UPDATE","data":{ ...25 fields... }}
//! {"type":"STREAM","name":"AIRCRAFT_UPDATE","data":{"title":..,"type":..,"model":..,"registration":..,"airline":""}}
//! ```
//!
//! Numbers are always rendered with six decimals, the squawk as a four
//! digit string. Key order is fixed; the consumer does not rely on it but
//! captured traffic stays diffable.

pub mod client;
pub mod publisher;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Serialize, Serializer};
use serde_json::value::RawValue;
use telemetry_schema::{finite_or_zero, truncate_on_char_boundary, AircraftIdentity, PositionSnapshot};
use tracing::warn;

pub use client::{ConnectionState, SendOutcome, StreamClient, StreamStats};
pub use publisher::StreamPublisher;

/// TCP port the consumer listens on.
pub const STREAM_PORT: u16 = 6746;

/// Initial capacity of the encode buffer; fits a worst-case identity message.
pub const MESSAGE_CAPACITY: usize = 2048;

/// Upper bound on any text field, in bytes.
pub const MAX_TEXT_FIELD_LEN: usize = 255;

/// Consumer endpoint on the local machine.
pub fn default_target() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, STREAM_PORT))
}

// ── MessageName ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageName {
    #[serde(rename = "POSITION_UPDATE")]
    PositionUpdate,
    #[serde(rename = "AIRCRAFT_UPDATE")]
    AircraftUpdate,
}

impl MessageName {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageName::PositionUpdate => "POSITION_UPDATE",
            MessageName::AircraftUpdate => "AIRCRAFT_UPDATE",
        }
    }
}

// ── Wire views ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StreamMessage<T> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: MessageName,
    data: T,
}

#[derive(Serialize)]
struct PositionData {
    #[serde(serialize_with = "fixed6")] altitude_amsl: f64,
    #[serde(serialize_with = "fixed6")] altitude_agl: f64,
    #[serde(serialize_with = "fixed6")] latitude: f64,
    #[serde(serialize_with = "fixed6")] longitude: f64,
    #[serde(serialize_with = "fixed6")] pitch: f64,
    #[serde(serialize_with = "fixed6")] bank: f64,
    #[serde(serialize_with = "fixed6")] heading_true: f64,
    #[serde(serialize_with = "fixed6")] ground_speed: f64,
    #[serde(serialize_with = "fixed6")] vertical_speed: f64,
    #[serde(serialize_with = "fixed6")] fuel_kg: f64,
    #[serde(serialize_with = "fixed6")] gravity: f64,
    #[serde(serialize_with = "squawk")] transponder: u16,
    on_ground: bool,
    slew: bool,
    paused: bool,
    in_replay_mode: bool,
    #[serde(serialize_with = "fixed6")] fps: f64,
    #[serde(serialize_with = "fixed6")] time_acceleration: f64,
    autopilot_engaged: bool,
    engines_running: bool,
    parking_brake: bool,
    sim_abbreviation: &'static str,
    sim_version: &'static str,
    #[serde(serialize_with = "fixed6")] wind_speed: f64,
    #[serde(serialize_with = "fixed6")] wind_direction: f64,
}

impl From<&PositionSnapshot> for PositionData {
    fn from(s: &PositionSnapshot) -> Self {
        PositionData {
            altitude_amsl:     s.altitude_amsl_ft,
            altitude_agl:      s.altitude_agl_ft,
            latitude:          s.latitude_deg,
            longitude:         s.longitude_deg,
            pitch:             s.pitch_deg,
            bank:              s.bank_deg,
            heading_true:      s.heading_true_deg,
            ground_speed:      s.ground_speed_kt,
            vertical_speed:    s.vertical_speed_fpm,
            fuel_kg:           s.fuel_kg,
            gravity:           s.gravity,
            transponder:       s.transponder_code,
            on_ground:         s.on_ground,
            slew:              s.slew_active,
            paused:            s.paused,
            in_replay_mode:    s.in_replay_mode,
            fps:               s.frame_rate_hz,
            time_acceleration: s.time_acceleration,
            autopilot_engaged: s.autopilot_engaged,
            engines_running:   s.engines_running,
            parking_brake:     s.parking_brake_set,
            sim_abbreviation:  s.platform.abbreviation(),
            sim_version:       s.platform.version(),
            wind_speed:        s.wind_speed_kt,
            wind_direction:    s.wind_direction_deg,
        }
    }
}

#[derive(Serialize)]
struct AircraftData<'a> {
    title: &'a str,
    #[serde(rename = "type")]
    icao_type: &'a str,
    model: &'a str,
    registration: &'a str,
    airline: &'a str,
}

impl<'a> From<&'a AircraftIdentity> for AircraftData<'a> {
    fn from(id: &'a AircraftIdentity) -> Self {
        let clip = |s: &'a str| truncate_on_char_boundary(s, MAX_TEXT_FIELD_LEN);
        AircraftData {
            title:        clip(id.title.as_str()),
            icao_type:    clip(id.icao_type.as_str()),
            model:        clip(id.model.as_str()),
            registration: clip(id.registration.as_str()),
            airline:      clip(id.airline.as_str()),
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encode a [`PositionSnapshot`] as a `POSITION_UPDATE` message.
pub fn encode_position(snapshot: &PositionSnapshot) -> String {
    render(MessageName::PositionUpdate, PositionData::from(snapshot))
}

/// Encode an [`AircraftIdentity`] as an `AIRCRAFT_UPDATE` message.
///
/// Text is JSON-escaped and each field is capped at [`MAX_TEXT_FIELD_LEN`].
pub fn encode_aircraft(identity: &AircraftIdentity) -> String {
    render(MessageName::AircraftUpdate, AircraftData::from(identity))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn render<T: Serialize>(name: MessageName, data: T) -> String {
    let message = StreamMessage { kind: "STREAM", name, data };
    let mut out = Vec::with_capacity(MESSAGE_CAPACITY);
    if let Err(e) = serde_json::to_writer(&mut out, &message) {
        warn!(message = name.as_str(), error = %e, "encode failed, sending empty data");
        return empty_message(name);
    }
    String::from_utf8(out).unwrap_or_else(|_| empty_message(name))
}

fn empty_message(name: MessageName) -> String {
    format!(r#"{{"type":"STREAM","name":"{}","data":{{}}}}"#, name.as_str())
}

fn fixed6<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    let raw = RawValue::from_string(format!("{:.6}", finite_or_zero(*value)))
        .map_err(serde::ser::Error::custom)?;
    raw.serialize(serializer)
}

fn squawk<S: Serializer>(code: &u16, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:04}", (*code).min(9999)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use telemetry_schema::SimPlatform;

    const POSITION_KEYS: [&str; 25] = [
        "altitude_amsl", "altitude_agl", "latitude", "longitude",
        "pitch", "bank", "heading_true",
        "ground_speed", "vertical_speed", "fuel_kg", "gravity",
        "transponder",
        "on_ground", "slew", "paused", "in_replay_mode",
        "fps", "time_acceleration",
        "autopilot_engaged", "engines_running", "parking_brake",
        "sim_abbreviation", "sim_version",
        "wind_speed", "wind_direction",
    ];

    fn make_snap() -> PositionSnapshot {
        PositionSnapshot {
            platform:           SimPlatform::XPlane12,
            latitude_deg:       -26.1367,
            longitude_deg:      28.2411,
            altitude_amsl_ft:   5557.74,
            altitude_agl_ft:    0.0,
            heading_true_deg:   270.0,
            ground_speed_kt:    12.5,
            fuel_kg:            2100.0,
            transponder_code:   7000,
            on_ground:          true,
            parking_brake_set:  true,
            frame_rate_hz:      144.0,
            ..Default::default()
        }
    }

    #[test]
    fn position_message_has_every_field_exactly_once() {
        let json = encode_position(&make_snap());
        let v: Value = serde_json::from_str(&json).expect("valid json");

        assert_eq!(v["type"], "STREAM");
        assert_eq!(v["name"], "POSITION_UPDATE");
        let data = v["data"].as_object().unwrap();
        assert_eq!(data.len(), POSITION_KEYS.len());
        for key in POSITION_KEYS {
            assert!(data.contains_key(key), "missing {key}");
            assert_eq!(json.matches(&format!("\"{key}\":")).count(), 1, "duplicate {key}");
        }
    }

    #[test]
    fn keys_follow_wire_order() {
        let json = encode_position(&make_snap());
        let offsets: Vec<usize> = POSITION_KEYS
            .iter()
            .map(|k| json.find(&format!("\"{k}\":")).unwrap())
            .collect();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn message_is_single_line() {
        let json = encode_position(&make_snap());
        assert!(!json.contains('\n'));
        assert!(json.starts_with(r#"{"type":"STREAM","name":"POSITION_UPDATE","data":{"#));
        assert!(json.ends_with("}}"));
    }

    #[test]
    fn numbers_use_six_decimals() {
        let json = encode_position(&make_snap());
        assert!(json.contains(r#""latitude":-26.136700"#));
        assert!(json.contains(r#""heading_true":270.000000"#));
        assert!(json.contains(r#""altitude_agl":0.000000"#));
        assert!(json.contains(r#""gravity":1.000000"#));
    }

    #[test]
    fn booleans_are_literal_tokens() {
        let json = encode_position(&make_snap());
        assert!(json.contains(r#""on_ground":true"#));
        assert!(json.contains(r#""slew":false"#));
        assert!(json.contains(r#""parking_brake":true"#));
        assert!(!json.contains(":1,") && !json.contains(":0,"));
    }

    #[test]
    fn transponder_is_zero_padded() {
        let mut snap = make_snap();
        snap.transponder_code = 9;
        assert!(encode_position(&snap).contains(r#""transponder":"0009""#));
        snap.transponder_code = 1200;
        assert!(encode_position(&snap).contains(r#""transponder":"1200""#));
        snap.transponder_code = u16::MAX;
        assert!(encode_position(&snap).contains(r#""transponder":"9999""#));
    }

    #[test]
    fn platform_labels_are_embedded() {
        let json = encode_position(&make_snap());
        assert!(json.contains(r#""sim_abbreviation":"xp12","sim_version":"12.320""#));

        let msfs = PositionSnapshot { platform: SimPlatform::Msfs, ..Default::default() };
        let json = encode_position(&msfs);
        assert!(json.contains(r#""sim_abbreviation":"msfs","sim_version":"11.0""#));
    }

    #[test]
    fn non_finite_numbers_render_as_zero() {
        let mut snap = make_snap();
        snap.latitude_deg = f64::NAN;
        snap.wind_speed_kt = f64::INFINITY;
        let json = encode_position(&snap);
        assert!(json.contains(r#""latitude":0.000000"#));
        assert!(json.contains(r#""wind_speed":0.000000"#));
        assert!(serde_json::from_str::<Value>(&json).is_ok());
    }

    #[test]
    fn aircraft_message_shape() {
        let id = AircraftIdentity {
            title: "Cessna Skyhawk".into(),
            icao_type: "C172".into(),
            model: "C172".into(),
            registration: "ZS-SJW".into(),
            airline: String::new(),
        };
        let json = encode_aircraft(&id);
        assert_eq!(
            json,
            r#"{"type":"STREAM","name":"AIRCRAFT_UPDATE","data":{"title":"Cessna Skyhawk","type":"C172","model":"C172","registration":"ZS-SJW","airline":""}}"#,
        );
    }

    #[test]
    fn aircraft_text_is_escaped() {
        let id = AircraftIdentity {
            title: r#"Boeing "Max" \ Edition"#.into(),
            ..Default::default()
        };
        let json = encode_aircraft(&id);
        let v: Value = serde_json::from_str(&json).expect("escaped output parses");
        assert_eq!(v["data"]["title"], r#"Boeing "Max" \ Edition"#);
    }

    #[test]
    fn long_text_is_truncated() {
        let id = AircraftIdentity { title: "X".repeat(1000), ..Default::default() };
        let v: Value = serde_json::from_str(&encode_aircraft(&id)).unwrap();
        assert_eq!(v["data"]["title"].as_str().unwrap().len(), MAX_TEXT_FIELD_LEN);
    }

    #[test]
    fn default_target_is_loopback_6746() {
        assert_eq!(default_target().to_string(), "127.0.0.1:6746");
    }
}
