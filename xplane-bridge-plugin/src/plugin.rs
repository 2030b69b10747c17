//! BridgePlugin: dataref reads and the X-Plane → canonical mapping.
//!
//! This module is free of any XPLM types so it can be fully unit-tested via
//! the `MockXplm` shim. It never owns the output; every publishing method
//! takes the [`TelemetrySink`] to write into.

use std::time::Instant;

use telemetry_schema::{
    bounded_text, finite_or_zero, registration_or_tail_number, transponder_from_raw,
    AircraftIdentity, PositionSnapshot, SimPlatform, SourceAdapter, TelemetrySink, METERS_TO_FT,
};
use tracing::{debug, info};

use crate::xplm_shim::{DataRefHandle, XplmApi};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Seconds until X-Plane calls the flight loop again.
pub const FLIGHT_LOOP_INTERVAL_S: f32 = 0.1;

/// `sim/graphics/view/framerate_period` is stale under XP12, so a fixed
/// rate is reported instead.
pub const FRAME_RATE_FALLBACK_HZ: f64 = 144.0;

/// `XPLM_MSG_LIVERY_LOADED`; param is the aircraft index (0 = user).
pub const XPLM_MSG_LIVERY_LOADED: i32 = 108;

pub const PARKING_BRAKE_THRESHOLD: f32 = 0.5;

pub const ICAO_MAX_LEN: usize        = 40;
pub const TAIL_NUMBER_MAX_LEN: usize = 40;
pub const LIVERY_PATH_MAX_LEN: usize = 255;

// ── X-Plane dataref paths ─────────────────────────────────────────────────────

pub mod paths {
    // Position
    pub const LATITUDE:     &str = "sim/flightmodel/position/latitude";
    pub const LONGITUDE:    &str = "sim/flightmodel/position/longitude";
    pub const ELEVATION_M:  &str = "sim/flightmodel/position/elevation";
    pub const Y_AGL_M:      &str = "sim/flightmodel/position/y_agl";
    // Attitude
    pub const PITCH_DEG:    &str = "sim/flightmodel/position/theta";
    pub const BANK_DEG:     &str = "sim/flightmodel/position/phi";
    pub const TRUE_HEADING_DEG: &str = "sim/flightmodel/position/psi";
    // Speeds
    pub const GROUNDSPEED:  &str = "sim/flightmodel/position/groundspeed";
    pub const VVI_FPM:      &str = "sim/flightmodel/position/vh_ind_fpm";
    // Aircraft
    pub const FUEL_TOTAL_KG:    &str = "sim/flightmodel/weight/m_fuel_total";
    pub const GRAVITY_NORMAL:   &str = "sim/physics/gravity_normal";
    pub const TRANSPONDER_CODE: &str = "sim/cockpit/radios/transponder_code";
    // Sim state
    pub const ON_GROUND_ANY:     &str = "sim/flightmodel/failures/onground_any";
    pub const OVERRIDE_PLANEPATH: &str = "sim/operation/override/override_planepath";
    pub const PAUSED:            &str = "sim/time/paused";
    pub const REPLAY_MODE:       &str = "sim/operation/prefs/replay_mode";
    pub const TIME_ACCEL:        &str = "sim/time/time_accel";
    pub const AUTOPILOT_MODE:    &str = "sim/cockpit/autopilot/autopilot_mode";
    pub const ENGINE_RUNNING:    &str = "sim/flightmodel/engine/ENGN_running";
    pub const PARKING_BRAKE:     &str = "sim/cockpit2/controls/parking_brake_ratio";
    // Weather
    pub const WIND_SPEED_KT: &str = "sim/weather/wind_speed_kt";
    pub const WIND_DIR_DEG:  &str = "sim/weather/wind_direction_degt";
    // Identity (byte datarefs)
    pub const ACF_ICAO:        &str = "sim/aircraft/view/acf_ICAO";
    pub const ACF_TAILNUM:     &str = "sim/aircraft/view/acf_tailnum";
    pub const ACF_LIVERY_PATH: &str = "sim/aircraft/view/acf_livery_path";
}

// ── DataRefHandles ────────────────────────────────────────────────────────────

/// Cached dataref handles looked up once at plugin enable time.
#[derive(Default)]
pub struct DataRefHandles {
    pub latitude:           Option<DataRefHandle>,
    pub longitude:          Option<DataRefHandle>,
    pub elevation_m:        Option<DataRefHandle>,
    pub y_agl_m:            Option<DataRefHandle>,
    pub pitch_deg:          Option<DataRefHandle>,
    pub bank_deg:           Option<DataRefHandle>,
    pub true_heading_deg:   Option<DataRefHandle>,
    pub groundspeed:        Option<DataRefHandle>,
    pub vvi_fpm:            Option<DataRefHandle>,
    pub fuel_total_kg:      Option<DataRefHandle>,
    pub gravity_normal:     Option<DataRefHandle>,
    pub transponder_code:   Option<DataRefHandle>,
    pub on_ground_any:      Option<DataRefHandle>,
    pub override_planepath: Option<DataRefHandle>,
    pub paused:             Option<DataRefHandle>,
    pub replay_mode:        Option<DataRefHandle>,
    pub time_accel:         Option<DataRefHandle>,
    pub autopilot_mode:     Option<DataRefHandle>,
    pub engine_running:     Option<DataRefHandle>,
    pub parking_brake:      Option<DataRefHandle>,
    pub wind_speed_kt:      Option<DataRefHandle>,
    pub wind_dir_deg:       Option<DataRefHandle>,
    pub acf_icao:           Option<DataRefHandle>,
    pub acf_tailnum:        Option<DataRefHandle>,
    pub acf_livery_path:    Option<DataRefHandle>,
}

// ── BridgePlugin ──────────────────────────────────────────────────────────────

pub struct BridgePlugin {
    xplm:    Box<dyn XplmApi>,
    handles: DataRefHandles,
    ticks:   u64,
}

impl BridgePlugin {
    pub fn new(xplm: Box<dyn XplmApi>) -> Self {
        BridgePlugin {
            xplm,
            handles: DataRefHandles::default(),
            ticks: 0,
        }
    }

    /// Number of flight-loop ticks that published a position.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // ── Handle caching ────────────────────────────────────────────────────────

    /// (Re-)fetch all dataref handles. Call once at enable.
    pub fn find_handles(&mut self) {
        macro_rules! find {
            ($field:ident, $path:expr) => {
                self.handles.$field = self.xplm.find_dataref($path);
                if self.handles.$field.is_none() {
                    self.xplm.log(&format!("Telemetry Bridge: dataref not found: {}\n", $path));
                }
            };
        }

        find!(latitude,           paths::LATITUDE);
        find!(longitude,          paths::LONGITUDE);
        find!(elevation_m,        paths::ELEVATION_M);
        find!(y_agl_m,            paths::Y_AGL_M);
        find!(pitch_deg,          paths::PITCH_DEG);
        find!(bank_deg,           paths::BANK_DEG);
        find!(true_heading_deg,   paths::TRUE_HEADING_DEG);
        find!(groundspeed,        paths::GROUNDSPEED);
        find!(vvi_fpm,            paths::VVI_FPM);
        find!(fuel_total_kg,      paths::FUEL_TOTAL_KG);
        find!(gravity_normal,     paths::GRAVITY_NORMAL);
        find!(transponder_code,   paths::TRANSPONDER_CODE);
        find!(on_ground_any,      paths::ON_GROUND_ANY);
        find!(override_planepath, paths::OVERRIDE_PLANEPATH);
        find!(paused,             paths::PAUSED);
        find!(replay_mode,        paths::REPLAY_MODE);
        find!(time_accel,         paths::TIME_ACCEL);
        find!(autopilot_mode,     paths::AUTOPILOT_MODE);
        find!(engine_running,     paths::ENGINE_RUNNING);
        find!(parking_brake,      paths::PARKING_BRAKE);
        find!(wind_speed_kt,      paths::WIND_SPEED_KT);
        find!(wind_dir_deg,       paths::WIND_DIR_DEG);
        find!(acf_icao,           paths::ACF_ICAO);
        find!(acf_tailnum,        paths::ACF_TAILNUM);
        find!(acf_livery_path,    paths::ACF_LIVERY_PATH);
    }

    // ── Snapshot assembly ─────────────────────────────────────────────────────

    /// Read every position dataref and assemble a [`PositionSnapshot`].
    ///
    /// Missing handles read as zero.
    pub fn read_position(&self) -> PositionSnapshot {
        let gf = |h: Option<DataRefHandle>| h.map_or(0.0_f64, |h| finite_or_zero(self.xplm.get_float(h) as f64));
        let gd = |h: Option<DataRefHandle>| h.map_or(0.0_f64, |h| finite_or_zero(self.xplm.get_double(h)));
        let gi = |h: Option<DataRefHandle>| h.map_or(0_i32,   |h| self.xplm.get_int(h));
        // Per-aircraft array datarefs; element 0 is the user aircraft / engine 1.
        let first = |h: Option<DataRefHandle>| {
            let mut out = [0i32; 1];
            if let Some(h) = h { self.xplm.get_int_array(h, 0, &mut out); }
            out[0]
        };

        let parking_brake_ratio = self.handles.parking_brake.map_or(0.0, |h| self.xplm.get_float(h));

        PositionSnapshot {
            platform:           SimPlatform::XPlane12,
            latitude_deg:       gd(self.handles.latitude),
            longitude_deg:      gd(self.handles.longitude),
            altitude_amsl_ft:   gd(self.handles.elevation_m) * METERS_TO_FT,
            altitude_agl_ft:    gf(self.handles.y_agl_m) * METERS_TO_FT,
            pitch_deg:          gf(self.handles.pitch_deg),
            bank_deg:           gf(self.handles.bank_deg),
            heading_true_deg:   gf(self.handles.true_heading_deg),
            ground_speed_kt:    gf(self.handles.groundspeed),
            vertical_speed_fpm: gf(self.handles.vvi_fpm),
            fuel_kg:            gf(self.handles.fuel_total_kg),
            gravity:            gf(self.handles.gravity_normal),
            transponder_code:   transponder_from_raw(gi(self.handles.transponder_code) as f64),
            on_ground:          gi(self.handles.on_ground_any) != 0,
            slew_active:        first(self.handles.override_planepath) != 0,
            paused:             gi(self.handles.paused) != 0,
            in_replay_mode:     gi(self.handles.replay_mode) != 0,
            autopilot_engaged:  gi(self.handles.autopilot_mode) != 0,
            engines_running:    first(self.handles.engine_running) != 0,
            parking_brake_set:  parking_brake_ratio > PARKING_BRAKE_THRESHOLD,
            frame_rate_hz:      FRAME_RATE_FALLBACK_HZ,
            time_acceleration:  gf(self.handles.time_accel),
            wind_speed_kt:      gf(self.handles.wind_speed_kt),
            wind_direction_deg: gf(self.handles.wind_dir_deg),
        }
    }

    /// Read the user aircraft's identity from the byte datarefs.
    ///
    /// Registration comes from the livery folder name when it carries one,
    /// otherwise from `acf_tailnum`.
    pub fn read_identity(&self) -> AircraftIdentity {
        let icao        = self.read_text(self.handles.acf_icao, ICAO_MAX_LEN);
        let livery_path = self.read_text(self.handles.acf_livery_path, LIVERY_PATH_MAX_LEN);
        debug!(livery_path = %livery_path, "livery path");

        let tail_number  = self.read_text(self.handles.acf_tailnum, TAIL_NUMBER_MAX_LEN);
        let registration = registration_or_tail_number(&livery_path, &tail_number);

        AircraftIdentity {
            title:        String::new(),
            icao_type:    icao.clone(),
            model:        icao,
            registration,
            airline:      String::new(),
        }
    }

    fn read_text(&self, handle: Option<DataRefHandle>, max_len: usize) -> String {
        let Some(h) = handle else { return String::new() };
        let mut buf = vec![0u8; max_len];
        let n = self.xplm.get_bytes(h, &mut buf);
        bounded_text(&buf[..n], max_len)
    }

    // ── Flight loop tick ──────────────────────────────────────────────────────

    /// Called from the X-Plane flight loop callback.
    ///
    /// Publishes one position and returns the seconds until the next call.
    pub fn flight_loop_tick(&mut self, sink: &mut dyn TelemetrySink) -> f32 {
        let snapshot = self.read_position();
        sink.publish_position(&snapshot);
        self.ticks += 1;
        FLIGHT_LOOP_INTERVAL_S
    }

    // ── Inter-plugin messages ─────────────────────────────────────────────────

    /// React to `XPluginReceiveMessage`. Only a livery load on the user
    /// aircraft publishes anything.
    pub fn handle_message(&mut self, from: i32, msg: i32, param: usize, sink: &mut dyn TelemetrySink) {
        debug!(from, msg, param, "plugin message");
        if msg != XPLM_MSG_LIVERY_LOADED || param != 0 {
            return;
        }

        let identity = self.read_identity();
        info!(
            icao = %identity.icao_type,
            registration = %identity.registration,
            "user aircraft livery loaded",
        );
        sink.publish_aircraft(&identity);
    }
}

impl SourceAdapter for BridgePlugin {
    fn platform(&self) -> SimPlatform {
        SimPlatform::XPlane12
    }

    fn pump(&mut self, _now: Instant, sink: &mut dyn TelemetrySink) {
        self.flight_loop_tick(sink);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
