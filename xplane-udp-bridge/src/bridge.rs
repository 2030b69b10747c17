//! Position and identity tracking over RREF subscriptions.

use std::time::{Duration, Instant};

use telemetry_schema::{
    bounded_text, finite_or_zero, registration_or_tail_number, transponder_from_raw,
    AircraftIdentity, PollTimer, PositionSnapshot, SimPlatform, SourceAdapter, TelemetrySink,
    METERS_TO_FT,
};
use tracing::{debug, info, warn};

use crate::error::UdpBridgeError;
use crate::rref::{encode_command, parse_reply, RrefSocket, SubscriptionTable};

/// Rate for the position datarefs.
pub const POSITION_RATE_HZ: i32 = 10;
/// Rate for the ICAO watch and the byte-wise string fetches.
pub const IDENTITY_RATE_HZ: i32 = 1;
pub const IDENTITY_CHECK_INTERVAL: Duration = Duration::from_secs(2);
pub const STRING_FETCH_DEADLINE: Duration = Duration::from_secs(3);
pub const FRAME_RATE_FALLBACK_HZ: f64 = 144.0;

const BOOL_THRESHOLD: f64 = 0.5;
const PARKING_BRAKE_THRESHOLD: f64 = 0.5;
const ICAO_PREFIX_LEN: usize = 4;
const RECV_BUFFER_LEN: usize = 2048;

pub mod paths {
    pub const LATITUDE:           &str = "sim/flightmodel/position/latitude";
    pub const LONGITUDE:          &str = "sim/flightmodel/position/longitude";
    pub const ELEVATION_M:        &str = "sim/flightmodel/position/elevation";
    pub const Y_AGL_M:            &str = "sim/flightmodel/position/y_agl";
    pub const PITCH_DEG:          &str = "sim/flightmodel/position/theta";
    pub const BANK_DEG:           &str = "sim/flightmodel/position/phi";
    pub const TRUE_HEADING_DEG:   &str = "sim/flightmodel/position/psi";
    pub const GROUNDSPEED:        &str = "sim/flightmodel/position/groundspeed";
    pub const VVI_FPM:            &str = "sim/flightmodel/position/vh_ind_fpm";
    pub const FUEL_TOTAL_KG:      &str = "sim/flightmodel/weight/m_fuel_total";
    pub const GRAVITY_NORMAL:     &str = "sim/physics/gravity_normal";
    pub const TRANSPONDER_CODE:   &str = "sim/cockpit/radios/transponder_code";
    pub const ON_GROUND_ANY:      &str = "sim/flightmodel/failures/onground_any";
    pub const OVERRIDE_PLANEPATH: &str = "sim/operation/override/override_planepath[0]";
    pub const PAUSED:             &str = "sim/time/paused";
    pub const REPLAY_MODE:        &str = "sim/operation/prefs/replay_mode";
    pub const TIME_ACCEL:         &str = "sim/time/time_accel";
    pub const AUTOPILOT_MODE:     &str = "sim/cockpit/autopilot/autopilot_mode";
    pub const ENGINE_RUNNING:     &str = "sim/flightmodel/engine/ENGN_running[0]";
    pub const PARKING_BRAKE:      &str = "sim/cockpit2/controls/parking_brake_ratio";
    pub const WIND_SPEED_KT:      &str = "sim/weather/wind_speed_kt";
    pub const WIND_DIR_DEG:       &str = "sim/weather/wind_direction_degt";

    pub const ACF_ICAO:        &str = "sim/aircraft/view/acf_ICAO";
    pub const ACF_TAILNUM:     &str = "sim/aircraft/view/acf_tailnum";
    pub const ACF_LIVERY_PATH: &str = "sim/aircraft/view/acf_livery_path";

    pub const POSITION: [&str; 22] = [
        LATITUDE, LONGITUDE, ELEVATION_M, Y_AGL_M, PITCH_DEG, BANK_DEG, TRUE_HEADING_DEG,
        GROUNDSPEED, VVI_FPM, FUEL_TOTAL_KG, GRAVITY_NORMAL, TRANSPONDER_CODE, ON_GROUND_ANY,
        OVERRIDE_PLANEPATH, PAUSED, REPLAY_MODE, TIME_ACCEL, AUTOPILOT_MODE, ENGINE_RUNNING,
        PARKING_BRAKE, WIND_SPEED_KT, WIND_DIR_DEG,
    ];
}

pub const ICAO_MAX_LEN: usize        = 40;
pub const TAIL_NUMBER_MAX_LEN: usize = 40;
pub const LIVERY_PATH_MAX_LEN: usize = 255;

/// Path of element `i` of a byte-array dataref.
pub fn element(base: &str, i: usize) -> String {
    format!("{base}[{i}]")
}

// ── Byte-wise string fetch ────────────────────────────────────────────────────

/// One string dataref being assembled from per-byte subscriptions.
#[derive(Debug)]
struct StringFetch {
    paths:   Vec<String>,
    max_len: usize,
}

impl StringFetch {
    fn new(base: &str, max_len: usize) -> Self {
        StringFetch { paths: (0..max_len).map(|i| element(base, i)).collect(), max_len }
    }

    /// The string, once every byte up to the terminator has arrived.
    fn assemble(&self, table: &SubscriptionTable) -> Option<String> {
        let mut bytes = Vec::with_capacity(self.max_len);
        for path in &self.paths {
            let byte = table.get(path)? as u8;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        Some(bounded_text(&bytes, self.max_len))
    }
}

/// Identity fetch started by an ICAO prefix change.
#[derive(Debug)]
struct IdentityFetch {
    prefix:  String,
    started: Instant,
    icao:    StringFetch,
    tail:    StringFetch,
    livery:  StringFetch,
}

impl IdentityFetch {
    fn fields(&self) -> [&StringFetch; 3] {
        [&self.icao, &self.tail, &self.livery]
    }
}

// ── UdpBridge ─────────────────────────────────────────────────────────────────

pub struct UdpBridge<S: RrefSocket> {
    socket:         S,
    table:          SubscriptionTable,
    position_timer: PollTimer,
    identity_timer: PollTimer,
    last_prefix:    String,
    fetch:          Option<IdentityFetch>,
    last_data:      Instant,
    recv_buf:       Vec<u8>,
}

impl<S: RrefSocket> UdpBridge<S> {
    pub fn new(socket: S, poll_interval: Duration, now: Instant) -> Self {
        UdpBridge {
            socket,
            table:          SubscriptionTable::new(),
            position_timer: PollTimer::new(poll_interval, now),
            identity_timer: PollTimer::new(IDENTITY_CHECK_INTERVAL, now),
            last_prefix:    String::new(),
            fetch:          None,
            last_data:      now,
            recv_buf:       vec![0; RECV_BUFFER_LEN],
        }
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn table(&self) -> &SubscriptionTable {
        &self.table
    }

    /// `true` while an identity fetch is waiting for bytes.
    pub fn fetching_identity(&self) -> bool {
        self.fetch.is_some()
    }

    /// Time since the last RREF datagram (or since construction).
    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_data)
    }

    /// Subscribe the position datarefs and the ICAO prefix watch.
    pub fn start(&mut self) -> Result<(), UdpBridgeError> {
        for path in paths::POSITION {
            self.subscribe(path, POSITION_RATE_HZ)?;
        }
        for i in 0..ICAO_PREFIX_LEN {
            self.subscribe(&element(paths::ACF_ICAO, i), IDENTITY_RATE_HZ)?;
        }
        info!(subscriptions = self.table.len(), "RREF subscriptions sent");
        Ok(())
    }

    /// Cancel every active subscription.
    pub fn shutdown(&mut self) {
        let active: Vec<String> = self.table.paths().map(|(p, _)| p.to_string()).collect();
        let mut failed = 0usize;
        for path in &active {
            if self.unsubscribe(path).is_err() {
                failed += 1;
            }
        }
        if failed > 0 {
            warn!(failed, total = active.len(), "some unsubscribe commands could not be sent");
        }
        self.fetch = None;
        info!(count = active.len(), "RREF subscriptions cancelled");
    }

    fn subscribe(&mut self, path: &str, freq: i32) -> Result<(), UdpBridgeError> {
        let index = self.table.register(path);
        let command = encode_command(freq, index, path)?;
        self.socket.send_command(&command)?;
        Ok(())
    }

    fn unsubscribe(&mut self, path: &str) -> Result<(), UdpBridgeError> {
        if let Some(index) = self.table.remove(path) {
            let command = encode_command(0, index, path)?;
            self.socket.send_command(&command)?;
        }
        Ok(())
    }

    /// Read every queued datagram into the value table.
    pub fn drain(&mut self, now: Instant) {
        loop {
            match self.socket.try_recv(&mut self.recv_buf) {
                Ok(Some(n)) => {
                    let Some(pairs) = parse_reply(&self.recv_buf[..n]) else {
                        debug!(len = n, "ignoring non-RREF datagram");
                        continue;
                    };
                    self.last_data = now;
                    for (index, value) in pairs {
                        self.table.store(index, value);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "UDP receive failed");
                    break;
                }
            }
        }
    }

    /// Build a snapshot from the latest values. Missing values read as 0.
    pub fn read_position(&self) -> PositionSnapshot {
        let v = |path: &str| finite_or_zero(self.table.get(path).map_or(0.0, f64::from));

        PositionSnapshot {
            platform:           SimPlatform::XPlane12,
            latitude_deg:       v(paths::LATITUDE),
            longitude_deg:      v(paths::LONGITUDE),
            altitude_amsl_ft:   v(paths::ELEVATION_M) * METERS_TO_FT,
            altitude_agl_ft:    v(paths::Y_AGL_M) * METERS_TO_FT,
            pitch_deg:          v(paths::PITCH_DEG),
            bank_deg:           v(paths::BANK_DEG),
            heading_true_deg:   v(paths::TRUE_HEADING_DEG),
            ground_speed_kt:    v(paths::GROUNDSPEED),
            vertical_speed_fpm: v(paths::VVI_FPM),
            fuel_kg:            v(paths::FUEL_TOTAL_KG),
            gravity:            v(paths::GRAVITY_NORMAL),
            transponder_code:   transponder_from_raw(v(paths::TRANSPONDER_CODE)),
            on_ground:          v(paths::ON_GROUND_ANY) > BOOL_THRESHOLD,
            slew_active:        v(paths::OVERRIDE_PLANEPATH) > BOOL_THRESHOLD,
            paused:             v(paths::PAUSED) > BOOL_THRESHOLD,
            in_replay_mode:     v(paths::REPLAY_MODE) > BOOL_THRESHOLD,
            autopilot_engaged:  v(paths::AUTOPILOT_MODE) > 0.0,
            engines_running:    v(paths::ENGINE_RUNNING) > BOOL_THRESHOLD,
            parking_brake_set:  v(paths::PARKING_BRAKE) > PARKING_BRAKE_THRESHOLD,
            frame_rate_hz:      FRAME_RATE_FALLBACK_HZ,
            time_acceleration:  v(paths::TIME_ACCEL),
            wind_speed_kt:      v(paths::WIND_SPEED_KT),
            wind_direction_deg: v(paths::WIND_DIR_DEG),
        }
    }

    /// First characters of `acf_ICAO`, up to the first missing or NUL byte.
    pub fn icao_prefix(&self) -> String {
        let bytes: Vec<u8> = (0..ICAO_PREFIX_LEN)
            .map_while(|i| self.table.get(&element(paths::ACF_ICAO, i)))
            .map(|v| v as u8)
            .take_while(|&b| b != 0)
            .collect();
        bounded_text(&bytes, ICAO_PREFIX_LEN)
    }

    fn begin_identity_fetch(&mut self, prefix: String, now: Instant) {
        info!(prefix = %prefix, "aircraft change detected, fetching identity");
        let fetch = IdentityFetch {
            prefix,
            started: now,
            icao:    StringFetch::new(paths::ACF_ICAO, ICAO_MAX_LEN),
            tail:    StringFetch::new(paths::ACF_TAILNUM, TAIL_NUMBER_MAX_LEN),
            livery:  StringFetch::new(paths::ACF_LIVERY_PATH, LIVERY_PATH_MAX_LEN),
        };
        let byte_paths: Vec<String> =
            fetch.fields().iter().flat_map(|f| f.paths.iter().cloned()).collect();
        for path in &byte_paths {
            if let Err(e) = self.subscribe(path, IDENTITY_RATE_HZ) {
                warn!(path = %path, error = %e, "string byte subscription failed");
            }
        }
        self.fetch = Some(fetch);
    }

    /// Advance a running fetch. Publishes once every string is complete or
    /// the deadline passes; incomplete strings are then empty.
    fn poll_identity_fetch(&mut self, now: Instant, sink: &mut dyn TelemetrySink) {
        let Some(fetch) = &self.fetch else { return };

        let [icao, tail, livery] = fetch.fields().map(|f| f.assemble(&self.table));
        let complete = icao.is_some() && tail.is_some() && livery.is_some();
        let expired = now.saturating_duration_since(fetch.started) >= STRING_FETCH_DEADLINE;
        if !complete && !expired {
            return;
        }
        if !complete {
            warn!(
                icao = icao.is_some(),
                tail = tail.is_some(),
                livery = livery.is_some(),
                "identity fetch timed out, sending what arrived",
            );
        }

        let Some(fetch) = self.fetch.take() else { return };
        let icao = icao.unwrap_or_default();
        let tail = tail.unwrap_or_default();
        let livery = livery.unwrap_or_default();
        debug!(livery_path = %livery, "livery path");

        // Keep the prefix watch alive; it shares paths with the ICAO fetch.
        let watch: Vec<String> = (0..ICAO_PREFIX_LEN).map(|i| element(paths::ACF_ICAO, i)).collect();
        for path in fetch.fields().iter().flat_map(|f| f.paths.iter()) {
            if watch.contains(path) {
                continue;
            }
            if let Err(e) = self.unsubscribe(path) {
                debug!(path = %path, error = %e, "unsubscribe failed");
            }
        }

        let identity = AircraftIdentity {
            title:        String::new(),
            icao_type:    icao.clone(),
            model:        icao,
            registration: registration_or_tail_number(&livery, &tail),
            airline:      String::new(),
        };
        info!(
            icao = %identity.icao_type,
            registration = %identity.registration,
            "aircraft identity assembled",
        );
        sink.publish_aircraft(&identity);
        self.last_prefix = fetch.prefix;
    }

    /// One loop iteration: drain replies, advance identity tracking, then
    /// publish a position if the poll interval has elapsed.
    pub fn tick(&mut self, now: Instant, sink: &mut dyn TelemetrySink) {
        self.drain(now);

        if self.fetch.is_some() {
            self.poll_identity_fetch(now, sink);
        } else if self.identity_timer.fire(now) {
            let prefix = self.icao_prefix();
            if !prefix.is_empty() && prefix != self.last_prefix {
                self.begin_identity_fetch(prefix, now);
            }
        }

        if self.position_timer.fire(now) {
            sink.publish_position(&self.read_position());
        }
    }
}

impl<S: RrefSocket> SourceAdapter for UdpBridge<S> {
    fn platform(&self) -> SimPlatform {
        SimPlatform::XPlane12
    }

    fn pump(&mut self, now: Instant, sink: &mut dyn TelemetrySink) {
        self.tick(now, sink);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rref::MockRrefSocket;
    use telemetry_schema::MemorySink;

    const POLL: Duration = Duration::from_millis(100);

    fn started(t0: Instant) -> UdpBridge<MockRrefSocket> {
        let mut bridge = UdpBridge::new(MockRrefSocket::new(), POLL, t0);
        bridge.start().unwrap();
        bridge
    }

    /// Queue a reply for `path`, using whatever index the bridge gave it.
    fn reply(bridge: &mut UdpBridge<MockRrefSocket>, path: &str, value: f32) {
        let index = bridge.socket().index_of(path).expect("path not subscribed");
        bridge.socket_mut().push_reply(&[(index, value)]);
    }

    fn reply_string(bridge: &mut UdpBridge<MockRrefSocket>, base: &str, text: &str) {
        let bytes: Vec<u8> = text.bytes().chain(std::iter::once(0)).collect();
        for (i, b) in bytes.iter().enumerate() {
            reply(bridge, &element(base, i), f32::from(*b));
        }
    }

    #[test]
    fn start_subscribes_position_and_prefix_watch() {
        let bridge = started(Instant::now());
        let cmds = bridge.socket().commands();
        assert_eq!(cmds.len(), 22 + 4);
        assert!(cmds[..22].iter().all(|c| c.freq == POSITION_RATE_HZ));
        assert!(cmds[22..].iter().all(|c| c.freq == IDENTITY_RATE_HZ));
        assert_eq!(cmds[22].path, "sim/aircraft/view/acf_ICAO[0]");

        let mut indices: Vec<_> = cmds.iter().map(|c| c.index).collect();
        indices.dedup();
        assert_eq!(indices.len(), 26);
    }

    #[test]
    fn position_uses_latest_values_and_plugin_conversions() {
        let t0 = Instant::now();
        let mut bridge = started(t0);
        let mut sink = MemorySink::new();

        reply(&mut bridge, paths::LATITUDE, 47.5);
        reply(&mut bridge, paths::ELEVATION_M, 1000.0);
        reply(&mut bridge, paths::TRANSPONDER_CODE, 7700.0);
        reply(&mut bridge, paths::AUTOPILOT_MODE, 1.0);
        reply(&mut bridge, paths::PARKING_BRAKE, 0.4);
        reply(&mut bridge, paths::ENGINE_RUNNING, 1.0);
        reply(&mut bridge, paths::GRAVITY_NORMAL, 1.0);

        bridge.tick(t0 + POLL, &mut sink);
        let pos = sink.positions()[0];
        assert_eq!(pos.platform, SimPlatform::XPlane12);
        assert_eq!(pos.latitude_deg, 47.5);
        assert!((pos.altitude_amsl_ft - 3280.84).abs() < 1e-6);
        assert_eq!(pos.transponder_code, 7700);
        assert!(pos.autopilot_engaged);
        assert!(pos.engines_running);
        assert!(!pos.parking_brake_set);
        assert!(!pos.on_ground);
        assert_eq!(pos.frame_rate_hz, FRAME_RATE_FALLBACK_HZ);
        assert_eq!(pos.gravity, 1.0);
    }

    #[test]
    fn position_is_timer_gated() {
        let t0 = Instant::now();
        let mut bridge = started(t0);
        let mut sink = MemorySink::new();
        for ms in [0, 50, 99, 100, 150, 200] {
            bridge.tick(t0 + Duration::from_millis(ms), &mut sink);
        }
        assert_eq!(sink.positions().len(), 2);
    }

    #[test]
    fn prefix_stops_at_missing_or_nul_byte() {
        let mut bridge = started(Instant::now());
        assert_eq!(bridge.icao_prefix(), "");

        reply(&mut bridge, "sim/aircraft/view/acf_ICAO[0]", f32::from(b'C'));
        reply(&mut bridge, "sim/aircraft/view/acf_ICAO[1]", f32::from(b'1'));
        reply(&mut bridge, "sim/aircraft/view/acf_ICAO[2]", f32::from(b'7'));
        reply(&mut bridge, "sim/aircraft/view/acf_ICAO[3]", 0.0);
        bridge.drain(Instant::now());
        assert_eq!(bridge.icao_prefix(), "C17");
    }

    #[test]
    fn identity_is_fetched_on_prefix_change() {
        let t0 = Instant::now();
        let mut bridge = started(t0);
        let mut sink = MemorySink::new();

        for (i, b) in b"B738".iter().enumerate() {
            reply(&mut bridge, &element(paths::ACF_ICAO, i), f32::from(*b));
        }
        bridge.tick(t0 + IDENTITY_CHECK_INTERVAL, &mut sink);
        assert!(bridge.fetching_identity());

        reply_string(&mut bridge, paths::ACF_ICAO, "B738");
        reply_string(&mut bridge, paths::ACF_TAILNUM, "N12345");
        reply_string(&mut bridge, paths::ACF_LIVERY_PATH, "Liveries/KLM PH-BXA/");
        bridge.tick(t0 + IDENTITY_CHECK_INTERVAL + POLL, &mut sink);

        assert!(!bridge.fetching_identity());
        let id = sink.aircraft()[0];
        assert_eq!(id.icao_type, "B738");
        assert_eq!(id.model, "B738");
        assert_eq!(id.title, "");
        assert_eq!(id.registration, "PH-BXA");

        // Byte subscriptions are cancelled, the prefix watch survives.
        assert!(bridge.table().get(&element(paths::ACF_TAILNUM, 0)).is_none());
        assert_eq!(bridge.table().len(), 22 + 4);

        // Same prefix two seconds later: nothing new.
        bridge.tick(t0 + IDENTITY_CHECK_INTERVAL * 2 + POLL, &mut sink);
        assert!(!bridge.fetching_identity());
        assert_eq!(sink.aircraft().len(), 1);
    }

    #[test]
    fn fetch_times_out_with_partial_strings() {
        let t0 = Instant::now();
        let mut bridge = started(t0);
        let mut sink = MemorySink::new();

        for (i, b) in b"A20N".iter().enumerate() {
            reply(&mut bridge, &element(paths::ACF_ICAO, i), f32::from(*b));
        }
        bridge.tick(t0 + IDENTITY_CHECK_INTERVAL, &mut sink);
        reply_string(&mut bridge, paths::ACF_ICAO, "A20N");
        reply_string(&mut bridge, paths::ACF_TAILNUM, "D-AXYZ");
        // No livery bytes at all.

        bridge.tick(t0 + IDENTITY_CHECK_INTERVAL + Duration::from_secs(1), &mut sink);
        assert!(bridge.fetching_identity());
        assert!(sink.aircraft().is_empty());

        bridge.tick(t0 + IDENTITY_CHECK_INTERVAL + STRING_FETCH_DEADLINE, &mut sink);
        let id = sink.aircraft()[0];
        assert_eq!(id.icao_type, "A20N");
        assert_eq!(id.registration, "D-AXYZ");
    }

    #[test]
    fn unknown_indices_and_foreign_datagrams_are_ignored() {
        let t0 = Instant::now();
        let mut bridge = started(t0);
        bridge.socket_mut().push_reply(&[(9999, 1.0)]);
        bridge.socket_mut().inbox.push_back(b"BECN\0junk".to_vec());
        bridge.drain(t0);
        assert_eq!(bridge.read_position(), PositionSnapshot {
            platform:      SimPlatform::XPlane12,
            frame_rate_hz: FRAME_RATE_FALLBACK_HZ,
            gravity:       0.0,
            time_acceleration: 0.0,
            ..PositionSnapshot::default()
        });
    }

    #[test]
    fn silence_is_measured_from_last_reply() {
        let t0 = Instant::now();
        let mut bridge = started(t0);
        assert_eq!(bridge.silent_for(t0 + Duration::from_secs(3)), Duration::from_secs(3));
        reply(&mut bridge, paths::PAUSED, 0.0);
        bridge.drain(t0 + Duration::from_secs(3));
        assert_eq!(bridge.silent_for(t0 + Duration::from_secs(4)), Duration::from_secs(1));
    }

    #[test]
    fn shutdown_unsubscribes_everything() {
        let mut bridge = started(Instant::now());
        bridge.shutdown();
        assert!(bridge.table().is_empty());
        let cancels = bridge.socket().commands().into_iter().filter(|c| c.freq == 0).count();
        assert_eq!(cancels, 26);
    }
}
