// xplane-udp-bridge/src/main.rs
// Finds X-Plane through its network beacon, subscribes to the telemetry
// datarefs and streams position and aircraft updates to the local tracker.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use stream_protocol::{StreamPublisher, STREAM_PORT};
use xplane_udp_bridge::{discover, UdpBridge, UdpRrefSocket};

// ── CLI args ──────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "xplane-udp-bridge", about = "Stream X-Plane telemetry to a local tracker over UDP")]
struct Args {
    /// Consumer address.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    host: IpAddr,
    #[arg(long, default_value_t = STREAM_PORT)]
    port: u16,
    /// Interval between position messages.
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,
    /// Sleep between receive passes.
    #[arg(long, default_value_t = 10)]
    idle_sleep_ms: u64,
    /// How long to wait for the X-Plane beacon.
    #[arg(long, default_value_t = 5000)]
    beacon_timeout_ms: u64,
    /// Skip discovery and talk to this X-Plane data port directly.
    #[arg(long)]
    xplane: Option<SocketAddr>,
    /// Stop once X-Plane has sent nothing for this long.
    #[arg(long, default_value_t = 30)]
    exit_after_silence_secs: u64,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let xplane = match args.xplane {
        Some(addr) => addr,
        None => discover(Duration::from_millis(args.beacon_timeout_ms))
            .context("Failed to find X-Plane")?
            .data_addr(),
    };

    let socket = UdpRrefSocket::open(xplane).context("Failed to open UDP socket")?;
    let mut bridge = UdpBridge::new(
        socket,
        Duration::from_millis(args.poll_interval_ms),
        Instant::now(),
    );
    bridge.start().context("Failed to subscribe to X-Plane datarefs")?;

    let mut publisher = StreamPublisher::new(SocketAddr::new(args.host, args.port));
    info!(xplane = %xplane, addr = %publisher.client().target(), "bridge running");

    let idle = Duration::from_millis(args.idle_sleep_ms);
    let max_silence = Duration::from_secs(args.exit_after_silence_secs);
    loop {
        let now = Instant::now();
        bridge.tick(now, &mut publisher);
        if bridge.silent_for(now) >= max_silence {
            warn!(silence = ?max_silence, "no data from X-Plane, stopping");
            break;
        }
        std::thread::sleep(idle);
    }

    bridge.shutdown();
    publisher.shutdown();
    info!("bridge stopped");
    Ok(())
}
