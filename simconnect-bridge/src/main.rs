// simconnect-bridge/src/main.rs
// Connects to a running MSFS instance and streams position and aircraft
// updates to the local tracker until the simulator quits.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use stream_protocol::{StreamPublisher, STREAM_PORT};

// ── CLI args ──────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[cfg_attr(not(windows), allow(dead_code))]
#[command(name = "simconnect-bridge", about = "Stream MSFS telemetry to a local tracker")]
struct Args {
    /// Consumer address.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    host: IpAddr,
    #[arg(long, default_value_t = STREAM_PORT)]
    port: u16,
    /// Interval between position requests.
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,
    /// Sleep between dispatch passes.
    #[arg(long, default_value_t = 10)]
    idle_sleep_ms: u64,
    /// Path or name of the SimConnect DLL.
    #[arg(long, default_value = "SimConnect.dll")]
    library: String,
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
    let target = SocketAddr::new(args.host, args.port);
    let publisher = StreamPublisher::new(target);

    run(&args, publisher)
}

#[cfg(windows)]
fn run(args: &Args, mut publisher: StreamPublisher) -> Result<()> {
    use simconnect_bridge::real::RealSimConnect;
    use simconnect_bridge::{LoopControl, SimConnectBridge, CLIENT_NAME};
    use std::time::{Duration, Instant};
    use tracing::info;

    let api = RealSimConnect::open(&args.library, CLIENT_NAME)
        .context("Failed to connect to SimConnect")?;

    let mut bridge = SimConnectBridge::new(
        api,
        Duration::from_millis(args.poll_interval_ms),
        Instant::now(),
    );
    bridge.register().context("Failed to register SimConnect data definitions")?;

    info!(addr = %publisher.client().target(), "bridge running");
    let idle = Duration::from_millis(args.idle_sleep_ms);
    while bridge.tick(Instant::now(), &mut publisher) == LoopControl::Continue {
        std::thread::sleep(idle);
    }

    publisher.shutdown();
    info!("bridge stopped");
    Ok(())
}

#[cfg(not(windows))]
fn run(_args: &Args, _publisher: StreamPublisher) -> Result<()> {
    Err(simconnect_bridge::SimConnectError::Unsupported)
        .context("simconnect-bridge needs a Windows host with MSFS installed")
}
