use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mvirt_stub::config::{DEFAULT_NAME_PREFIX, DEFAULT_STUB_COUNT};
use mvirt_stub::frame::build_ipv4_frame;
use mvirt_stub::host::NetDeviceOps;
use mvirt_stub::host::system::load_interfaces;
use mvirt_stub::{Classification, Delivery, Frame, MemoryHost, StubConfig, StubRegistry};
use smoltcp::wire::EthernetAddress;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Sender of probe frames (TEST-NET-1).
const PROBE_SRC: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
const PROBE_SRC_MAC: EthernetAddress = EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

#[derive(Parser, Debug)]
#[command(name = "mvirt-stub")]
#[command(about = "Stub pseudo devices on a physical uplink")]
struct Args {
    /// Physical adapter to which the stubs are attached
    #[arg(short, long)]
    uplink: String,

    /// Number of stub pseudo devices
    #[arg(short = 'n', long = "stubs", default_value_t = DEFAULT_STUB_COUNT)]
    stubs: usize,

    /// Debug messages on traversing frames
    #[arg(short, long)]
    debug: bool,

    /// Stub device name prefix
    #[arg(long, default_value = DEFAULT_NAME_PREFIX)]
    prefix: String,

    /// What to do with a frame once its owner is known
    #[arg(long, value_enum, default_value_t = Delivery::Discard)]
    delivery: Delivery,

    /// Classify a frame destined to this address (repeatable)
    #[arg(long = "probe")]
    probes: Vec<Ipv4Addr>,
}

/// Filter directives; `--debug` only opens up per-frame messages.
fn log_directives(debug: bool) -> Vec<&'static str> {
    let mut directives = vec!["mvirt_stub=info"];
    if debug {
        directives.push("mvirt_stub::frames=debug");
    }
    directives
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut filter = EnvFilter::from_default_env();
    for directive in log_directives(args.debug) {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let host = Arc::new(MemoryHost::new());
    let count = load_interfaces(&host).context("Failed to enumerate host interfaces")?;
    info!(count, "Loaded host interfaces");

    let config = StubConfig::new(args.uplink)
        .count(args.stubs)
        .debug(args.debug)
        .name_prefix(args.prefix)
        .delivery(args.delivery);

    let registry = match StubRegistry::initialize(config, Arc::clone(&host)) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Failed to set up stubs");
            return Err(e.into());
        }
    };

    info!(delivery = ?registry.config().delivery, "Inbound delivery policy");
    for (index, stub) in registry.endpoints().enumerate() {
        info!(
            stub = %stub.name(),
            id = ?registry.device_id(index),
            mac = %stub.hw_addr(),
            "Stub ready"
        );
    }

    let classifier = registry.classifier();
    let uplink = registry.uplink();
    for dst in args.probes {
        let data = build_ipv4_frame(
            uplink.hw_addr(),
            PROBE_SRC_MAC,
            PROBE_SRC,
            dst,
            &[],
        );
        match classifier.receive(Frame::from_ethernet(uplink.id(), data)) {
            Classification::Owned { name, matched, .. } => {
                info!(dst = %dst, owner = %name, matched = ?matched, "Probe classified");
            }
            Classification::Unclaimed => info!(dst = %dst, "Probe unclaimed"),
            Classification::NoNetworkHeader => warn!(dst = %dst, "Probe frame malformed"),
        }
    }

    registry.shutdown();
    let forwarded = host.take_delivered().len();
    info!(forwarded, "Stopped");

    Ok(())
}
