//! Tether agent binary.
//!
//! Spawned by a parent controller that owns its stdin/stdout: resource
//! operations leave as `"/<cmd>:<base64>"` lines and come back as
//! `"/resp:<cmd>:"` replies, while tracing goes to stderr. The process
//! registers with an LWM2M server over UDP on the side.
//!
//! # Usage
//!
//! ```bash
//! # Plain CoAP against a local server
//! tether-agent --server-host localhost --server-port 5683
//!
//! # Bootstrap first, DTLS-PSK credentials for the stack
//! tether-agent -b -i my-identity -s 0123456789abcdef
//! ```

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod connections;
mod driver;

use driver::{Driver, DriverConfig};

const DEFAULT_SERVER_PORT: u16 = 5683;
const DEFAULT_BOOTSTRAP_PORT: u16 = 5685;

/// LWM2M bridge client driven by a parent controller
#[derive(Parser, Debug)]
#[command(name = "tether-agent")]
#[command(about = "LWM2M client bridging object operations to its parent process")]
#[command(version)]
struct Args {
    /// Endpoint name the client registers under
    #[arg(short = 'n', long, default_value = "tether-agent")]
    name: String,

    /// Local UDP port to bind
    #[arg(short = 'l', long, default_value_t = 56830)]
    local_port: u16,

    /// Hostname of the LWM2M server (defaults to loopback)
    #[arg(short = 'H', long)]
    server_host: Option<String>,

    /// Port of the LWM2M server (defaults to 5683, or 5685 with --bootstrap)
    #[arg(short = 'p', long)]
    server_port: Option<u16>,

    /// Registration lifetime in seconds
    #[arg(short = 't', long, default_value_t = 300)]
    lifetime: i64,

    /// Request bootstrap before registering
    #[arg(short = 'b', long)]
    bootstrap: bool,

    /// Use an IPv4 connection (default is IPv6)
    #[arg(short = '4', long)]
    ipv4: bool,

    /// DTLS PSK identity
    #[arg(short = 'i', long)]
    psk_identity: Option<String>,

    /// DTLS pre-shared key as a hex string
    #[arg(short = 's', long)]
    psk_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // stdout belongs to the controller protocol; all diagnostics go to
    // stderr.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let psk_key = match &args.psk_key {
        Some(hex_key) => {
            Some(hex::decode(hex_key).map_err(|e| format!("invalid pre-shared key hex: {e}"))?)
        },
        None => None,
    };

    let config = DriverConfig {
        endpoint_name: args.name,
        local_port: args.local_port,
        server_host: args.server_host,
        server_port: args.server_port.unwrap_or(if args.bootstrap {
            DEFAULT_BOOTSTRAP_PORT
        } else {
            DEFAULT_SERVER_PORT
        }),
        lifetime: args.lifetime,
        bootstrap: args.bootstrap,
        ipv4: args.ipv4,
        psk_identity: args.psk_identity,
        psk_key,
    };

    let mut driver = Driver::new(config).await?;
    driver.run().await;

    Ok(())
}
