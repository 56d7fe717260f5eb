// src/bin/tbench_server.rs
//
// Server side of the sockio backend: answers every emulated request with a
// reply of the size the client asked for. One thread per connection.

use anyhow::{Context, Result};
use clap::Parser;
use dbench::backend::sockio::serve_connection;
use dbench::constants::TCP_PORT;
use std::net::TcpListener;
use std::thread;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "tbench-server", version, about = "Packet responder for the dbench sockio backend")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// TCP port
    #[arg(short = 'p', long, default_value_t = TCP_PORT)]
    port: u16,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tbench_server={},dbench={}", level, level)));
    fmt().with_env_filter(filter).with_target(false).init();

    let listener = TcpListener::bind((cli.bind.as_str(), cli.port))
        .with_context(|| format!("Failed to listen on {}:{}", cli.bind, cli.port))?;
    println!("waiting for connections on {}:{}", cli.bind, cli.port);

    for (n, conn) in listener.incoming().enumerate() {
        let stream = match conn {
            Ok(s) => s,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY on {}: {}", peer, e);
        }
        info!("connection {} from {}", n, peer);

        let spawned = thread::Builder::new()
            .name(format!("tbench-conn-{}", n))
            .spawn(move || match serve_connection(stream) {
                Ok(served) => info!("{} closed after {} requests", peer, served),
                Err(e) => warn!("{}: {}", peer, e),
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn handler thread: {}", e);
        }
    }
    Ok(())
}
