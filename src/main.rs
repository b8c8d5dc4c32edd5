//! linewire - Newline-Delimited Request/Reply Client
//!
//! This is the main entry point for the linewire client.
//! It parses the command line, sets up logging, and runs one session
//! against the configured peer.

use anyhow::Context;
use linewire::client::run_session_until;
use linewire::config::{CliCommand, ClientConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
linewire - Newline-Delimited Request/Reply Client

USAGE:
    linewire [OPTIONS]

OPTIONS:
    -i, --ip <HOST>           Peer host (default: 127.0.0.1)
    -p, --port <PORT>         Peer port (default: {})
    -n, --count <N>           Number of exchanges (default: 20)
        --interval <MS>       Delay between exchanges in ms (default: 1000)
    -m, --message <TEXT>      Message to send, newline appended (default: test)
        --no-reply            Do not wait for a reply after each send
        --timeout <MS>        Read/write timeout in ms, 0 disables (default: 10000)
        --max-line <BYTES>    Longest accepted reply (default: 65536)
    -v, --version             Print version information
    -h, --help                Print this help message

EXAMPLES:
    linewire --ip 10.0.0.7 --port 5678
    linewire -n 5 --interval 200 -m ping
"#,
        linewire::DEFAULT_PORT
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match ClientConfig::from_args(std::env::args().skip(1)) {
        Ok(CliCommand::Run(config)) => config,
        Ok(CliCommand::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliCommand::Version) => {
            println!("linewire version {}", linewire::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Set up logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!(
        peer = %config.address(),
        count = config.iterations,
        interval_ms = config.interval.as_millis() as u64,
        "Starting session"
    );

    // Ctrl+C ends the session early; the connection is still closed cleanly
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    let report = run_session_until(&config, shutdown)
        .await
        .with_context(|| format!("session with {} failed", config.address()))?;

    info!(
        exchanges = report.state.exchanges,
        count = report.state.count,
        bytes_written = report.stats.bytes_written,
        bytes_read = report.stats.bytes_read,
        interrupted = report.interrupted,
        "Session complete"
    );
    Ok(())
}
