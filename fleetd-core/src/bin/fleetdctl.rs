//! `fleetdctl`: a thin client for the admin control socket (spec.md §6).
//!
//! Connects to a running controller's Unix domain socket, sends one
//! newline-delimited JSON [`AdminRequest`], and prints the resulting
//! [`AdminResponse`]. Exit code is 0 on success, 2 if the controller
//! reports the request as unauthorized, 1 for any other failure.

use clap::{Parser, Subcommand};
use fleetd_core::admin::{AdminRequest, AdminResponse};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "fleetdctl")]
#[command(about = "Admin client for a running fleetd controller")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the controller's admin control socket.
    #[arg(long, default_value = "/var/run/fleetd/admin.sock")]
    socket: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Reload configuration from disk.
    Reconfigure,
    /// Gracefully shut down the controller.
    Shutdown,
    /// Force this controller to become primary.
    Takeover,
    /// Set a comma-separated list of debug flags.
    SetDebugFlags {
        flags: String,
    },
    /// Set the controller's log level.
    SetDebugLevel {
        level: String,
    },
    /// Set the scheduler's log level.
    SetSchedlogLevel {
        level: String,
    },
    /// Check that the controller is alive.
    Ping,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let request = match cli.command {
        Commands::Reconfigure => AdminRequest::Reconfigure,
        Commands::Shutdown => AdminRequest::Shutdown,
        Commands::Takeover => AdminRequest::Takeover,
        Commands::SetDebugFlags { flags } => AdminRequest::SetDebugFlags(flags),
        Commands::SetDebugLevel { level } => AdminRequest::SetDebugLevel(level),
        Commands::SetSchedlogLevel { level } => AdminRequest::SetSchedlogLevel(level),
        Commands::Ping => AdminRequest::Ping,
    };

    std::process::exit(run(&cli.socket, request).await);
}

async fn run(socket: &PathBuf, request: AdminRequest) -> i32 {
    let mut stream = match UnixStream::connect(socket).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("fleetdctl: could not connect to {}: {e}", socket.display());
            return 1;
        }
    };

    let mut encoded = match serde_json::to_vec(&request) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("fleetdctl: could not encode request: {e}");
            return 1;
        }
    };
    encoded.push(b'\n');

    if let Err(e) = stream.write_all(&encoded).await {
        eprintln!("fleetdctl: write failed: {e}");
        return 1;
    }

    let (reader, _writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    match lines.next_line().await {
        Ok(Some(line)) => match serde_json::from_str::<AdminResponse>(&line) {
            Ok(AdminResponse::Ok(message)) => {
                println!("{message}");
                0
            }
            Ok(AdminResponse::Err(message)) => {
                eprintln!("fleetdctl: {message}");
                if message.to_lowercase().contains("denied") || message.to_lowercase().contains("unauthorized") {
                    2
                } else {
                    1
                }
            }
            Err(e) => {
                eprintln!("fleetdctl: malformed response: {e}");
                1
            }
        },
        Ok(None) => {
            eprintln!("fleetdctl: connection closed without a response");
            1
        }
        Err(e) => {
            eprintln!("fleetdctl: read failed: {e}");
            1
        }
    }
}
