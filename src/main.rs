//! EmberKV - A Lightweight In-Memory Key-Value Store Server
//!
//! Main entry point for the EmberKV server binary: parses flags, sets up
//! logging, builds the configured store stack, and serves until Ctrl+C.

use emberkv::server::{Server, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Command-line options
struct Options {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Default TTL in seconds (0 disables expiration)
    ttl_secs: u64,
    /// Snapshot file path, if persistence is wanted
    persist: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host: emberkv::DEFAULT_HOST.to_string(),
            port: emberkv::DEFAULT_PORT,
            ttl_secs: 0,
            persist: None,
        }
    }
}

impl Options {
    /// Parse options from command-line arguments
    fn from_args() -> Self {
        let mut opts = Options::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        opts.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        opts.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--ttl" | "-t" => {
                    if i + 1 < args.len() {
                        opts.ttl_secs = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid TTL");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --ttl requires a value");
                        std::process::exit(1);
                    }
                }
                "--persist" => {
                    if i + 1 < args.len() {
                        opts.persist = Some(PathBuf::from(&args[i + 1]));
                        i += 2;
                    } else {
                        eprintln!("Error: --persist requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("EmberKV version {}", emberkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        opts
    }

    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            default_ttl: if self.ttl_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(self.ttl_secs))
            },
            persistence: self.persist,
        }
    }
}

fn print_help() {
    println!(
        r#"
EmberKV - A Lightweight In-Memory Key-Value Store Server

USAGE:
    emberkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>       Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>       Port to listen on (default: 6379)
    -t, --ttl <SECONDS>     Expire entries this long after SET (default: 0 = never)
        --persist <FILE>    Snapshot state to FILE after every mutation
    -v, --version           Print version information
        --help              Print this help message

EXAMPLES:
    emberkv                              # Volatile store on 127.0.0.1:6379
    emberkv --port 6380 --ttl 3600       # Entries expire after an hour
    emberkv --persist dump.json          # Survives restarts via dump.json

CONNECTING:
    Use redis-cli or any compatible client:
    $ redis-cli -p 6379
    127.0.0.1:6379> SET name "Ariz"
    OK
    127.0.0.1:6379> GET name
    "Ariz"
"#
    );
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
EmberKV v{} - Lightweight In-Memory Key-Value Store
──────────────────────────────────────────────────────
Server starting on {}
Expiration: {}
Persistence: {}

Use Ctrl+C to shutdown gracefully.
"#,
        emberkv::VERSION,
        config.bind_address(),
        match config.default_ttl {
            Some(ttl) if !ttl.is_zero() => format!("{}s after SET", ttl.as_secs()),
            _ => "disabled".to_string(),
        },
        match &config.persistence {
            Some(path) => path.display().to_string(),
            None => "disabled".to_string(),
        },
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Options::from_args().into_config();

    // Set up logging; RUST_LOG overrides the default level
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    print_banner(&config);

    let mut server = Server::new(config)?;
    let addr = server.start().await?;
    info!(addr = %addr, "Ready to accept connections");

    signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");
    server.stop().await;
    info!("Server shutdown complete");

    Ok(())
}
