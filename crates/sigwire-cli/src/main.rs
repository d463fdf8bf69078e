//! SigWire CLI - Command-line client for PeerJS signaling servers
//!
//! Connect to a rendezvous server, watch the signaling traffic, and send
//! raw frames typed on stdin.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use sigwire_client::{Socket, SocketEvent, SocketEventType, SocketOptions};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// SigWire - signaling channel client
#[derive(Parser)]
#[command(name = "sigwire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML socket options)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(flatten)]
    server: ServerArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides applied on top of the configuration file
#[derive(Args, Debug, Default)]
struct ServerArgs {
    /// Signaling server host
    #[arg(short = 'H', long, global = true, env = "SIGWIRE_HOST")]
    host: Option<String>,

    /// Signaling server port
    #[arg(short = 'P', long, global = true)]
    port: Option<u16>,

    /// Path prefix in front of /peerjs
    #[arg(long, global = true)]
    path: Option<String>,

    /// API key
    #[arg(short, long, global = true, env = "SIGWIRE_KEY")]
    key: Option<String>,

    /// Use ws:// instead of wss://
    #[arg(long, global = true)]
    insecure: bool,

    /// Keepalive ping period in milliseconds
    #[arg(long, global = true)]
    ping_interval: Option<u64>,

    /// Socket diagnostic verbosity (0-3)
    #[arg(short, long, global = true)]
    debug: Option<u8>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and relay signaling traffic between the server and the terminal
    Connect {
        /// Peer id to register (random if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Session token (random if omitted)
        #[arg(long)]
        token: Option<String>,
    },

    /// Print the connection URL without connecting
    Url {
        #[arg(long)]
        id: String,

        #[arg(long)]
        token: String,
    },

    /// Show version and system info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    let options = load_options(cli.config.as_deref())?;
    let options = apply_overrides(options, &cli.server);

    match cli.command {
        Commands::Connect { id, token } => {
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let token = token.unwrap_or_else(random_token);
            run_connect(options, &id, &token).await?;
        }

        Commands::Url { id, token } => {
            println!("{}", options.build_url(&id, &token));
        }

        Commands::Info => {
            print_info(&options);
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

fn load_options(path: Option<&Path>) -> Result<SocketOptions> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            parse_options(&text).with_context(|| format!("Invalid config {}", path.display()))
        }
        None => Ok(SocketOptions::default()),
    }
}

fn parse_options(text: &str) -> Result<SocketOptions> {
    Ok(toml::from_str(text)?)
}

fn apply_overrides(mut options: SocketOptions, args: &ServerArgs) -> SocketOptions {
    if let Some(host) = &args.host {
        options.host = host.clone();
    }
    if let Some(port) = args.port {
        options.port = port;
    }
    if let Some(path) = &args.path {
        options.path = path.clone();
    }
    if let Some(key) = &args.key {
        options.key = key.clone();
    }
    if args.insecure {
        options.secure = false;
    }
    if let Some(ms) = args.ping_interval {
        options.ping_interval_ms = ms;
    }
    if let Some(level) = args.debug {
        options.debug = level;
    }
    options
}

fn random_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn print_event(event: &SocketEvent) {
    match (&event.message, &event.error) {
        (Some(msg), _) => {
            let dst = msg.dst.as_deref().unwrap_or("-");
            println!(
                "{} {} {} -> {}",
                "RECV".cyan().bold(),
                msg.msg_type.yellow(),
                msg.src,
                dst
            );
            if !msg.payload.is_empty() {
                match serde_json::to_string(&msg.payload) {
                    Ok(json) => println!("     {}", json.dimmed()),
                    Err(_) => println!("     {:?}", msg.payload),
                }
            }
        }
        (None, Some(err)) => println!("{} {}", "BAD".red().bold(), err),
        (None, None) => {}
    }
}

async fn run_connect(options: SocketOptions, id: &str, token: &str) -> Result<()> {
    println!(
        "{} Connecting to {} as {}",
        "SIGWIRE".cyan().bold(),
        format!("{}:{}", options.host, options.port).yellow(),
        id.green()
    );

    let socket = Socket::with_options(options);
    socket.subscribe(SocketEventType::Message, print_event);
    socket.subscribe(SocketEventType::Disconnected, |event| {
        match &event.error {
            Some(err) => println!("{} {}", "CLOSED".red().bold(), err),
            None => println!("{}", "CLOSED".yellow().bold()),
        }
    });

    socket
        .start(id, token)
        .await
        .context("Failed to connect to signaling server")?;
    println!("{} Connected, type JSON frames to send", "OK".green().bold());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => {
                        if !socket.is_connected().await {
                            warn!("Not connected, dropping frame");
                            break;
                        }
                        if let Err(e) = socket.send(line.trim().to_string()).await {
                            warn!("Send failed: {}", e);
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    socket.close().await.context("Failed to close signaling socket")?;
    Ok(())
}

fn print_info(options: &SocketOptions) {
    println!("{}", "SigWire - signaling channel client".cyan().bold());
    println!();
    println!("Version:    {}", env!("CARGO_PKG_VERSION"));
    println!("Platform:   {}", std::env::consts::OS);
    println!("Arch:       {}", std::env::consts::ARCH);
    println!();
    println!("{}", "Effective options:".green());
    println!(
        "  server:        {}://{}:{}{}",
        options.scheme(),
        options.host,
        options.port,
        options.path
    );
    println!("  key:           {}", options.key);
    println!("  ping interval: {} ms", options.ping_interval_ms);
    println!("  read retries:  {}", options.read_retry.max_retries);
    println!();
    println!("{}", "Examples:".green());
    println!("  sigwire connect --id alice                  # Register as alice");
    println!("  sigwire -H localhost -P 9000 --insecure connect");
    println!("  sigwire url --id alice --token t1           # Show the dial URL");
}
