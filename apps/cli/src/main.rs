//! McpRelay CLI
//!
//! - `serve`: the MCP gateway with the self-mutating greet tools
//! - `relay`: the upstream MCP bridge with `/send-message` and `/stream`
//! - `watch`: follow a relay `/stream`, reconnecting on drop
//! - `send`: post one message to a relay and print the reply

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use mcprelay_gateway::{GatewayConfig, GatewayServer};
use mcprelay_relay::{
    BridgeConfig, ReconnectingStreamClient, RelayConfig, RelayServer, SendMessageResponse,
    StreamClientConfig,
};
use tracing::info;

const LOG_PREFIX: &str = "mcprelay";

#[derive(Parser)]
#[command(name = "mcprelay", version, about = "MCP gateway and notification relay")]
#[command(propagate_version = true)]
struct Cli {
    /// Also write logs to daily-rotated files in this directory
    #[arg(long, global = true, env = "MCPRELAY_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP gateway
    Serve(ServeArgs),
    /// Run the relay in front of an upstream gateway
    Relay(RelayArgs),
    /// Print relayed messages as they arrive
    Watch(WatchArgs),
    /// Send one message through a relay
    Send(SendArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "MCPRELAY_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "MCPRELAY_PORT", default_value_t = 3000)]
    port: u16,

    /// Seconds between tool set refreshes
    #[arg(long, env = "MCPRELAY_REFRESH_SECS", default_value_t = 5)]
    refresh_secs: u64,

    #[arg(long, env = "MCPRELAY_DISABLE_CORS")]
    no_cors: bool,
}

#[derive(Args)]
struct RelayArgs {
    #[arg(long, env = "MCPRELAY_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "MCPRELAY_RELAY_PORT", default_value_t = 3001)]
    port: u16,

    #[arg(long, env = "MCPRELAY_UPSTREAM_URL", default_value = "http://localhost:3000/mcp")]
    upstream_url: String,

    /// Upstream tool invoked by `/send-message`
    #[arg(long, env = "MCPRELAY_TOOL_NAME", default_value = "multi-greet")]
    tool: String,

    #[arg(long, env = "MCPRELAY_DISABLE_CORS")]
    no_cors: bool,
}

#[derive(Args)]
struct WatchArgs {
    #[arg(long, env = "MCPRELAY_STREAM_URL", default_value = "http://localhost:3001/stream")]
    url: String,

    /// Seconds to wait before reconnecting
    #[arg(long, env = "MCPRELAY_RECONNECT_SECS", default_value_t = 3)]
    reconnect_secs: u64,
}

#[derive(Args)]
struct SendArgs {
    message: String,

    #[arg(long, env = "MCPRELAY_RELAY_URL", default_value = "http://localhost:3001")]
    relay_url: String,
}

/// Console layer always; file layer with daily rotation when `log_dir` is set
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // RUST_LOG takes precedence
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,mcprelay=debug,mcprelay_core=debug,mcprelay_gateway=debug,mcprelay_relay=debug")
    });

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_PREFIX)
                .filename_suffix("log")
                .build(dir)
                .context("failed to create log file appender")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = GatewayConfig {
        host: args.host,
        port: args.port,
        enable_cors: !args.no_cors,
        tool_refresh_interval: Duration::from_secs(args.refresh_secs.max(1)),
        ..GatewayConfig::default()
    };
    info!("MCP endpoint: {}", config.mcp_url());

    let server = Arc::new(GatewayServer::new(config));
    let running = Arc::clone(&server).spawn();

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");
    server.cleanup().await;
    running.await??;
    Ok(())
}

async fn relay(args: RelayArgs) -> anyhow::Result<()> {
    let config = RelayConfig {
        host: args.host,
        port: args.port,
        enable_cors: !args.no_cors,
        bridge: BridgeConfig {
            upstream_url: args.upstream_url,
            tool_name: args.tool,
        },
        ..RelayConfig::default()
    };

    let server = Arc::new(RelayServer::new(config));
    let running = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");
    server.cleanup().await;
    running.await??;
    Ok(())
}

async fn watch(args: WatchArgs) -> anyhow::Result<()> {
    let client = ReconnectingStreamClient::new(StreamClientConfig {
        url: args.url,
        reconnect_delay: Duration::from_secs(args.reconnect_secs),
    });
    let log = client.log();
    let mut received = client.watch_received();
    client.start();

    let mut printed = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = received.changed() => {
                if changed.is_err() {
                    break;
                }
                for entry in log.since(printed) {
                    println!("{}", entry);
                    printed += 1;
                }
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

async fn send(args: SendArgs) -> anyhow::Result<()> {
    let url = format!("{}/send-message", args.relay_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "message": args.message }))
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("relay returned {}: {}", status, body);
    }

    let reply: SendMessageResponse = response.json().await.context("malformed relay reply")?;
    for line in reply.reply {
        println!("{}", line);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Relay(args) => relay(args).await,
        Commands::Watch(args) => watch(args).await,
        Commands::Send(args) => send(args).await,
    }
}
