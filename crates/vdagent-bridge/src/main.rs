//! vdagent-bridge: host-side end of a VM guest agent channel.
//!
//! Listens for guest agent connections, negotiates capabilities, forwards the
//! host pointer and shares clipboards between the guest and the host.
//!
//! # Usage
//!
//! ```text
//! vdagent-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>       TOML configuration file
//!   --listen <ADDR>       Guest channel address (overrides the config file)
//!   --mouse <BOOL>        Offer pointer forwarding
//!   --clipboard <BOOL>    Offer clipboard sharing
//!   --host-feed <BOOL>    Read host commands from stdin
//!   --log-level <LEVEL>   Log level when RUST_LOG is unset
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                   | Description                   |
//! |----------------------------|-------------------------------|
//! | `VDAGENT_BRIDGE_CONFIG`    | Configuration file path       |
//! | `VDAGENT_BRIDGE_LISTEN`    | Guest channel address         |
//! | `VDAGENT_BRIDGE_LOG_LEVEL` | Log level                     |
//!
//! CLI args take precedence over environment variables, which take
//! precedence over the configuration file.
//!
//! # Host feed
//!
//! With the host feed enabled, stdin carries one JSON command per line
//! (pointer moves, button presses, clipboard copies and paste requests) and
//! stdout carries the replies.  Logs go to stderr so the two never mix.  See
//! [`vdagent_bridge::infrastructure::host_feed`] for the command format.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vdagent_bridge::application::clipboard_bridge::ClipboardBroker;
use vdagent_bridge::infrastructure::clipboard::{broker::InMemoryClipboardBroker, host::HostClipboard};
use vdagent_bridge::infrastructure::config::{load_config, BridgeConfig};
use vdagent_bridge::infrastructure::host_feed::run_host_feed;
use vdagent_bridge::infrastructure::{run_server, ServerContext};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Host-side bridge for a VM guest agent.
#[derive(Debug, Parser)]
#[command(
    name = "vdagent-bridge",
    about = "Bridges a VM guest agent to host clipboard and pointer services",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.  Defaults apply when absent.
    #[arg(long, env = "VDAGENT_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Address the guest channel listens on.
    #[arg(long, env = "VDAGENT_BRIDGE_LISTEN")]
    listen: Option<String>,

    /// Offer absolute pointer forwarding to guests.
    #[arg(long)]
    mouse: Option<bool>,

    /// Offer clipboard sharing to guests.
    #[arg(long)]
    clipboard: Option<bool>,

    /// Read host pointer and clipboard commands from stdin.
    #[arg(long)]
    host_feed: Option<bool>,

    /// `tracing` level used when `RUST_LOG` is not set.
    #[arg(long, env = "VDAGENT_BRIDGE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Applies the command-line overrides on top of `config`.
    fn apply(&self, mut config: BridgeConfig) -> BridgeConfig {
        if let Some(listen) = &self.listen {
            config.transport.listen_address = listen.clone();
        }
        if let Some(mouse) = self.mouse {
            config.features.mouse = mouse;
        }
        if let Some(clipboard) = self.clipboard {
            config.features.clipboard = clipboard;
        }
        if let Some(host_feed) = self.host_feed {
            config.host_feed.enabled = host_feed;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the configuration file is loaded.
/// 2. `tracing_subscriber` is initialised from `RUST_LOG`, falling back to
///    the configured level.
/// 3. The shared clipboard broker is created and the host clipboard peer
///    joins it.
/// 4. The pointer channel is created and, when enabled, the host feed starts
///    publishing stdin commands on it.
/// 5. A Ctrl+C handler clears the shared `running` flag.
/// 6. [`run_server`] accepts guests until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let config = cli.apply(config);

    // ── Logging setup ─────────────────────────────────────────────────────────
    let level = config.logging.level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    info!(
        listen = %config.transport.listen_address,
        mouse = config.features.mouse,
        clipboard = config.features.clipboard,
        host_feed = config.host_feed.enabled,
        "vdagent bridge starting"
    );

    // ── Shared services ───────────────────────────────────────────────────────
    let broker: Arc<dyn ClipboardBroker> = Arc::new(InMemoryClipboardBroker::new());
    let host = HostClipboard::new(Arc::clone(&broker));
    host.register().context("host clipboard could not join the broker")?;
    let host_task = tokio::spawn(Arc::clone(&host).run());

    let (pointer, _) = broadcast::channel(256);
    let feed_task = config.host_feed.enabled.then(|| {
        let feed = run_host_feed(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            pointer.clone(),
            Arc::clone(&host),
        );
        tokio::spawn(async move {
            if let Err(e) = feed.await {
                warn!(error = %e, "host feed stopped");
            }
        })
    });
    let ctx = Arc::new(ServerContext::from_config(&config, broker, pointer));

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    // ── Main server loop ──────────────────────────────────────────────────────
    run_server(&config.transport.listen_address, ctx, running).await?;

    if let Some(feed_task) = feed_task {
        feed_task.abort();
    }
    host.unregister();
    host_task.abort();
    info!("vdagent bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
