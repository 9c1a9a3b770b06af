//! Guest channel server: accept loop and per-session task management.
//!
//! Each guest connection becomes one session actor.  Around it run a few
//! small tasks that turn the outside world into [`SessionEvent`]s:
//!
//! ```text
//!   socket reader ──┐
//!   sync ticker   ──┤
//!   pointer feed  ──┼──► mpsc queue ──► actor loop ──► Session ──► ChannelTransport
//!   broker fan-out ─┘                                                  │
//!                                              socket writer ◄─────────┘
//! ```
//!
//! Only the actor loop touches the [`Session`], so session state is never
//! mutated from two tasks at once.
//!
//! When the guest reads slower than the bridge writes, the session holds
//! the unsent bytes back.  The actor loop then also waits for the writer's
//! "drained" signal and flushes; if the writer makes no progress for
//! `stall_timeout` the guest is considered gone and the session ends.
//!
//! Each session gets its own [`StaticInputSource`].  The pointer feed only
//! forwards events while that session has pointer forwarding switched on.
//!
//! Shutdown is triggered by a shared `AtomicBool` that is cleared by the
//! Ctrl+C handler in `main.rs`; the accept loop checks it every 200 ms.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::net::{tcp::OwnedReadHalf, TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use vdagent_core::domain::clipboard::PeerId;
use vdagent_core::domain::pointer::{DisplaySize, PointerEvent};

use crate::application::clipboard_bridge::{BrokerEvent, ClipboardBroker, ClipboardPeer};
use crate::application::negotiate_caps::FeatureConfig;
use crate::application::session::{Session, SessionConfig, SessionEvent};
use crate::infrastructure::config::BridgeConfig;
use crate::infrastructure::input_source::StaticInputSource;
use crate::infrastructure::transport::channel_transport;

/// Size of one socket read.
const READ_BUFFER_SIZE: usize = 4096;

/// Shared services every session is wired to.
pub struct ServerContext {
    pub broker: Arc<dyn ClipboardBroker>,
    /// Resolution every session scales pointer positions to.
    pub display: DisplaySize,
    /// Host pointer events, fanned out to every session.
    pub pointer: broadcast::Sender<PointerEvent>,
    pub features: FeatureConfig,
    pub write_budget: usize,
    pub max_pending_bytes: usize,
    /// How long held-back output may go without any progress.
    pub stall_timeout: Duration,
    pub sync_interval: Duration,
}

impl ServerContext {
    /// Builds a context from the loaded configuration.
    pub fn from_config(
        config: &BridgeConfig,
        broker: Arc<dyn ClipboardBroker>,
        pointer: broadcast::Sender<PointerEvent>,
    ) -> Self {
        Self {
            broker,
            display: config.display_size(),
            pointer,
            features: config.feature_config(),
            write_budget: config.transport.write_budget,
            max_pending_bytes: config.transport.max_pending_bytes,
            stall_timeout: Duration::from_millis(config.transport.stall_timeout_ms.max(1)),
            sync_interval: Duration::from_millis(config.mouse.sync_interval_ms.max(1)),
        }
    }
}

/// Broker sink that posts events onto a session's queue.
struct ChannelPeer(mpsc::UnboundedSender<SessionEvent>);

impl ClipboardPeer for ChannelPeer {
    fn deliver(&self, event: BrokerEvent) {
        // A closed queue means the session is already shutting down.
        let _ = self.0.send(SessionEvent::Broker(event));
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `address` and serves guests until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(address: &str, ctx: Arc<ServerContext>, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind guest channel listener on {address}"))?;
    info!(address = %listener.local_addr()?, "guest channel listening");
    serve(listener, ctx, running).await;
    Ok(())
}

/// Accepts guests on an already bound listener until `running` is cleared.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>, running: Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!(%peer_addr, "guest connected");
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    handle_guest(stream, peer_addr, ctx).await;
                });
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {}
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Runs one guest session from connect to disconnect.
async fn handle_guest(stream: TcpStream, peer_addr: SocketAddr, ctx: Arc<ServerContext>) {
    let (read_half, write_half) = stream.into_split();
    let (transport, writer) = channel_transport(ctx.write_budget);
    let drained = transport.drained();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let input = Arc::new(StaticInputSource::new(ctx.display));

    let config = SessionConfig {
        peer_id: PeerId::new(),
        features: ctx.features,
        max_pending_bytes: ctx.max_pending_bytes,
    };
    let sink: Arc<dyn ClipboardPeer> = Arc::new(ChannelPeer(tx.clone()));
    let mut session = Session::new(config, transport, Arc::clone(&ctx.broker), sink, input.clone());
    let peer_id = session.peer_id();
    info!(%peer_addr, %peer_id, "session started");

    let writer_task = tokio::spawn(async move {
        if let Err(e) = writer.run(write_half).await {
            debug!("guest writer stopped: {e}");
        }
    });
    let reader_task = tokio::spawn(read_loop(read_half, tx.clone()));
    let ticker_task = tokio::spawn(tick_loop(ctx.sync_interval, tx.clone()));
    let pointer_task = tokio::spawn(pointer_loop(ctx.pointer.subscribe(), input, tx));

    // Set while output is held back; cleared whenever the writer drains.
    let mut stalled_since: Option<Instant> = None;
    loop {
        let event = if session.pending_output() == 0 {
            stalled_since = None;
            rx.recv().await
        } else {
            let deadline = *stalled_since.get_or_insert_with(Instant::now) + ctx.stall_timeout;
            tokio::select! {
                event = rx.recv() => event,
                () = drained.notified() => {
                    stalled_since = None;
                    if let Err(e) = session.flush_output() {
                        warn!(%peer_addr, "session ended with error: {e}");
                        break;
                    }
                    continue;
                }
                () = sleep_until(deadline) => {
                    warn!(
                        %peer_addr,
                        pending = session.pending_output(),
                        "guest stopped draining the channel; closing session"
                    );
                    break;
                }
            }
        };

        let Some(event) = event else { break };
        let closing = matches!(event, SessionEvent::Closed);
        if let Err(e) = session.handle_event(event) {
            warn!(%peer_addr, "session ended with error: {e}");
            break;
        }
        if closing {
            break;
        }
    }

    session.close();
    reader_task.abort();
    ticker_task.abort();
    pointer_task.abort();
    // Dropping the session drops the transport, which lets the writer finish.
    drop(session);
    let _ = writer_task.await;
    info!(%peer_addr, %peer_id, "session finished");
}

async fn read_loop(mut reader: OwnedReadHalf, tx: mpsc::UnboundedSender<SessionEvent>) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(SessionEvent::Inbound(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("guest read error: {e}");
                break;
            }
        }
    }
    let _ = tx.send(SessionEvent::Closed);
}

async fn tick_loop(period: Duration, tx: mpsc::UnboundedSender<SessionEvent>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if tx.send(SessionEvent::SyncTick).is_err() {
            return;
        }
    }
}

/// Forwards host pointer events to one session while its forwarding is on.
async fn pointer_loop(
    mut events: broadcast::Receiver<PointerEvent>,
    input: Arc<StaticInputSource>,
    tx: mpsc::UnboundedSender<SessionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) if input.is_active() => {
                if tx.send(SessionEvent::Pointer(event)).is_err() {
                    return;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "pointer feed lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
