//! The session gateway: the websocket front door clients connect to, keyed
//! by the per-participant token minted by [`crate::auction::Manager::add`].
//!
//! Per-connection responsibility ends at the boundary described in §4.5 of
//! the design: look up the token, hand the connection to the auction's
//! [`crate::auction::Handle`], relay inbound `place_bid` frames in, relay
//! whatever the auction's [`crate::hub::Hub`] emits out, and observe
//! disconnect. All auction-state mutation happens inside the auction's own
//! task; nothing here ever locks or mutates an `Auction` directly.

pub(crate) mod messages;

use std::{
    net::SocketAddr,
    sync::Arc,
};

use axum::{
    extract::{
        ws::{
            CloseFrame,
            Message,
            WebSocket,
            WebSocketUpgrade,
        },
        FromRef,
        Path,
        State,
    },
    response::{
        IntoResponse,
        Response,
    },
    routing::get,
    Router,
};
use eyre::WrapErr as _;
use futures::{
    SinkExt as _,
    StreamExt as _,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

use self::messages::{
    Inbound,
    InboundParseError,
    Outbound,
};
use crate::{
    auction::{
        self,
        ConnectOutcome,
        Handle,
    },
    config::Config,
    metrics::Metrics,
    token::Token,
};

/// Close code for a token that the manager does not (or no longer)
/// recognize, and for a connection rejected because the token already has a
/// live session (§6).
const CLOSE_INVALID_TOKEN: u16 = 4001;
/// Close code for a token the manager knows but whose auction has already
/// torn down (a narrow race between token lookup and auction teardown).
const CLOSE_AUCTION_NOT_FOUND: u16 = 4004;

#[derive(Clone)]
struct AppState {
    manager: auction::Manager,
    metrics: &'static Metrics,
}

impl FromRef<AppState> for auction::Manager {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.manager.clone()
    }
}

impl FromRef<AppState> for &'static Metrics {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.metrics
    }
}

pub struct Gateway {
    listen_addr: SocketAddr,
    manager: auction::Manager,
    metrics: &'static Metrics,
    shutdown_token: CancellationToken,
}

impl Gateway {
    /// Builds the gateway and its auction manager. Installs the Prometheus
    /// exporter unless disabled in `cfg`.
    ///
    /// # Errors
    /// Returns an error if the metrics exporter cannot bind its listener.
    pub(crate) fn new(
        cfg: Config,
        metrics: &'static Metrics,
        shutdown_token: CancellationToken,
    ) -> eyre::Result<Self> {
        if !cfg.no_metrics {
            crate::metrics::install_prometheus_exporter(cfg.metrics_listen_addr)
                .wrap_err("failed to install metrics exporter")?;
        }

        let limits = auction::Limits {
            timer_duration: std::time::Duration::from_secs(cfg.timer_duration_seconds),
            waiting_ttl: std::time::Duration::from_secs(cfg.waiting_ttl_seconds),
            terminate_grace: std::time::Duration::from_secs(cfg.terminate_grace_seconds),
            max_team_size: cfg.max_team_size,
            min_bid_increment: cfg.min_bid_increment,
        };
        let manager = auction::Manager::new(metrics, limits, shutdown_token.child_token());

        Ok(Self {
            listen_addr: cfg.gateway_listen_addr,
            manager,
            metrics,
            shutdown_token,
        })
    }

    /// A handle to this gateway's auction manager, for callers (e.g. an
    /// admin surface) that need to create or inspect auctions.
    #[must_use]
    pub fn manager(&self) -> auction::Manager {
        self.manager.clone()
    }

    /// Binds the listener and serves the gateway until `shutdown_token` is
    /// cancelled.
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound or the server exits
    /// with an I/O error.
    pub(crate) async fn run(self) -> eyre::Result<()> {
        let state = AppState {
            manager: self.manager,
            metrics: self.metrics,
        };
        let app = Router::new()
            .route("/auction/:token", get(upgrade))
            .route("/readyz", get(readyz))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .wrap_err("failed to bind gateway listener")?;
        info!(%self.listen_addr, "gateway listening");

        let shutdown_token = self.shutdown_token.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
            .await
            .wrap_err("gateway server exited with an error")
    }
}

#[allow(clippy::unused_async)]
async fn readyz() -> &'static str {
    "ok"
}

async fn upgrade(
    Path(token): Path<String>,
    State(manager): State<auction::Manager>,
    State(metrics): State<&'static Metrics>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, Token::from(token), manager, metrics))
}

#[instrument(skip(socket, manager, metrics))]
async fn handle_connection(
    socket: WebSocket,
    token: Token,
    manager: auction::Manager,
    metrics: &'static Metrics,
) {
    let Some((auction_id, handle)) = manager.get_by_token(&token) else {
        debug!("rejecting connection: unknown token");
        metrics.increment_connections_rejected_unknown_token();
        close(socket, CLOSE_INVALID_TOKEN, "invalid token").await;
        return;
    };

    match handle.connect(token.clone()).await {
        ConnectOutcome::Accepted {
            sink,
        } => {
            info!(%auction_id, "client connected");
            run_connection(socket, token, handle, sink).await;
            info!(%auction_id, "client disconnected");
        }
        ConnectOutcome::DuplicateToken => {
            debug!(%auction_id, "rejecting connection: token already connected");
            close(socket, CLOSE_INVALID_TOKEN, "already connected").await;
        }
        ConnectOutcome::UnknownToken => {
            debug!(%auction_id, "rejecting connection: auction no longer exists");
            close(socket, CLOSE_AUCTION_NOT_FOUND, "auction not found").await;
        }
    }
}

async fn close(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Drives one live connection until either side closes it: forwards
/// whatever the auction's hub emits out, and parses inbound frames into
/// [`Handle`] calls. A malformed frame gets an immediate `error` reply
/// written straight back on this connection, without involving the auction
/// at all; it never got far enough to be a bid. Disconnect (in either
/// direction) always notifies the auction so it can run its
/// pause/duplicate-release logic.
async fn run_connection(
    socket: WebSocket,
    token: Token,
    handle: Handle,
    mut sink: tokio::sync::mpsc::Receiver<Arc<str>>,
) {
    let (mut writer, mut reader) = socket.split();

    loop {
        tokio::select! {
            biased;

            maybe_message = sink.recv() => {
                let Some(message) = maybe_message else { break };
                if writer.send(Message::Text(message.to_string())).await.is_err() {
                    break;
                }
            }

            frame = reader.next() => {
                let Some(frame) = frame else { break };
                let Ok(frame) = frame else { break };
                match frame {
                    Message::Text(raw) => {
                        if let Some(error_reply) = on_frame(&raw, &token, &handle).await {
                            if writer.send(Message::Text(error_reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    }

    handle.disconnect(token).await;
}

/// Returns the serialized `error` frame to write back, if `raw` failed to
/// parse. Valid `place_bid` frames are dispatched to the auction directly
/// and never produce a reply here; acceptance or rejection comes back
/// asynchronously through the hub.
async fn on_frame(raw: &str, token: &Token, handle: &Handle) -> Option<String> {
    match messages::parse(raw) {
        Ok(Inbound::PlaceBid {
            amount,
        }) => {
            handle.place_bid(token.clone(), amount).await;
            None
        }
        Err(InboundParseError::Ignored) => None,
        Err(err) => {
            warn!(%err, "malformed inbound frame");
            serde_json::to_string(&Outbound::Error {
                error: err.to_string(),
            })
            .ok()
        }
    }
}
