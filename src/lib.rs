//! Draft Auction Auctioneer runs live, real-time draft auctions.
//!
//! Each auction is a short-lived in-memory session in which a fixed set of team
//! leaders bid points for unassigned users under a reset-on-bid countdown timer.
//! Clients (leaders and observers) connect to a session over a websocket keyed
//! by a per-participant token; every bid, tick, sale and status change is fanned
//! out to all connected clients of that session.
//!
//! # Starting the service
//!
//! [`Service::spawn`] brings up the [`gateway`] (the websocket front door) and
//! the [`auction::Manager`] (the process-wide auction registry) and returns a
//! handle that resolves once the underlying task exits.
//!
//! # How a single auction works
//!
//! An auction is created via [`auction::Manager::add`] with a roster of teams
//! and users. It starts in `WAITING` until every team leader's token has an open
//! connection, at which point it selects the first user and starts the
//! countdown timer. Leaders bid over the websocket connection; every accepted
//! bid resets the timer. When the timer expires the current user is sold to the
//! highest bidder (or returned to the unsold queue if there was no bid) and the
//! next user is selected. The auction completes once both queues are drained.
//!
//! If any leader disconnects mid-auction the auction pauses (returns to
//! `WAITING`), preserving the current user, bid, and remaining timer value,
//! and resumes once all leaders are reconnected.

use std::{
    future::Future,
    task::Poll,
};

pub mod auction;
mod build_info;
pub mod config;
pub mod gateway;
mod hub;
pub(crate) mod metrics;
pub mod telemetry;
mod timer;
mod token;

pub use build_info::BUILD_INFO;
pub use config::Config;
use eyre::WrapErr as _;
pub use metrics::Metrics;
use tokio::task::{
    JoinError,
    JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// The draft-auction service returned by [`Service::spawn`].
///
/// Owns the gateway's accept loop and the auction manager for the lifetime of
/// the process. Resolves as a [`Future`] once the underlying task exits, which
/// only happens on an unrecoverable error or after [`Service::shutdown`].
pub struct Service {
    shutdown_token: CancellationToken,
    task: Option<JoinHandle<eyre::Result<()>>>,
}

impl Service {
    /// Spawns the draft-auction service: the websocket gateway and the auction
    /// manager it drives.
    ///
    /// # Errors
    /// Returns an error if the gateway's listener cannot be bound.
    pub fn spawn(cfg: Config, metrics: &'static Metrics) -> eyre::Result<Self> {
        let shutdown_token = CancellationToken::new();
        let inner = gateway::Gateway::new(cfg, metrics, shutdown_token.child_token())?;
        let task = tokio::spawn(inner.run());

        Ok(Self {
            shutdown_token,
            task: Some(task),
        })
    }

    /// Shuts the service down, waiting for the gateway and all running auctions
    /// to wind down.
    ///
    /// # Errors
    /// Returns an error if an error occurred while shutting down.
    ///
    /// # Panics
    /// Panics if called twice.
    #[instrument(skip_all, err)]
    pub async fn shutdown(&mut self) -> eyre::Result<()> {
        self.shutdown_token.cancel();
        flatten_join_result(
            self.task
                .take()
                .expect("shutdown must not be called twice")
                .await,
        )
    }
}

impl Future for Service {
    type Output = eyre::Result<()>;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Self::Output> {
        use futures::future::FutureExt as _;

        let task = self
            .task
            .as_mut()
            .expect("service must not be polled after shutdown");
        task.poll_unpin(cx).map(flatten_join_result)
    }
}

fn flatten_join_result<T>(res: Result<eyre::Result<T>, JoinError>) -> eyre::Result<T> {
    match res {
        Ok(Ok(val)) => Ok(val),
        Ok(Err(err)) => Err(err).wrap_err("task returned with error"),
        Err(err) => Err(err).wrap_err("task panicked"),
    }
}
