//! Process-wide metrics for the auctioneer.
//!
//! Registration happens once at startup via [`Metrics::new`], which installs
//! a Prometheus exporter (unless disabled) and returns a handle that can be
//! leaked to `'static` and shared across every auction task, following the
//! same "construct once, hand around as `&'static`" discipline the core uses
//! for every other piece of long-lived shared state.

use metrics_exporter_prometheus::PrometheusBuilder;

const AUCTIONS_CREATED: &str = "draftauction_auctions_created";
const AUCTIONS_COMPLETED: &str = "draftauction_auctions_completed";
const LIVE_AUCTIONS: &str = "draftauction_live_auctions";
const CONNECTIONS_ACCEPTED: &str = "draftauction_connections_accepted";
const CONNECTIONS_REJECTED_DUPLICATE: &str = "draftauction_connections_rejected_duplicate_token";
const CONNECTIONS_REJECTED_UNKNOWN_TOKEN: &str =
    "draftauction_connections_rejected_unknown_token";
const BIDS_ACCEPTED: &str = "draftauction_bids_accepted";
const BIDS_REJECTED: &str = "draftauction_bids_rejected";
const USERS_SOLD: &str = "draftauction_users_sold";
const USERS_UNSOLD: &str = "draftauction_users_unsold";

/// Handle to every metric the auctioneer emits.
///
/// All methods are cheap, lock-free increments/sets on the globally
/// registered `metrics` recorder; this type carries no state of its own.
pub struct Metrics;

impl Metrics {
    /// Describes every metric with the global recorder. Does not install a
    /// recorder itself; callers that want a scrape endpoint should do so
    /// before calling this, e.g. via [`install_prometheus_exporter`].
    #[must_use]
    pub fn new() -> &'static Self {
        metrics::describe_counter!(AUCTIONS_CREATED, "number of auctions created");
        metrics::describe_counter!(AUCTIONS_COMPLETED, "number of auctions that reached COMPLETED");
        metrics::describe_gauge!(LIVE_AUCTIONS, "number of auctions currently tracked by the manager");
        metrics::describe_counter!(
            CONNECTIONS_ACCEPTED,
            "number of client connections admitted by the gateway"
        );
        metrics::describe_counter!(
            CONNECTIONS_REJECTED_DUPLICATE,
            "number of connections rejected because the token already had a live connection"
        );
        metrics::describe_counter!(
            CONNECTIONS_REJECTED_UNKNOWN_TOKEN,
            "number of connections rejected because the token was not recognized"
        );
        metrics::describe_counter!(BIDS_ACCEPTED, "number of bids accepted by the state machine");
        metrics::describe_counter!(
            BIDS_REJECTED,
            "number of bids rejected by the state machine, by reason"
        );
        metrics::describe_counter!(USERS_SOLD, "number of users sold to a team");
        metrics::describe_counter!(USERS_UNSOLD, "number of users that passed through the unsold queue");

        Box::leak(Box::new(Self))
    }

    pub fn increment_auctions_created(&self) {
        metrics::counter!(AUCTIONS_CREATED).increment(1);
    }

    pub fn increment_auctions_completed(&self) {
        metrics::counter!(AUCTIONS_COMPLETED).increment(1);
    }

    pub fn set_live_auctions(&self, count: usize) {
        metrics::gauge!(LIVE_AUCTIONS).set(count as f64);
    }

    pub fn increment_connections_accepted(&self) {
        metrics::counter!(CONNECTIONS_ACCEPTED).increment(1);
    }

    pub fn increment_connections_rejected_duplicate(&self) {
        metrics::counter!(CONNECTIONS_REJECTED_DUPLICATE).increment(1);
    }

    pub fn increment_connections_rejected_unknown_token(&self) {
        metrics::counter!(CONNECTIONS_REJECTED_UNKNOWN_TOKEN).increment(1);
    }

    pub fn increment_bids_accepted(&self) {
        metrics::counter!(BIDS_ACCEPTED).increment(1);
    }

    pub fn increment_bids_rejected(&self, reason: &'static str) {
        metrics::counter!(BIDS_REJECTED, "reason" => reason).increment(1);
    }

    pub fn increment_users_sold(&self) {
        metrics::counter!(USERS_SOLD).increment(1);
    }

    pub fn increment_users_unsold(&self) {
        metrics::counter!(USERS_UNSOLD).increment(1);
    }
}

/// Installs a Prometheus exporter bound to `listen_addr`, serving the current
/// process's metrics over HTTP.
///
/// # Errors
/// Returns an error if the exporter cannot bind to `listen_addr`.
pub fn install_prometheus_exporter(listen_addr: std::net::SocketAddr) -> eyre::Result<()> {
    use eyre::WrapErr as _;

    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
        .wrap_err("failed installing prometheus metrics exporter")
}
