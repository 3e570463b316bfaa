//! Typed, environment-sourced configuration.
//!
//! Every config value is read from an environment variable sharing the
//! [`Config::PREFIX`] prefix, following the same fluent
//! `figment::Figment::from(Env::prefixed(...))` shape used across the rest of
//! the service's ambient stack. Unknown variables under the prefix are a hard
//! error, so a typo in a deployment manifest fails fast at startup rather than
//! being silently ignored.

use std::net::SocketAddr;

use figment::{
    providers::Env,
    Figment,
};
use serde::{
    Deserialize,
    Serialize,
};

/// A config type that can be loaded from environment variables sharing a
/// fixed prefix.
pub trait AppConfig<'a>: Sized + Deserialize<'a> {
    /// The prefix all environment variables for this config must share, e.g.
    /// `"DRAFTAUCTION_"`.
    const PREFIX: &'static str;

    /// Reads this config from the process environment.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing, a value fails to
    /// parse, or an environment variable under this config's prefix does not
    /// correspond to a known field.
    fn get() -> Result<Self, figment::Error> {
        Self::from_prefix(Self::PREFIX)
    }

    /// Reads this config from the process environment using an explicit
    /// prefix, overriding [`Self::PREFIX`]. Used by tests so they can run
    /// concurrently without clobbering each other's environment variables.
    fn from_prefix(prefix: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Env::prefixed(prefix))
            .extract()
    }
}

/// The single config for running the auctioneer service.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the websocket gateway binds to.
    pub gateway_listen_addr: SocketAddr,

    /// Default countdown duration, in seconds, for a user's auction.
    pub timer_duration_seconds: u64,

    /// How long a `WAITING` auction may sit without all leaders connected
    /// before it is automatically removed.
    pub waiting_ttl_seconds: u64,

    /// How long a `COMPLETED` auction stays reachable before it is torn down,
    /// giving clients a chance to observe the terminal status.
    pub terminate_grace_seconds: u64,

    /// Maximum number of members (including the leader) a team may hold.
    pub max_team_size: usize,

    /// Minimum amount by which a new bid must exceed the current bid.
    pub min_bid_increment: u32,

    /// Log filter directives, e.g. `"info"` or `"draftauction_auctioneer=debug,warn"`.
    pub log: String,

    /// Forces pretty-printed (human-readable, multi-line) log output.
    pub pretty_print: bool,

    /// Forces writing logs to stdout even when not attached to a terminal
    /// (e.g. in a container).
    pub force_stdout: bool,

    /// Disables the metrics server entirely.
    pub no_metrics: bool,

    /// Address the Prometheus metrics exporter binds to.
    pub metrics_listen_addr: SocketAddr,
}

impl<'a> AppConfig<'a> for Config {
    const PREFIX: &'static str = "DRAFTAUCTION_";
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_listen_addr: "0.0.0.0:8080".parse().unwrap(),
            timer_duration_seconds: 5,
            waiting_ttl_seconds: 300,
            terminate_grace_seconds: 5,
            max_team_size: 5,
            min_bid_increment: 1,
            log: "info".to_string(),
            pretty_print: false,
            force_stdout: false,
            no_metrics: false,
            metrics_listen_addr: "0.0.0.0:9090".parse().unwrap(),
        }
    }
}
