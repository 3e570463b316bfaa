//! Small newtypes used throughout the auction core so that auction, team,
//! and user identifiers can never be accidentally swapped for one another.

use serde::{
    Deserialize,
    Serialize,
};

/// Identifies an auction within the process. Minted by
/// [`crate::auction::Manager::add`] as a monotonically increasing integer
/// rendered as a string.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AuctionId(String);

impl From<String> for AuctionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for AuctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies a user (leader or non-leader) within a single auction's
/// roster. Opaque beyond equality and ordering; the roster source is free to
/// use whatever identifier scheme its backing store uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UserId(u64);

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies a team within a single auction. Dense from 1, per the data
/// model (§3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TeamId(u32);

impl TeamId {
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The auction's lifecycle status (§4.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Waiting,
    InProgress,
    Completed,
}
