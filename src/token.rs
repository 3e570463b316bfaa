//! Per-participant connection tokens.
//!
//! A token is the sole credential a client presents to join an auction: it
//! encodes no information itself (opaque, random), so knowledge of a token is
//! exactly equivalent to permission to connect as the user it was minted for.

use std::collections::HashMap;

use base64::{
    engine::general_purpose::URL_SAFE_NO_PAD,
    Engine as _,
};
use rand::RngCore as _;

use crate::auction::{
    AuctionId,
    UserId,
};

/// Number of random bytes backing a token; 16 bytes is 128 bits of entropy.
const TOKEN_BYTES: usize = 16;

/// An opaque, URL-safe, cryptographically random per-participant credential.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Token(String);

impl Token {
    /// Mints a new token from a cryptographic random source.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The two roles a participant token can carry. Only leaders may place bids.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Leader,
    Observer,
}

impl Role {
    #[must_use]
    pub fn is_leader(self) -> bool {
        matches!(self, Self::Leader)
    }
}

/// Process-wide index from token to the auction and user it was minted for.
///
/// Owned by the [`crate::auction::Manager`]; an auction's own token map (used
/// for role lookups and the `connected_tokens` set) is private to that
/// auction's task and is not duplicated here.
#[derive(Default)]
pub(crate) struct Registry {
    by_token: HashMap<Token, (AuctionId, UserId)>,
}

impl Registry {
    /// Registers every token minted for `auction_id`, panicking on a
    /// duplicate token; tokens are generated from a cryptographic RNG and a
    /// collision indicates a catastrophic RNG failure, not a recoverable
    /// condition.
    pub(crate) fn insert_all(
        &mut self,
        auction_id: AuctionId,
        tokens: impl IntoIterator<Item = (Token, UserId)>,
    ) {
        for (token, user_id) in tokens {
            let previous = self.by_token.insert(token, (auction_id.clone(), user_id));
            assert!(previous.is_none(), "generated a duplicate token");
        }
    }

    pub(crate) fn lookup(&self, token: &Token) -> Option<(AuctionId, UserId)> {
        self.by_token.get(token).cloned()
    }

    /// Removes every token belonging to `auction_id` in one pass.
    pub(crate) fn remove_auction(&mut self, auction_id: &AuctionId) {
        self.by_token.retain(|_, (owner, _)| owner != auction_id);
    }
}
