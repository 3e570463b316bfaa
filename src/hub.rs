//! Per-auction fan-out of outbound events to connected clients.
//!
//! The hub holds one bounded outbound queue per connected client (keyed by
//! [`Token`]) and a single `broadcast` call attempts delivery to every queue
//! in turn. A client whose queue is full or whose receiving half has been
//! dropped is evicted immediately and not retried, so one slow or dead
//! connection can never stall delivery to the rest; this is what keeps the
//! auction's single-threaded state machine from ever blocking on client I/O.
//!
//! Messages are serialized to JSON exactly once per broadcast and shared via
//! [`Arc<str>`] rather than cloned per recipient.

use std::{
    collections::HashMap,
    sync::Arc,
};

use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    gateway::messages::Outbound,
    token::Token,
};

/// Bound on each client's outbound queue. A client that can't keep up with
/// one auction's event rate within this many messages is considered dead.
const SINK_CAPACITY: usize = 64;

pub(crate) type Sink = mpsc::Sender<Arc<str>>;

#[derive(Default)]
pub(crate) struct Hub {
    sinks: HashMap<Token, Sink>,
}

impl Hub {
    /// Registers a new client sink, returning the paired receiver the
    /// gateway's write task should drain. Idempotent: replacing an existing
    /// token's sink silently drops the old one (the gateway itself is
    /// responsible for rejecting duplicate connections before this is ever
    /// called twice for one token).
    pub(crate) fn add(&mut self, token: Token) -> mpsc::Receiver<Arc<str>> {
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);
        self.sinks.insert(token, tx);
        rx
    }

    /// Removes a client's sink. A no-op if the token has no registered sink.
    pub(crate) fn remove(&mut self, token: &Token) {
        self.sinks.remove(token);
    }

    pub(crate) fn is_connected(&self, token: &Token) -> bool {
        self.sinks.contains_key(token)
    }

    /// Sends `message` to every connected client, evicting any sink that
    /// can't accept it. Returns the tokens evicted during this broadcast so
    /// the caller (the auction) can run its disconnect path for each.
    pub(crate) fn broadcast(&mut self, message: &Outbound) -> Vec<Token> {
        let encoded: Arc<str> = serde_json::to_string(message)
            .expect("outbound messages are always serializable")
            .into();

        let mut evicted = Vec::new();
        self.sinks.retain(|token, sink| {
            if sink.try_send(Arc::clone(&encoded)).is_ok() {
                true
            } else {
                debug!(%token, "evicting unresponsive client sink from broadcast");
                evicted.push(token.clone());
                false
            }
        });
        evicted
    }

    /// Sends `message` to a single client, evicting it on failure. Used for
    /// the handshake `init` reply and for bid-validation errors, which must
    /// never be broadcast (§7).
    pub(crate) fn unicast(&mut self, token: &Token, message: &Outbound) -> bool {
        let Some(sink) = self.sinks.get(token) else {
            return false;
        };
        let encoded: Arc<str> = serde_json::to_string(message)
            .expect("outbound messages are always serializable")
            .into();
        if sink.try_send(encoded).is_ok() {
            true
        } else {
            self.sinks.remove(token);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::messages::Outbound;

    #[tokio::test]
    async fn broadcast_delivers_to_all_and_evicts_dropped_receiver() {
        let mut hub = Hub::default();
        let tok_a = Token::from("a".to_string());
        let tok_b = Token::from("b".to_string());

        let mut rx_a = hub.add(tok_a.clone());
        let rx_b = hub.add(tok_b.clone());
        drop(rx_b); // simulate a dead peer

        let evicted = hub.broadcast(&Outbound::UserUnsold {});

        assert_eq!(evicted, vec![tok_b.clone()]);
        assert!(!hub.is_connected(&tok_b));
        assert!(hub.is_connected(&tok_a));

        let msg = rx_a.recv().await.unwrap();
        assert!(msg.contains("user_unsold"));
    }

    #[tokio::test]
    async fn full_sink_is_evicted_not_blocked() {
        let mut hub = Hub::default();
        let tok = Token::from("slow".to_string());
        let _rx = hub.add(tok.clone()); // never drained

        for _ in 0..SINK_CAPACITY {
            hub.broadcast(&Outbound::UserUnsold {});
        }
        // one more broadcast should overflow the bounded queue and evict.
        let evicted = hub.broadcast(&Outbound::UserUnsold {});
        assert_eq!(evicted, vec![tok]);
    }
}
