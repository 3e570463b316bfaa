//! The process-wide Auction Manager: the only shared mutable state in the
//! service. Every operation on its map is O(1), so a single mutex around it
//! is sufficient (§5); the expensive, high-contention work all happens
//! inside individual auctions, which the manager never blocks on.

use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{
    builder::Builder,
    ids::{
        AuctionId,
        TeamId,
        UserId,
    },
    team::Team,
    Handle,
    Limits,
};
use crate::{
    metrics::Metrics,
    token::{
        self,
        Token,
    },
};

struct Inner {
    handles: HashMap<AuctionId, Handle>,
    tokens: token::Registry,
}

/// Owns every live auction in the process. Cheaply cloneable: clones share
/// the same underlying registry.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Mutex<Inner>>,
    next_id: Arc<AtomicU64>,
    metrics: &'static Metrics,
    default_limits: Limits,
    shutdown_token: CancellationToken,
}

impl Manager {
    #[must_use]
    pub fn new(metrics: &'static Metrics, default_limits: Limits, shutdown_token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                handles: HashMap::new(),
                tokens: token::Registry::default(),
            })),
            next_id: Arc::new(AtomicU64::new(1)),
            metrics,
            default_limits,
            shutdown_token,
        }
    }

    /// Mints a fresh auction-id, constructs the auction, spawns its task,
    /// and returns the id alongside the token minted for every participant.
    /// `timer_duration` overrides the manager's default for this auction
    /// only; pass `None` to use the configured default.
    pub fn add(
        &self,
        preset_id: impl Into<String>,
        teams: Vec<Team>,
        user_ids: Vec<UserId>,
        leader_ids: HashMap<TeamId, UserId>,
        auction_queue: Vec<UserId>,
        timer_duration: Option<Duration>,
    ) -> (AuctionId, HashMap<UserId, Token>) {
        let id = AuctionId::from(self.next_id.fetch_add(1, Ordering::Relaxed).to_string());

        let mut limits = self.default_limits;
        if let Some(timer_duration) = timer_duration {
            limits.timer_duration = timer_duration;
        }

        let (handle, token_map, auction) = Builder::new(id.clone(), preset_id, self.metrics, limits)
            .teams(teams)
            .leader_ids(leader_ids)
            .user_ids(user_ids)
            .auction_queue(auction_queue)
            .build(self.shutdown_token.child_token(), {
                let manager = self.clone();
                let id = id.clone();
                move |id_from_auction| {
                    debug_assert_eq!(id, id_from_auction);
                    manager.remove(&id_from_auction);
                }
            });

        {
            let mut inner = self.inner.lock();
            inner.tokens.insert_all(id.clone(), token_map.iter().map(|(&u, t)| (t.clone(), u)));
            inner.handles.insert(id.clone(), handle);
        }
        self.metrics.increment_auctions_created();
        self.metrics.set_live_auctions(self.inner.lock().handles.len());

        info!(auction.id = %id, "auction created");
        tokio::spawn(auction.run());

        (id, token_map)
    }

    #[must_use]
    pub fn get(&self, auction_id: &AuctionId) -> Option<Handle> {
        self.inner.lock().handles.get(auction_id).cloned()
    }

    #[must_use]
    pub fn get_by_token(&self, token: &Token) -> Option<(AuctionId, Handle)> {
        let inner = self.inner.lock();
        let (auction_id, _user_id) = inner.tokens.lookup(token)?;
        let handle = inner.handles.get(&auction_id)?.clone();
        Some((auction_id, handle))
    }

    /// Tears down an auction's registry entries. Idempotent: calling this
    /// twice for the same id (e.g. once from the auction's own
    /// `on_terminated` callback and once from an explicit admin call that
    /// raced it) is a harmless no-op the second time.
    pub fn remove(&self, auction_id: &AuctionId) {
        let mut inner = self.inner.lock();
        let removed = inner.handles.remove(auction_id).is_some();
        inner.tokens.remove_auction(auction_id);
        let live = inner.handles.len();
        drop(inner);

        if removed {
            info!(auction.id = %auction_id, "auction removed");
            self.metrics.set_live_auctions(live);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auction::ConnectOutcome;

    fn limits() -> Limits {
        Limits {
            timer_duration: Duration::from_secs(3),
            waiting_ttl: Duration::from_secs(300),
            terminate_grace: Duration::from_secs(5),
            max_team_size: 5,
            min_bid_increment: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn add_mints_one_token_per_user_with_correct_roles() {
        let metrics = Metrics::new();
        let manager = Manager::new(metrics, limits(), CancellationToken::new());

        let leader = UserId::from(1);
        let observer = UserId::from(2);
        let teams = vec![Team::new(TeamId::new(1), leader, 100)];
        let leader_ids = HashMap::from([(TeamId::new(1), leader)]);

        let (auction_id, tokens) = manager.add(
            "demo",
            teams,
            vec![leader, observer],
            leader_ids,
            vec![],
            None,
        );

        assert_eq!(tokens.len(), 2);
        let (found_id, _handle) = manager.get_by_token(&tokens[&leader]).unwrap();
        assert_eq!(found_id, auction_id);

        match manager.get(&auction_id).unwrap().connect(tokens[&observer].clone()).await {
            ConnectOutcome::Accepted { .. } => {}
            _ => panic!("expected observer connection to be accepted"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_token_is_not_found() {
        let metrics = Metrics::new();
        let manager = Manager::new(metrics, limits(), CancellationToken::new());
        assert!(manager.get_by_token(&Token::generate()).is_none());
    }
}
