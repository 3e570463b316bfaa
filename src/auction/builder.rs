//! Assembles a fresh [`Auction`] from a roster and hands back the pieces the
//! [`super::Manager`] needs: a [`Handle`] to route traffic through and the
//! per-user token map to distribute as invitations.

use std::collections::{
    HashMap,
    HashSet,
    VecDeque,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    ids::{
        AuctionId,
        Status,
        TeamId,
        UserId,
    },
    team::Team,
    Auction,
    Handle,
    Limits,
    TokenInfo,
};
use crate::{
    hub::Hub,
    metrics::Metrics,
    timer::Timer,
    token::{
        Role,
        Token,
    },
};

/// Mailbox depth for an auction's command channel. Generous: commands are
/// tiny and the auction drains them in a tight loop.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

pub struct Builder {
    id: AuctionId,
    preset_id: String,
    metrics: &'static Metrics,
    limits: Limits,
    teams: Vec<Team>,
    leader_ids: HashMap<TeamId, UserId>,
    user_ids: Vec<UserId>,
    auction_queue: Vec<UserId>,
}

impl Builder {
    #[must_use]
    pub fn new(
        id: AuctionId,
        preset_id: impl Into<String>,
        metrics: &'static Metrics,
        limits: Limits,
    ) -> Self {
        Self {
            id,
            preset_id: preset_id.into(),
            metrics,
            limits,
            teams: Vec::new(),
            leader_ids: HashMap::new(),
            user_ids: Vec::new(),
            auction_queue: Vec::new(),
        }
    }

    #[must_use]
    pub fn teams(mut self, teams: Vec<Team>) -> Self {
        self.teams = teams;
        self
    }

    #[must_use]
    pub fn leader_ids(mut self, leader_ids: HashMap<TeamId, UserId>) -> Self {
        self.leader_ids = leader_ids;
        self
    }

    /// The full participant roster, leaders and observers alike, each of
    /// whom receives exactly one token (§4.3).
    #[must_use]
    pub fn user_ids(mut self, user_ids: Vec<UserId>) -> Self {
        self.user_ids = user_ids;
        self
    }

    #[must_use]
    pub fn auction_queue(mut self, auction_queue: Vec<UserId>) -> Self {
        self.auction_queue = auction_queue;
        self
    }

    /// Builds the auction along with the token map to distribute and a
    /// handle to reach it. `on_terminated` is invoked exactly once, from
    /// inside the auction's own task, after it has finished tearing down.
    #[must_use]
    pub fn build(
        self,
        shutdown_token: CancellationToken,
        on_terminated: impl FnOnce(AuctionId) + Send + 'static,
    ) -> (Handle, HashMap<UserId, Token>, Auction) {
        let leader_user_ids: HashSet<UserId> = self.leader_ids.values().copied().collect();
        let leader_teams: HashMap<UserId, TeamId> = self
            .leader_ids
            .iter()
            .map(|(&team_id, &user_id)| (user_id, team_id))
            .collect();

        let mut tokens = HashMap::new();
        let mut token_map = HashMap::new();
        for &user_id in &self.user_ids {
            let token = Token::generate();
            let role = if leader_user_ids.contains(&user_id) {
                Role::Leader
            } else {
                Role::Observer
            };
            tokens.insert(token.clone(), TokenInfo { user_id, role });
            token_map.insert(user_id, token);
        }

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (timer_events_tx, timer_events_rx) = mpsc::channel(4);

        let handle = Handle {
            commands_tx: commands_tx.clone(),
        };

        let auction = Auction {
            id: self.id,
            preset_id: self.preset_id,
            metrics: self.metrics,
            limits: self.limits,
            shutdown_token,

            status: Status::Waiting,
            teams: self.teams.into_iter().map(|t| (t.team_id, t)).collect(),
            leader_teams,
            leader_user_ids,
            tokens,
            connected_tokens: HashSet::new(),

            auction_queue: VecDeque::from(self.auction_queue),
            unsold_queue: VecDeque::new(),
            current_user_id: None,
            current_bid: None,
            current_bidder: None,
            current_timer: None,

            hub: Hub::default(),
            timer: Timer::new(timer_events_tx),
            timer_events_rx,

            commands_tx,
            commands_rx,

            waiting_ttl_guard: None,
            terminate_guard: None,

            on_terminated: Box::new(on_terminated),
        };

        (handle, token_map, auction)
    }
}
