//! The Auction is the heart of the core: a single-task state machine that
//! sequences users through the queue, runs the reset-on-bid countdown timer,
//! arbitrates bids, and fans out every change through its [`Hub`].
//!
//! An auction advances through the states in `ids::Status`, driven entirely
//! by [`Command`]s received over its mailbox: client handshakes and
//! disconnects from the gateway, bid placements, and its own internally
//! scheduled timer/auto-delete/terminate events. All mutation of an
//! auction's state happens inside [`Auction::run`], so nothing about a
//! single auction is ever touched from two tasks at once (§5).

mod builder;
pub mod ids;
pub(crate) mod manager;
pub mod roster;
pub mod team;

use std::{
    collections::{
        HashMap,
        HashSet,
        VecDeque,
    },
    time::Duration,
};

pub use builder::Builder;
pub use ids::{
    AuctionId,
    TeamId,
    UserId,
};
pub use manager::Manager;
use tokio::sync::{
    mpsc,
    oneshot,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

use self::{
    ids::Status,
    team::Team,
};
use crate::{
    gateway::messages::{
        ClientIdentity,
        Outbound,
    },
    hub::Hub,
    metrics::Metrics,
    timer::{
        self,
        Timer,
    },
    token::{
        Role,
        Token,
    },
};

/// Configuration an [`Auction`] needs from [`crate::Config`], narrowed to
/// just what the state machine consumes.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub timer_duration: Duration,
    pub waiting_ttl: Duration,
    pub terminate_grace: Duration,
    pub max_team_size: usize,
    pub min_bid_increment: u32,
}

/// The outcome of a client handshake attempt, returned to the gateway.
pub(crate) enum ConnectOutcome {
    Accepted {
        sink: mpsc::Receiver<std::sync::Arc<str>>,
    },
    UnknownToken,
    DuplicateToken,
}

enum Command {
    Connect {
        token: Token,
        reply: oneshot::Sender<ConnectOutcome>,
    },
    Disconnect {
        token: Token,
    },
    PlaceBid {
        token: Token,
        amount: i64,
    },
    WaitingTtlExpired,
    TerminateNow,
}

/// A lightweight handle to a running [`Auction`], held by the
/// [`manager::Manager`] and cloned to the gateway for routing client
/// traffic.
#[derive(Clone)]
pub struct Handle {
    commands_tx: mpsc::Sender<Command>,
}

impl Handle {
    pub(crate) async fn connect(&self, token: Token) -> ConnectOutcome {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands_tx
            .send(Command::Connect {
                token,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return ConnectOutcome::UnknownToken;
        }
        reply_rx.await.unwrap_or(ConnectOutcome::UnknownToken)
    }

    pub(crate) async fn disconnect(&self, token: Token) {
        let _ = self.commands_tx.send(Command::Disconnect { token }).await;
    }

    pub(crate) async fn place_bid(&self, token: Token, amount: i64) {
        let _ = self
            .commands_tx
            .send(Command::PlaceBid { token, amount })
            .await;
    }
}

struct TokenInfo {
    user_id: UserId,
    role: Role,
}

pub struct Auction {
    id: AuctionId,
    preset_id: String,
    metrics: &'static Metrics,
    limits: Limits,
    shutdown_token: CancellationToken,

    status: Status,
    teams: HashMap<TeamId, Team>,
    leader_teams: HashMap<UserId, TeamId>,
    leader_user_ids: HashSet<UserId>,
    tokens: HashMap<Token, TokenInfo>,
    connected_tokens: HashSet<Token>,

    auction_queue: VecDeque<UserId>,
    unsold_queue: VecDeque<UserId>,
    current_user_id: Option<UserId>,
    current_bid: Option<u32>,
    current_bidder: Option<TeamId>,
    current_timer: Option<u64>,

    hub: Hub,
    timer: Timer,
    timer_events_rx: mpsc::Receiver<timer::Event>,

    commands_tx: mpsc::Sender<Command>,
    commands_rx: mpsc::Receiver<Command>,

    /// Guards the scheduled auto-delete of a `WAITING` auction; present
    /// whenever one is pending, cancelled and replaced whenever the auction
    /// leaves or re-enters `WAITING`.
    waiting_ttl_guard: Option<CancellationToken>,
    /// Guards the scheduled teardown of a `COMPLETED` auction.
    terminate_guard: Option<CancellationToken>,

    on_terminated: Box<dyn FnOnce(AuctionId) + Send>,
}

impl Auction {
    /// Drives the auction until it is torn down, either because it
    /// completed and its grace period elapsed, or because the process is
    /// shutting down.
    #[instrument(skip_all, fields(auction.id = %self.id, auction.preset_id = %self.preset_id))]
    pub(crate) async fn run(mut self) {
        self.broadcast(&Outbound::Status {
            status: self.status,
        });
        self.schedule_waiting_ttl();

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("auction shutting down");
                    break;
                }

                Some(event) = self.timer_events_rx.recv() => {
                    self.on_timer_event(event);
                }

                Some(command) = self.commands_rx.recv() => {
                    if self.on_command(command) {
                        break;
                    }
                }

                else => break,
            }
        }

        self.teardown();
    }

    fn teardown(mut self) {
        self.timer.cancel();
        if let Some(guard) = self.waiting_ttl_guard.take() {
            guard.cancel();
        }
        if let Some(guard) = self.terminate_guard.take() {
            guard.cancel();
        }
        self.connected_tokens.clear();
        (self.on_terminated)(self.id.clone());
    }

    /// Returns `true` if the auction should stop running entirely (used
    /// only for the terminate-now path; every other command keeps the loop
    /// going).
    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect { token, reply } => {
                let outcome = self.handle_connect(&token);
                let _ = reply.send(outcome);
            }
            Command::Disconnect { token } => self.handle_disconnect(&token),
            Command::PlaceBid { token, amount } => self.handle_place_bid(&token, amount),
            Command::WaitingTtlExpired => self.handle_waiting_ttl_expired(),
            Command::TerminateNow => return true,
        }
        false
    }

    fn on_timer_event(&mut self, event: timer::Event) {
        if self.status != Status::InProgress {
            // a stale tick from a timer we already cancelled; ignore.
            return;
        }
        match event {
            timer::Event::Tick(seconds) => {
                self.current_timer = Some(seconds);
                self.broadcast(&Outbound::Timer { timer: seconds });
            }
            timer::Event::Expired => self.on_timer_expired(),
        }
    }

    // ---- connection lifecycle (§4.5) ----

    fn handle_connect(&mut self, token: &Token) -> ConnectOutcome {
        let Some(info) = self.tokens.get(token) else {
            self.metrics.increment_connections_rejected_unknown_token();
            return ConnectOutcome::UnknownToken;
        };
        if self.connected_tokens.contains(token) {
            self.metrics.increment_connections_rejected_duplicate();
            return ConnectOutcome::DuplicateToken;
        }

        let user_id = info.user_id;
        let role = info.role;
        self.connected_tokens.insert(token.clone());
        let sink = self.hub.add(token.clone());

        self.metrics.increment_connections_accepted();

        let identity = ClientIdentity {
            user_id,
            team_id: self.leader_teams.get(&user_id).copied(),
            is_leader: role.is_leader(),
        };
        self.hub.unicast(token, &self.init_message(identity));

        if self.status == Status::Waiting && self.all_leaders_connected() {
            self.enter_in_progress();
        }

        ConnectOutcome::Accepted { sink }
    }

    fn handle_disconnect(&mut self, token: &Token) {
        self.connected_tokens.remove(token);
        self.hub.remove(token);

        if self.status == Status::InProgress && !self.all_leaders_connected() {
            self.enter_waiting_paused();
        }
    }

    fn all_leaders_connected(&self) -> bool {
        self.tokens.iter().all(|(token, info)| {
            !self.leader_user_ids.contains(&info.user_id) || self.connected_tokens.contains(token)
        })
    }

    fn init_message(&self, identity: ClientIdentity) -> Outbound {
        Outbound::Init {
            status: self.status,
            teams: self.sorted_teams(),
            auction_queue: self.auction_queue.iter().copied().collect(),
            unsold_queue: self.unsold_queue.iter().copied().collect(),
            current_user_id: self.current_user_id,
            current_bid: self.current_bid,
            current_bidder: self.current_bidder,
            timer: self.current_timer,
            identity,
        }
    }

    fn sorted_teams(&self) -> Vec<Team> {
        let mut teams: Vec<Team> = self.teams.values().cloned().collect();
        teams.sort_by_key(|t| t.team_id);
        teams
    }

    // ---- status transitions (§4.4) ----

    fn enter_in_progress(&mut self) {
        self.cancel_waiting_ttl();
        self.status = Status::InProgress;
        self.broadcast(&Outbound::Status {
            status: self.status,
        });

        if let Some(resume_from) = self.current_timer.take() {
            // resuming from a pause: bid context was never discarded.
            self.timer.restart(resume_from);
        } else {
            self.next_user();
        }
    }

    fn enter_waiting_paused(&mut self) {
        self.current_timer = if self.timer.is_running() {
            self.current_timer
        } else {
            None
        };
        self.timer.cancel();
        self.status = Status::Waiting;
        self.schedule_waiting_ttl();
        self.broadcast(&Outbound::Status {
            status: self.status,
        });
    }

    fn enter_completed(&mut self) {
        self.timer.cancel();
        self.current_user_id = None;
        self.current_bid = None;
        self.current_bidder = None;
        self.current_timer = None;
        self.cancel_waiting_ttl();
        self.status = Status::Completed;
        self.metrics.increment_auctions_completed();
        self.broadcast(&Outbound::Status {
            status: self.status,
        });
        self.schedule_terminate();
    }

    fn handle_waiting_ttl_expired(&mut self) {
        if self.status == Status::Waiting {
            info!("waiting_ttl elapsed with no leader quorum; completing auction");
            self.enter_completed();
        }
    }

    // ---- NextUser algorithm (§4.4) ----

    fn next_user(&mut self) {
        self.timer.cancel();

        let incomplete_teams: Vec<TeamId> = self
            .teams
            .values()
            .filter(|t| !t.is_full(self.limits.max_team_size))
            .map(|t| t.team_id)
            .collect();

        if incomplete_teams.len() == 1 {
            self.run_single_team_shortcut(incomplete_teams[0]);
            return;
        }

        if self.auction_queue.is_empty() && !self.unsold_queue.is_empty() {
            self.auction_queue = std::mem::take(&mut self.unsold_queue);
        }

        if self.auction_queue.is_empty() {
            self.enter_completed();
            return;
        }

        let next = self.auction_queue.pop_front().expect("checked non-empty above");
        self.current_user_id = Some(next);
        self.current_bid = None;
        self.current_bidder = None;
        self.current_timer = Some(self.limits.timer_duration.as_secs());

        self.broadcast(&Outbound::NextUser { user_id: next });
        self.broadcast_queue_update();
        self.timer.restart(self.limits.timer_duration.as_secs());
    }

    /// Once only one team still needs members, bidding is degenerate: fill
    /// that team deterministically from both queues and complete.
    fn run_single_team_shortcut(&mut self, team_id: TeamId) {
        let mut incoming: VecDeque<UserId> = self
            .auction_queue
            .drain(..)
            .chain(self.unsold_queue.drain(..))
            .collect();

        {
            let team = self
                .teams
                .get_mut(&team_id)
                .expect("incomplete_teams only contains known team ids");
            while !team.is_full(self.limits.max_team_size) {
                let Some(user_id) = incoming.pop_front() else {
                    break;
                };
                team.member_id_list.push(user_id);
            }
        }
        self.unsold_queue = incoming;
        self.auction_queue.clear();

        self.broadcast(&Outbound::UserSold {
            teams: self.sorted_teams(),
        });
        self.broadcast_queue_update();
        self.enter_completed();
    }

    fn broadcast_queue_update(&mut self) {
        self.broadcast(&Outbound::QueueUpdate {
            auction_queue: self.auction_queue.iter().copied().collect(),
            unsold_queue: self.unsold_queue.iter().copied().collect(),
        });
    }

    // ---- timer expiry (§4.4) ----

    fn on_timer_expired(&mut self) {
        let Some(current_user_id) = self.current_user_id else {
            warn!("timer expired with no current user; ignoring");
            return;
        };

        match (self.current_bid, self.current_bidder) {
            (Some(amount), Some(team_id)) => {
                let team = self
                    .teams
                    .get_mut(&team_id)
                    .expect("current_bidder always names a known team");
                team.acquire(current_user_id, amount, self.limits.max_team_size);
                self.metrics.increment_users_sold();
                self.broadcast(&Outbound::UserSold {
                    teams: self.sorted_teams(),
                });
            }
            _ => {
                self.unsold_queue.push_back(current_user_id);
                self.metrics.increment_users_unsold();
                self.broadcast(&Outbound::UserUnsold {});
            }
        }

        self.next_user();
    }

    // ---- bid acceptance (§4.4) ----

    fn handle_place_bid(&mut self, token: &Token, amount: i64) {
        match self.validate_bid(token, amount) {
            Ok((team_id, leader_id, amount)) => {
                self.current_bid = Some(amount);
                self.current_bidder = Some(team_id);
                self.metrics.increment_bids_accepted();
                self.broadcast(&Outbound::BidPlaced {
                    team_id,
                    leader_id,
                    amount,
                });
                self.current_timer = Some(self.limits.timer_duration.as_secs());
                self.timer.restart(self.limits.timer_duration.as_secs());
            }
            Err(reason) => {
                self.metrics.increment_bids_rejected(reason.metric_label());
                self.hub.unicast(
                    token,
                    &Outbound::Error {
                        error: reason.to_string(),
                    },
                );
            }
        }
    }

    fn validate_bid(
        &self,
        token: &Token,
        amount: i64,
    ) -> Result<(TeamId, UserId, u32), BidRejection> {
        if amount <= 0 {
            return Err(BidRejection::NotPositive);
        }

        // check 1: token is connected
        if !self.connected_tokens.contains(token) {
            return Err(BidRejection::TokenNotConnected);
        }
        let info = self.tokens.get(token).expect("connected token is registered");

        // check 2: only leaders can bid
        if !info.role.is_leader() {
            return Err(BidRejection::NotALeader);
        }

        // check 3: leader must have a bound team
        let Some(&team_id) = self.leader_teams.get(&info.user_id) else {
            return Err(BidRejection::TeamNotFound);
        };
        let team = self.teams.get(&team_id).expect("leader_teams only names known teams");

        // check 4: auction must be in progress
        if self.status != Status::InProgress {
            return Err(BidRejection::AuctionNotInProgress);
        }

        // check 5: a user must currently be up for auction
        if self.current_user_id.is_none() {
            return Err(BidRejection::NoCurrentUser);
        }

        // check 6: team must have an open slot
        if team.is_full(self.limits.max_team_size) {
            return Err(BidRejection::TeamFull);
        }

        let amount = u32::try_from(amount).unwrap_or(u32::MAX);

        // check 7: slot-reservation guardrail
        let max_allowed = team.max_allowed_bid(self.limits.max_team_size);
        if amount > max_allowed {
            return Err(BidRejection::BidTooHigh { max: max_allowed });
        }

        // check 8: defence in depth against overspending
        if amount > team.points {
            return Err(BidRejection::InsufficientPoints);
        }

        // check 9: bid must strictly increase
        let min_bid = self
            .current_bid
            .map_or(1, |current| current + self.limits.min_bid_increment);
        if amount < min_bid {
            return Err(BidRejection::BidTooLow { min: min_bid });
        }

        Ok((team_id, info.user_id, amount))
    }

    // ---- broadcast / scheduling plumbing ----

    fn broadcast(&mut self, message: &Outbound) {
        let evicted = self.hub.broadcast(message);
        for token in evicted {
            self.handle_disconnect(&token);
        }
    }

    fn schedule_waiting_ttl(&mut self) {
        self.cancel_waiting_ttl();
        self.waiting_ttl_guard = Some(self.schedule_self_command(
            self.limits.waiting_ttl,
            Command::WaitingTtlExpired,
        ));
    }

    fn cancel_waiting_ttl(&mut self) {
        if let Some(guard) = self.waiting_ttl_guard.take() {
            guard.cancel();
        }
    }

    fn schedule_terminate(&mut self) {
        if let Some(guard) = self.terminate_guard.take() {
            guard.cancel();
        }
        self.terminate_guard = Some(
            self.schedule_self_command(self.limits.terminate_grace, Command::TerminateNow),
        );
    }

    /// Spawns a cancellable delayed self-send, the same idiom used by
    /// [`Timer`] for its own countdown.
    fn schedule_self_command(&self, delay: Duration, command: Command) -> CancellationToken {
        let token = CancellationToken::new();
        let child = token.clone();
        let commands_tx = self.commands_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = child.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = commands_tx.send(command).await;
                }
            }
        });
        token
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum BidRejection {
    NotPositive,
    TokenNotConnected,
    NotALeader,
    TeamNotFound,
    AuctionNotInProgress,
    NoCurrentUser,
    TeamFull,
    BidTooHigh { max: u32 },
    InsufficientPoints,
    BidTooLow { min: u32 },
}

impl BidRejection {
    fn metric_label(self) -> &'static str {
        match self {
            Self::NotPositive => "not_positive",
            Self::TokenNotConnected => "token_not_connected",
            Self::NotALeader => "not_a_leader",
            Self::TeamNotFound => "team_not_found",
            Self::AuctionNotInProgress => "auction_not_in_progress",
            Self::NoCurrentUser => "no_current_user",
            Self::TeamFull => "team_full",
            Self::BidTooHigh { .. } => "bid_too_high",
            Self::InsufficientPoints => "insufficient_points",
            Self::BidTooLow { .. } => "bid_too_low",
        }
    }
}

impl std::fmt::Display for BidRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPositive => write!(f, "bid amount must be positive"),
            Self::TokenNotConnected => write!(f, "token not connected"),
            Self::NotALeader => write!(f, "only leaders can place bids"),
            Self::TeamNotFound => write!(f, "team not found"),
            Self::AuctionNotInProgress => write!(f, "auction not in progress"),
            Self::NoCurrentUser => write!(f, "no user being auctioned"),
            Self::TeamFull => write!(f, "team already has 5 members"),
            Self::BidTooHigh { max } => write!(f, "bid too high (max {max})"),
            Self::InsufficientPoints => write!(f, "insufficient points"),
            Self::BidTooLow { min } => write!(f, "bid must be at least {min}"),
        }
    }
}

#[cfg(test)]
mod tests;
