//! End-to-end tests driving a real [`Auction`] task through its [`Handle`],
//! mirroring the literal scenarios in the design.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    builder::Builder,
    ids::{
        AuctionId,
        TeamId,
        UserId,
    },
    team::Team,
    ConnectOutcome,
    Handle,
    Limits,
};
use crate::{
    metrics::Metrics,
    token::Token,
};

fn limits(timer_duration_secs: u64) -> Limits {
    Limits {
        timer_duration: Duration::from_secs(timer_duration_secs),
        waiting_ttl: Duration::from_secs(300),
        terminate_grace: Duration::from_secs(5),
        max_team_size: 5,
        min_bid_increment: 1,
    }
}

struct Harness {
    handle: Handle,
    sinks: HashMap<UserId, mpsc::Receiver<Arc<str>>>,
    tokens: HashMap<UserId, Token>,
}

impl Harness {
    /// Builds and spawns an auction, then connects every given user id,
    /// returning their outbound sinks keyed by user id for assertions.
    async fn start(
        teams: Vec<Team>,
        leader_ids: HashMap<TeamId, UserId>,
        non_leader_ids: Vec<UserId>,
        limits: Limits,
    ) -> Self {
        let metrics = Metrics::new();
        let mut user_ids: Vec<UserId> = leader_ids.values().copied().collect();
        user_ids.extend(non_leader_ids.iter().copied());

        let (handle, tokens, auction) =
            Builder::new(AuctionId::from("test".to_string()), "demo", metrics, limits)
                .teams(teams)
                .leader_ids(leader_ids)
                .user_ids(user_ids.clone())
                .auction_queue(non_leader_ids)
                .build(CancellationToken::new(), |_| {});

        tokio::spawn(auction.run());

        let mut sinks = HashMap::new();
        for user_id in user_ids {
            let token = tokens[&user_id].clone();
            match handle.connect(token).await {
                ConnectOutcome::Accepted {
                    sink,
                } => {
                    sinks.insert(user_id, sink);
                }
                _ => panic!("expected every fresh connection to be accepted"),
            }
        }

        Self {
            handle,
            sinks,
            tokens,
        }
    }

    async fn next_message(&mut self, user_id: UserId) -> serde_json::Value {
        let raw = self.sinks.get_mut(&user_id).unwrap().recv().await.unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    /// Drains messages for `user_id` until one with the given `type` tag
    /// arrives, returning it. Fails the test if the sink closes first.
    async fn wait_for(&mut self, user_id: UserId, kind: &str) -> serde_json::Value {
        loop {
            let msg = self.next_message(user_id).await;
            if msg["type"] == kind {
                return msg;
            }
        }
    }

    async fn place_bid(&self, user_id: UserId, amount: i64) {
        self.handle
            .place_bid(self.tokens[&user_id].clone(), amount)
            .await;
    }
}

fn two_team_setup(points: u32) -> (Vec<Team>, HashMap<TeamId, UserId>) {
    let l1 = UserId::from(100);
    let l2 = UserId::from(200);
    let teams = vec![
        Team::new(TeamId::new(1), l1, points),
        Team::new(TeamId::new(2), l2, points),
    ];
    let leader_ids = HashMap::from([(TeamId::new(1), l1), (TeamId::new(2), l2)]);
    (teams, leader_ids)
}

#[tokio::test(start_paused = true)]
async fn scenario_a_simple_sale() {
    let (teams, leader_ids) = two_team_setup(100);
    let l1 = leader_ids[&TeamId::new(1)];
    let u1 = UserId::from(1);

    let mut h = Harness::start(teams, leader_ids, vec![u1], limits(3)).await;

    let status = h.wait_for(l1, "status").await;
    assert_eq!(status["data"]["status"], "in_progress");

    let next = h.wait_for(l1, "next_user").await;
    assert_eq!(next["data"]["user_id"].as_u64(), Some(1));

    assert_eq!(h.wait_for(l1, "timer").await["data"]["timer"], 3);
    assert_eq!(h.wait_for(l1, "timer").await["data"]["timer"], 2);

    h.place_bid(l1, 10).await;
    let bid = h.wait_for(l1, "bid_placed").await;
    assert_eq!(bid["data"]["team_id"], 1);
    assert_eq!(bid["data"]["amount"], 10);

    // reset-on-bid: timer restarts from the full duration.
    assert_eq!(h.wait_for(l1, "timer").await["data"]["timer"], 3);

    let sold = loop {
        let msg = h.next_message(l1).await;
        if msg["type"] == "user_sold" {
            break msg;
        }
    };
    let team_one = sold["data"]["teams"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["team_id"] == 1)
        .unwrap();
    assert_eq!(team_one["points"], 90);

    let status = h.wait_for(l1, "status").await;
    assert_eq!(status["data"]["status"], "completed");
}

#[tokio::test(start_paused = true)]
async fn scenario_b_outbid_resets_timer_and_highest_bidder_wins() {
    let (teams, leader_ids) = two_team_setup(100);
    let l1 = leader_ids[&TeamId::new(1)];
    let l2 = leader_ids[&TeamId::new(2)];
    let u1 = UserId::from(1);

    let mut h = Harness::start(teams, leader_ids, vec![u1], limits(3)).await;
    h.wait_for(l1, "status").await;
    h.wait_for(l1, "next_user").await;
    assert_eq!(h.wait_for(l1, "timer").await["data"]["timer"], 3);

    h.place_bid(l1, 10).await;
    let first_bid = h.wait_for(l1, "bid_placed").await;
    assert_eq!(first_bid["data"]["team_id"], 1);
    assert_eq!(first_bid["data"]["amount"], 10);
    assert_eq!(h.wait_for(l1, "timer").await["data"]["timer"], 3);

    // a lower bid from the other leader is rejected outright.
    h.place_bid(l2, 10).await;
    let error = h.wait_for(l2, "error").await;
    assert!(error["data"]["error"].as_str().unwrap().contains("bid must be at least"));

    // a higher bid both resets the timer and takes over as current bidder.
    h.place_bid(l2, 15).await;
    let second_bid = h.wait_for(l1, "bid_placed").await;
    assert_eq!(second_bid["data"]["team_id"], 2);
    assert_eq!(second_bid["data"]["amount"], 15);
    assert_eq!(h.wait_for(l1, "timer").await["data"]["timer"], 3);

    let sold = loop {
        let msg = h.next_message(l1).await;
        if msg["type"] == "user_sold" {
            break msg;
        }
    };
    let teams = sold["data"]["teams"].as_array().unwrap();
    let team_one = teams.iter().find(|t| t["team_id"] == 1).unwrap();
    let team_two = teams.iter().find(|t| t["team_id"] == 2).unwrap();
    assert_eq!(team_one["points"], 100);
    assert_eq!(team_two["points"], 85);
    assert!(team_two["member_id_list"]
        .as_array()
        .unwrap()
        .iter()
        .any(|id| id.as_u64() == Some(1)));
}

#[tokio::test(start_paused = true)]
async fn scenario_c_slot_reservation_guardrail() {
    // team 1 already owns users 1 and 2 (seated directly, not via a live
    // bid, so its points balance is untouched): leader + 2 members, points
    // still 10. remaining_slots = 5 - 3 = 2, min_reserve = 1,
    // max_allowed_bid = 9.
    let l1 = UserId::from(100);
    let l2 = UserId::from(200);
    let mut team_one = Team::new(TeamId::new(1), l1, 10);
    team_one.member_id_list.push(UserId::from(1));
    team_one.member_id_list.push(UserId::from(2));
    let team_two = Team::new(TeamId::new(2), l2, 10);
    let leader_ids = HashMap::from([(TeamId::new(1), l1), (TeamId::new(2), l2)]);
    let u3 = UserId::from(3);

    let mut h = Harness::start(vec![team_one, team_two], leader_ids, vec![u3], limits(3)).await;
    h.wait_for(l1, "status").await;
    h.wait_for(l1, "next_user").await;

    h.place_bid(l1, 10).await;
    let error = h.wait_for(l1, "error").await;
    assert!(error["data"]["error"].as_str().unwrap().contains("bid too high"));

    h.place_bid(l1, 9).await;
    let bid = h.wait_for(l1, "bid_placed").await;
    assert_eq!(bid["data"]["amount"], 9);
}

#[tokio::test(start_paused = true)]
async fn scenario_d_pause_and_resume() {
    let (teams, leader_ids) = two_team_setup(100);
    let l1 = leader_ids[&TeamId::new(1)];
    let l2 = leader_ids[&TeamId::new(2)];
    let u1 = UserId::from(1);

    let mut h = Harness::start(teams, leader_ids, vec![u1], limits(3)).await;
    h.wait_for(l1, "status").await;
    h.wait_for(l1, "next_user").await;
    assert_eq!(h.wait_for(l1, "timer").await["data"]["timer"], 3);
    assert_eq!(h.wait_for(l1, "timer").await["data"]["timer"], 2);

    h.handle.disconnect(h.tokens[&l2].clone()).await;
    let status = h.wait_for(l1, "status").await;
    assert_eq!(status["data"]["status"], "waiting");

    // reconnect l2 and confirm the timer resumes from where it paused.
    match h.handle.connect(h.tokens[&l2].clone()).await {
        ConnectOutcome::Accepted {
            sink,
        } => {
            h.sinks.insert(l2, sink);
        }
        _ => panic!("expected reconnect to be accepted"),
    }
    let status = h.wait_for(l1, "status").await;
    assert_eq!(status["data"]["status"], "in_progress");
    assert_eq!(h.wait_for(l1, "timer").await["data"]["timer"], 2);
}

#[tokio::test(start_paused = true)]
async fn scenario_f_duplicate_token_rejected_original_unaffected() {
    let (teams, leader_ids) = two_team_setup(100);
    let l1 = leader_ids[&TeamId::new(1)];
    let h = Harness::start(teams, leader_ids, vec![UserId::from(1)], limits(3)).await;

    let outcome = h.handle.connect(h.tokens[&l1].clone()).await;
    assert!(matches!(outcome, ConnectOutcome::DuplicateToken));
}

#[tokio::test(start_paused = true)]
async fn single_team_shortcut_fills_deterministically_and_completes() {
    let l1 = UserId::from(100);
    let l2 = UserId::from(200);
    let mut team_one = Team::new(TeamId::new(1), l1, 100);
    for i in 0..4 {
        team_one.member_id_list.push(UserId::from(900 + i));
    }
    let team_two = Team::new(TeamId::new(2), l2, 100);
    let leader_ids = HashMap::from([(TeamId::new(1), l1), (TeamId::new(2), l2)]);
    // team two needs 4 more members to reach 5; queue exactly that many.
    let users: Vec<UserId> = (1..=4).map(UserId::from).collect();

    let mut h = Harness::start(vec![team_one, team_two], leader_ids, users, limits(3)).await;
    h.wait_for(l2, "status").await;

    let sold = h.wait_for(l2, "user_sold").await;
    let team_two_snapshot = sold["data"]["teams"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["team_id"] == 2)
        .unwrap();
    assert_eq!(
        team_two_snapshot["member_id_list"].as_array().unwrap().len(),
        5
    );

    let status = h.wait_for(l2, "status").await;
    assert_eq!(status["data"]["status"], "completed");
}
