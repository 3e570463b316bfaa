//! A drafting team: one leader, up to `max_team_size` members, and a points
//! balance leaders spend bidding for the remaining slots.

use serde::Serialize;

use super::ids::{
    TeamId,
    UserId,
};

#[derive(Clone, Debug, Serialize)]
pub struct Team {
    pub team_id: TeamId,
    pub leader_id: UserId,
    /// Ordered list of member user-ids, including the leader at index 0.
    /// Bounded at `max_team_size` entries.
    pub member_id_list: Vec<UserId>,
    pub points: u32,
}

impl Team {
    /// Creates a new team with its leader already seated in slot 1, per the
    /// pre-seated-leader convention (§9 design notes).
    #[must_use]
    pub fn new(team_id: TeamId, leader_id: UserId, points: u32) -> Self {
        Self {
            team_id,
            leader_id,
            member_id_list: vec![leader_id],
            points,
        }
    }

    #[must_use]
    pub fn is_full(&self, max_team_size: usize) -> bool {
        self.member_id_list.len() >= max_team_size
    }

    #[must_use]
    pub fn remaining_slots(&self, max_team_size: usize) -> usize {
        max_team_size.saturating_sub(self.member_id_list.len())
    }

    /// The highest bid this team may place under the slot-reservation
    /// guardrail (§4.4 check 7): one point must remain reserved for each
    /// slot the team will still need to fill *after* this acquisition.
    #[must_use]
    pub fn max_allowed_bid(&self, max_team_size: usize) -> u32 {
        let remaining_slots_after_this_one = self.remaining_slots(max_team_size).saturating_sub(1);
        let min_reserve = remaining_slots_after_this_one as u32;
        self.points.saturating_sub(min_reserve)
    }

    /// Deducts `amount` points and seats `user_id`, panicking if the team is
    /// already full or doesn't have the points; both are checked
    /// exhaustively by the bid-acceptance contract (§4.4) before this is
    /// ever called, so a violation here indicates an internal fault rather
    /// than a client error.
    pub(super) fn acquire(&mut self, user_id: UserId, amount: u32, max_team_size: usize) {
        assert!(!self.is_full(max_team_size), "team already has max members");
        assert!(amount <= self.points, "team cannot afford this acquisition");
        self.points -= amount;
        self.member_id_list.push(user_id);
    }
}
