//! The roster source is the seam between the auction engine and whatever
//! persistent store holds team rosters, point budgets, and the player pool
//! for a given preset (league, season, draft class; the vocabulary is left
//! to the caller). Persisting or editing that data is explicitly out of
//! scope (§5 non-goals); this module only defines the trait the rest of the
//! crate depends on and a fixture-backed implementation for tests and local
//! runs.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{
    ids::{
        TeamId,
        UserId,
    },
    team::Team,
};

/// One preset's worth of data needed to start an auction: the teams with
/// their starting points, the leader assigned to each, and the ordered pool
/// of users available to be drafted.
#[derive(Clone, Debug)]
pub struct Preset {
    pub teams: Vec<Team>,
    pub leader_ids: HashMap<TeamId, UserId>,
    pub auction_queue: Vec<UserId>,
}

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
}

/// Resolves a preset identifier into the data an [`super::Manager::add`]
/// call needs. Implementations are free to hit a database, a config file,
/// or (as here) an in-memory fixture table.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn load(&self, preset_id: &str) -> Result<Preset, RosterError>;
}

/// An in-memory stand-in for the real roster store, seeded at construction.
/// Useful for local runs and integration tests where wiring up a database is
/// unwarranted.
#[derive(Default)]
pub struct FixtureRosterSource {
    presets: HashMap<String, Preset>,
}

impl FixtureRosterSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_preset(mut self, preset_id: impl Into<String>, preset: Preset) -> Self {
        self.presets.insert(preset_id.into(), preset);
        self
    }
}

#[async_trait]
impl RosterSource for FixtureRosterSource {
    async fn load(&self, preset_id: &str) -> Result<Preset, RosterError> {
        self.presets
            .get(preset_id)
            .cloned()
            .ok_or_else(|| RosterError::UnknownPreset(preset_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseeded_preset_is_an_error() {
        let source = FixtureRosterSource::new();
        assert!(matches!(
            source.load("nope").await,
            Err(RosterError::UnknownPreset(_))
        ));
    }

    #[tokio::test]
    async fn seeded_preset_round_trips() {
        let preset = Preset {
            teams: vec![Team::new(TeamId::new(1), UserId::from(1), 100)],
            leader_ids: HashMap::from([(TeamId::new(1), UserId::from(1))]),
            auction_queue: vec![UserId::from(2), UserId::from(3)],
        };
        let source = FixtureRosterSource::new().with_preset("demo", preset.clone());
        let loaded = source.load("demo").await.unwrap();
        assert_eq!(loaded.auction_queue, preset.auction_queue);
    }
}
