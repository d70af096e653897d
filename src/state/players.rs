use indexmap::IndexMap;
use serde::Serialize;

/// Which of the two rosters a player belongs to. HOME is always the viewing
/// player's team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    /// The viewing player's team.
    Home,
    /// The opposing team.
    Away,
}

/// Ordered roster of player identities.
#[derive(Debug, Clone, Default)]
pub struct Team {
    /// Members in server-announced order.
    pub members: Vec<String>,
}

impl Team {
    /// Build a roster from an optional server payload, degrading to an empty
    /// roster when the payload omitted the team.
    pub fn from_payload(members: Option<Vec<String>>) -> Self {
        Self {
            members: members.unwrap_or_default(),
        }
    }

    /// Whether `player_id` is on this roster.
    pub fn contains(&self, player_id: &str) -> bool {
        self.members.iter().any(|member| member == player_id)
    }
}

/// Mutable per-player progress, owned exclusively by [`PlayerRegistry`].
#[derive(Debug, Clone)]
pub struct PlayerProgress {
    /// Identity of the player.
    pub player_id: String,
    /// Current board position, `0..total_nodes`.
    pub position: usize,
    /// Completed laps of the board.
    pub round: u32,
    /// Accumulated key total.
    pub keys: u32,
    /// Timestamp of the most recent key award, unix milliseconds.
    pub last_key_at: i64,
}

impl PlayerProgress {
    fn at_start(player_id: String) -> Self {
        Self {
            player_id,
            position: 0,
            round: 0,
            keys: 0,
            last_key_at: 0,
        }
    }
}

/// Per-race map from player identity to progress, preserving roster order.
#[derive(Debug, Clone, Default)]
pub struct PlayerRegistry {
    players: IndexMap<String, PlayerProgress>,
}

impl PlayerRegistry {
    /// Register every member of both rosters at the start node.
    pub fn from_rosters(home: &Team, away: &Team) -> Self {
        let mut players = IndexMap::new();
        for member in home.members.iter().chain(away.members.iter()) {
            players.insert(member.clone(), PlayerProgress::at_start(member.clone()));
        }
        Self { players }
    }

    /// Progress of `player_id`, if registered.
    pub fn get(&self, player_id: &str) -> Option<&PlayerProgress> {
        self.players.get(player_id)
    }

    /// Mutable progress of `player_id`, if registered.
    pub fn get_mut(&mut self, player_id: &str) -> Option<&mut PlayerProgress> {
        self.players.get_mut(player_id)
    }

    /// Iterate over all registered players in roster order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerProgress> {
        self.players.values()
    }

    /// Number of registered players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether no players are registered.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Sum of key totals across `team`'s members.
    pub fn team_keys(&self, team: &Team) -> u32 {
        team.members
            .iter()
            .filter_map(|member| self.players.get(member))
            .map(|progress| progress.keys)
            .sum()
    }
}
