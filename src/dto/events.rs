use serde::{Deserialize, Serialize};

/// Inbound server pushes, tagged by event name on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full description of a new (or resynced) race.
    RaceInfo(RaceInfoEvent),
    /// Incremental progress for a single player.
    PlayerProgress(PlayerProgressEvent),
    /// A race reached its required key total.
    RaceComplete(RaceCompleteEvent),
    /// Reward granted for landing on a board node.
    NodeReward(NodeRewardEvent),
    /// Reward granted for converting leftover keys at race end.
    TokenReward(TokenRewardEvent),
    /// A player finished a full lap of the board.
    RoundComplete(RoundCompleteEvent),
}

/// Payload of the `race_info` push that seeds or replaces the whole race.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceInfoEvent {
    /// Server-side index of this race within the competition.
    pub race_index: u32,
    /// Identifier of the competition this race belongs to.
    pub competition_id: String,
    /// Number of board nodes, including the synthetic start node.
    pub total_nodes: usize,
    /// Key total a team must reach to win the race.
    pub required_keys: u32,
    /// Race window start, unix milliseconds.
    pub start_time: i64,
    /// Race window end, unix milliseconds.
    pub end_time: i64,
    /// Roster of the viewing player's team.
    #[serde(default)]
    pub home_team: Option<Vec<String>>,
    /// Roster of the opposing team.
    #[serde(default)]
    pub away_team: Option<Vec<String>>,
    /// Ordered rewards for nodes 1..total_nodes-1 (node 0 is never sent).
    #[serde(default)]
    pub node_rewards: Option<Vec<NodeRewardSpec>>,
    /// Authoritative creation timestamp of this push.
    #[serde(default)]
    pub creation_time: Option<i64>,
}

/// One entry of the `race_info` reward list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRewardSpec {
    /// Currency credited when a player lands on the node.
    pub reward: i64,
    /// Whether landing here interrupts movement with a story beat.
    #[serde(default)]
    pub is_story: bool,
}

/// Payload of the `player_progress` push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProgressEvent {
    /// Identity of the player that progressed.
    pub zid: String,
    /// Authoritative absolute board position after the progress, if any.
    #[serde(default)]
    pub new_node: Option<usize>,
    /// Keys earned by this progress step.
    #[serde(default)]
    pub keys_won: u32,
    /// Race the server attributes this progress to.
    pub race_index: u32,
    /// Authoritative creation timestamp used for admission control.
    pub creation_time: i64,
    /// Identity of the player currently leading the race, when it changed.
    #[serde(default)]
    pub lead: Option<String>,
}

/// Payload of the `race_complete` push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceCompleteEvent {
    /// Index of the race that completed.
    pub race_index: u32,
    /// Identity of the player credited with the winning key.
    pub winner_zid: String,
    /// Whether the viewing player's team won.
    pub has_won: bool,
    /// Key total that ended the race.
    pub required_keys: u32,
    /// Final roster of the viewing player's team.
    #[serde(default)]
    pub home_team: Option<Vec<String>>,
    /// Final roster of the opposing team.
    #[serde(default)]
    pub away_team: Option<Vec<String>>,
    /// Server-issued identifier used to acknowledge the completion.
    pub event_id: String,
}

/// Payload of the `node_reward` push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRewardEvent {
    /// Node the reward was earned on.
    pub node: usize,
    /// Reward lines granted by the node.
    pub rewards: Vec<RewardItem>,
    /// Server-issued identifier keying the reward claim.
    pub event_id: String,
}

/// Payload of the `token_reward` push (leftover-key conversion at race end).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRewardEvent {
    /// Reward lines granted by the conversion.
    pub rewards: Vec<RewardItem>,
    /// Server-issued identifier keying the reward claim.
    pub event_id: String,
}

/// A single reward line within a grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardItem {
    /// Currency amount of this line.
    pub amount: i64,
}

/// Payload of the `round_complete` push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundCompleteEvent {
    /// Identity of the player that completed a lap.
    pub zid: String,
}

impl NodeRewardEvent {
    /// Sum of all reward lines in the grant.
    pub fn total_amount(&self) -> i64 {
        self.rewards.iter().map(|item| item.amount).sum()
    }
}

impl TokenRewardEvent {
    /// Sum of all reward lines in the grant.
    pub fn total_amount(&self) -> i64 {
        self.rewards.iter().map(|item| item.amount).sum()
    }
}
