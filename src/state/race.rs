use thiserror::Error;
use tracing::warn;

use crate::{
    dto::events::RaceInfoEvent,
    state::{
        board::Board,
        players::{PlayerRegistry, Team, TeamSide},
    },
};

/// High-level phases of the race feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacePhase {
    /// No race exists yet; all progress events are rejected.
    Idle,
    /// A race is live and accepting progress events.
    RaceActive,
    /// The current race finished and awaits acknowledgement or a new race.
    RaceComplete,
}

/// Events that can be applied to the race phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// A `race_info` push seeded or replaced the race.
    RaceInfo,
    /// A `race_complete` push ended the race.
    Completed,
}

/// Error returned when attempting to apply an invalid phase transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the machine was in when the invalid event was received.
    pub from: RacePhase,
    /// The event that cannot be applied from this phase.
    pub event: PhaseEvent,
}

impl RacePhase {
    /// Compute the next phase for `event`, rejecting invalid transitions.
    ///
    /// `RaceInfo` is valid from every phase: it starts the first race, fully
    /// overwrites a live one on resync, and begins the next race after a
    /// completion. `Completed` is only valid while a race is active, which is
    /// what makes duplicate completions detectable.
    pub fn apply(self, event: PhaseEvent) -> Result<RacePhase, InvalidTransition> {
        match (self, event) {
            (_, PhaseEvent::RaceInfo) => Ok(RacePhase::RaceActive),
            (RacePhase::RaceActive, PhaseEvent::Completed) => Ok(RacePhase::RaceComplete),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }
}

/// Immutable-per-race metadata plus the authoritative admission clock.
#[derive(Debug, Clone)]
pub struct Race {
    /// Server-side index of this race within the competition.
    pub race_index: u32,
    /// Identifier of the competition this race belongs to.
    pub competition_id: String,
    /// Key total a team must reach to win.
    pub required_keys: u32,
    /// Race window start, unix milliseconds.
    pub start_time: i64,
    /// Race window end, unix milliseconds (0 when unbounded).
    pub end_time: i64,
    /// One-way completion flag, reset only by a new race.
    pub is_complete: bool,
    /// Monotonic non-decreasing logical clock admitting progress events.
    pub authoritative_timestamp: i64,
}

/// The authoritative in-memory snapshot: board, registry, rosters, metadata.
///
/// Single-writer: only the event reconciler mutates this, always from the same
/// serialized event-delivery point.
#[derive(Debug, Clone)]
pub struct RaceState {
    /// Race metadata and admission clock.
    pub race: Race,
    /// Board nodes and occupancy.
    pub board: Board,
    /// Per-player progress.
    pub registry: PlayerRegistry,
    /// The viewing player's roster.
    pub home: Team,
    /// The opposing roster.
    pub away: Team,
    /// Player currently leading the race, as last reported by the server.
    pub current_lead: Option<String>,
}

impl RaceState {
    /// Build a fresh race from a `race_info` payload, carrying the previous
    /// admission clock forward when the payload has no creation time.
    pub fn from_payload(payload: RaceInfoEvent, previous_timestamp: i64) -> Self {
        let home = Team::from_payload(payload.home_team);
        let away = Team::from_payload(payload.away_team);
        let rewards = payload.node_rewards.unwrap_or_default();
        let mut board = Board::from_rewards(payload.total_nodes, &rewards);
        let registry = PlayerRegistry::from_rosters(&home, &away);
        for progress in registry.iter() {
            board.place_at_start(&progress.player_id);
        }

        Self {
            race: Race {
                race_index: payload.race_index,
                competition_id: payload.competition_id,
                required_keys: payload.required_keys,
                start_time: payload.start_time,
                end_time: payload.end_time,
                is_complete: false,
                authoritative_timestamp: payload.creation_time.unwrap_or(previous_timestamp),
            },
            board,
            registry,
            home,
            away,
            current_lead: None,
        }
    }

    /// Which roster `player_id` belongs to, if any.
    pub fn team_of(&self, player_id: &str) -> Option<TeamSide> {
        if self.home.contains(player_id) {
            Some(TeamSide::Home)
        } else if self.away.contains(player_id) {
            Some(TeamSide::Away)
        } else {
            None
        }
    }

    /// Key total of the given roster.
    pub fn team_keys(&self, side: TeamSide) -> u32 {
        match side {
            TeamSide::Home => self.registry.team_keys(&self.home),
            TeamSide::Away => self.registry.team_keys(&self.away),
        }
    }

    /// Whether the race event window is still open at `now_ms`.
    ///
    /// A completed race keeps its window open until `end_time` so end-of-race
    /// rewards can still be presented.
    pub fn window_open(&self, now_ms: i64) -> bool {
        self.race.end_time == 0 || now_ms <= self.race.end_time
    }

    /// Advance `player_id` by a relative number of nodes.
    ///
    /// A negative delta resets the position to 0 rather than going negative.
    /// Crossing the terminal node wraps the position back to 0 and increments
    /// the player's lap count. Occupancy is updated before the advance is
    /// considered complete. Returns the new position, or `None` for an
    /// unregistered player.
    pub fn advance_player(&mut self, player_id: &str, delta: i64) -> Option<usize> {
        let total = self.board.total_nodes();
        let progress = match self.registry.get_mut(player_id) {
            Some(progress) => progress,
            None => {
                warn!(player_id, "cannot advance unregistered player");
                return None;
            }
        };

        let from = progress.position;
        let (to, wrapped) = if delta < 0 {
            (0, false)
        } else {
            let raw = from as i64 + delta;
            if total > 0 && raw > (total - 1) as i64 {
                ((raw as usize) % total, true)
            } else {
                (raw as usize, false)
            }
        };

        if wrapped {
            progress.round += 1;
        }
        progress.position = to;
        self.board.move_occupant(player_id, from, to);
        Some(to)
    }

    /// Jump `player_id` straight to `node` (authoritative absolute position).
    ///
    /// A target below the current position is a detected wrap and increments
    /// the lap count. Returns the previous position, or `None` for an
    /// unregistered player or an out-of-board target.
    pub fn set_position(&mut self, player_id: &str, node: usize) -> Option<usize> {
        if node >= self.board.total_nodes() {
            warn!(player_id, node, "absolute position outside the board, ignoring");
            return None;
        }
        let progress = match self.registry.get_mut(player_id) {
            Some(progress) => progress,
            None => {
                warn!(player_id, "cannot position unregistered player");
                return None;
            }
        };

        let from = progress.position;
        if node < from {
            progress.round += 1;
        }
        progress.position = node;
        self.board.move_occupant(player_id, from, node);
        Some(from)
    }
}
