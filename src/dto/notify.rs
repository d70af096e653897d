use serde::Serialize;

use crate::state::players::TeamSide;

/// Domain notifications published on the [`NotificationHub`] for UI and
/// economy collaborators.
///
/// [`NotificationHub`]: crate::state::hub::NotificationHub
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A player's board position changed.
    PlayerAdvanced {
        /// Player that moved.
        player_id: String,
        /// Position before the move.
        from: usize,
        /// Position after the move.
        to: usize,
        /// Lap count after the move.
        round: u32,
    },
    /// A local advance is parked behind a story presentation; the UI applies
    /// it by calling `apply_deferred_advance` when ready.
    AdvanceDeferred {
        /// Player whose advance is parked.
        player_id: String,
        /// Node the player will land on once applied.
        node: usize,
    },
    /// A player's key total increased.
    KeysAwarded {
        /// Player that earned the keys.
        player_id: String,
        /// Keys earned by this award.
        amount: u32,
        /// Player total after the award.
        total: u32,
    },
    /// A player completed a full lap of the board.
    RoundCompleted {
        /// Player that completed the lap.
        player_id: String,
        /// Lap count after the increment.
        round: u32,
    },
    /// The current race reached its key threshold.
    RaceCompleted {
        /// Player credited with the winning key.
        winner_id: String,
        /// Whether the viewing player's team won.
        home_won: bool,
    },
    /// Locally tracked race index disagrees with the server; the host should
    /// request a fresh `race_info` (whose contents fully overwrite local state).
    ResyncRequested {
        /// Race index tracked locally.
        local_race_index: u32,
        /// Race index reported by the server.
        server_race_index: u32,
    },
    /// A reward was recorded as pending so client-visible totals stay in sync
    /// while its presentation is queued.
    PendingCredit {
        /// Server-issued reward identifier.
        event_id: String,
        /// Provisionally credited amount.
        amount: i64,
    },
    /// A pending reward is ready to be shown; the UI presents it and then
    /// calls `consume_reward` to finalize the credit.
    RewardPresentation {
        /// Server-issued reward identifier.
        event_id: String,
        /// Amount the presentation should display.
        amount: i64,
        /// Node the reward was earned on, when node-bound.
        node: Option<usize>,
    },
    /// A pending reward was consumed; the economy finalizes the credit exactly
    /// once at this point.
    RewardConsumed {
        /// Server-issued reward identifier.
        event_id: String,
        /// Finalized amount.
        amount: i64,
    },
    /// Request to advance the player to the next race, acknowledging a
    /// completion.
    AdvanceRaceRequested {
        /// Identifier of the acknowledged completion.
        event_id: String,
    },
    /// The feature was fully re-initialized; dependent UI re-renders from
    /// scratch.
    Restarted,
    /// Rate-limited toaster dispatch.
    Toast(ToastRequest),
}

/// Categories the toaster scheduler gates independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastCategory {
    /// Generic "you earned keys" toast, cooldown-gated.
    KeysAwarded,
    /// "N keys needed to win" threshold toast, bypasses the cooldown.
    KeysToWin,
    /// Race lead changed hands, bypasses the cooldown.
    LeadChange,
    /// Race finished.
    RaceComplete,
}

/// One outward toaster dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct ToastRequest {
    /// Gating category of the toast.
    pub category: ToastCategory,
    /// Display payload forwarded to the toaster UI.
    pub body: ToastBody,
}

/// Display payload carried by a [`ToastRequest`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToastBody {
    /// Player the toast is about, when player-bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    /// Team the toast is about, when team-bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamSide>,
    /// Keys earned, for award toasts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<u32>,
    /// Keys still needed to win, for threshold toasts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_keys: Option<u32>,
}
