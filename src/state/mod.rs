//! Authoritative in-memory state: board, players, race, reward ledger, and
//! the notification hub, tied together by [`RaceContext`].

/// Board nodes and occupancy tracking.
pub mod board;
/// Broadcast hub for domain notifications.
pub mod hub;
/// Idempotent pending-reward ledger.
pub mod ledger;
/// Rosters and per-player progress.
pub mod players;
/// Race phase machine, metadata, and the authoritative snapshot.
pub mod race;

use std::collections::VecDeque;

use tokio::sync::broadcast;

use crate::{
    config::EngineConfig,
    dao::history::{HistoryStore, RaceSummaryEntity},
    dto::notify::{Notification, ToastRequest},
    services::toaster::{Clock, SystemClock, ToastScheduler},
    state::{hub::NotificationHub, ledger::RewardLedger, race::RacePhase, race::RaceState},
};

/// Default broadcast capacity of the notification hub.
pub const DEFAULT_HUB_CAPACITY: usize = 64;

/// A local player's board advance parked behind a story presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredAdvance {
    /// Player whose advance is parked.
    pub player_id: String,
    /// Node the player lands on once the UI releases the advance.
    pub target_node: usize,
}

/// Explicit context object owning race state, reward ledger, and toaster
/// scheduler; injected into whatever layer drives event delivery.
///
/// Single-writer: every mutation happens through the reconciler and lifecycle
/// services on delivery of discrete events, so no interior locking is needed.
pub struct RaceContext {
    pub(crate) config: EngineConfig,
    pub(crate) local_player: Option<String>,
    pub(crate) phase: RacePhase,
    pub(crate) state: Option<RaceState>,
    pub(crate) ledger: RewardLedger,
    pub(crate) scheduler: ToastScheduler,
    pub(crate) hub: NotificationHub,
    pub(crate) pending_completions: VecDeque<String>,
    pub(crate) deferred: Option<DeferredAdvance>,
    pub(crate) history: Vec<RaceSummaryEntity>,
    pub(crate) store: Option<Box<dyn HistoryStore>>,
    pub(crate) clock: Box<dyn Clock>,
}

impl RaceContext {
    /// Build a context with the system wall clock and no persistence backend.
    ///
    /// `local_player` identifies the viewing player; their team is HOME and
    /// their story-node advances are presentation-gated.
    pub fn new(config: EngineConfig, local_player: Option<String>) -> Self {
        let scheduler = ToastScheduler::new(config.toaster_cooldown_secs);
        Self {
            config,
            local_player,
            phase: RacePhase::Idle,
            state: None,
            ledger: RewardLedger::default(),
            scheduler,
            hub: NotificationHub::new(DEFAULT_HUB_CAPACITY),
            pending_completions: VecDeque::new(),
            deferred: None,
            history: Vec::new(),
            store: None,
            clock: Box::new(SystemClock),
        }
    }

    /// Install a history persistence backend.
    pub fn with_store(mut self, store: Box<dyn HistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the wall clock (used by hosts with their own tick source and by
    /// tests).
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current phase of the race feature.
    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    /// Authoritative race state, if a race exists.
    pub fn state(&self) -> Option<&RaceState> {
        self.state.as_ref()
    }

    /// Identity of the viewing player, if configured.
    pub fn local_player(&self) -> Option<&str> {
        self.local_player.as_deref()
    }

    /// Engine configuration this context was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The advance currently parked behind a story presentation, if any.
    pub fn deferred_advance(&self) -> Option<&DeferredAdvance> {
        self.deferred.as_ref()
    }

    /// Completion acknowledgements not yet consumed, oldest first.
    pub fn pending_completions(&self) -> impl Iterator<Item = &str> {
        self.pending_completions.iter().map(String::as_str)
    }

    /// In-memory rolling history of completed races.
    pub fn history(&self) -> &[RaceSummaryEntity] {
        &self.history
    }

    /// Register a subscriber for domain notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.hub.subscribe()
    }

    /// Current wall-clock time according to the installed clock.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Offer `request` to the toaster scheduler, publishing it when accepted.
    pub fn dispatch_toast(&mut self, request: ToastRequest) -> bool {
        let now = self.clock.now_ms();
        if self.scheduler.schedule(now, request.category) {
            self.hub.publish(Notification::Toast(request));
            true
        } else {
            false
        }
    }

    /// The UI dismissed the in-flight toast; starts the next cooldown window.
    pub fn on_toast_dismissed(&mut self) {
        let now = self.clock.now_ms();
        self.scheduler.on_dismissed(now);
    }

    pub(crate) fn publish(&self, notification: Notification) {
        self.hub.publish(notification);
    }
}
