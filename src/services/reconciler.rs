//! Event reconciliation: admission control, state mutation, and the
//! reward-claim protocol.
//!
//! Server pushes arrive asynchronously and possibly out of order or
//! duplicated; ordering is reconstructed logically against the race's
//! authoritative timestamp, never via transport sequencing. Nothing here
//! returns an error across the public boundary: malformed or stale input is
//! logged and dropped, and every operation degrades to a safe default.

use tracing::{debug, error, info, warn};

use crate::{
    dto::{
        events::{
            NodeRewardEvent, PlayerProgressEvent, RaceCompleteEvent, RaceInfoEvent,
            RoundCompleteEvent, ServerEvent, TokenRewardEvent,
        },
        notify::{Notification, ToastBody, ToastCategory, ToastRequest},
    },
    services::lifecycle,
    state::{
        DeferredAdvance, RaceContext,
        players::TeamSide,
        race::{PhaseEvent, RacePhase, RaceState},
    },
};

/// Dispatch one inbound server event to its handler.
pub fn apply_event(ctx: &mut RaceContext, event: ServerEvent) {
    match event {
        ServerEvent::RaceInfo(payload) => on_new_race(ctx, payload),
        ServerEvent::PlayerProgress(payload) => on_player_progress(ctx, payload),
        ServerEvent::RaceComplete(payload) => on_race_complete(ctx, payload),
        ServerEvent::NodeReward(payload) => on_node_reward(ctx, payload),
        ServerEvent::TokenReward(payload) => on_token_reward(ctx, payload),
        ServerEvent::RoundComplete(payload) => on_round_complete(ctx, payload),
    }
}

/// Fully replace the race from a `race_info` payload.
///
/// Board, registry, rosters, and metadata are rebuilt; the toaster trigger
/// cursor resets; thresholds are re-derived from configuration, filtered to
/// what is achievable under the new key requirement. Pending completion
/// acknowledgements survive so outstanding races can still be acknowledged in
/// order.
pub fn on_new_race(ctx: &mut RaceContext, payload: RaceInfoEvent) {
    let Some(rewards) = payload.node_rewards.as_ref() else {
        warn!(
            race_index = payload.race_index,
            "race_info carried no node rewards, ignoring"
        );
        return;
    };
    if rewards.is_empty() {
        warn!(
            race_index = payload.race_index,
            "race_info carried an empty node list, ignoring"
        );
        return;
    }

    let previous_timestamp = ctx
        .state
        .as_ref()
        .map(|state| state.race.authoritative_timestamp)
        .unwrap_or(0);
    if let Some(creation_time) = payload.creation_time {
        if creation_time < previous_timestamp {
            warn!(
                creation_time,
                clock = previous_timestamp,
                "stale race_info rejected"
            );
            return;
        }
    }

    if payload.home_team.is_none() || payload.away_team.is_none() {
        warn!(
            race_index = payload.race_index,
            "race_info missing team data, degrading to empty roster"
        );
    }

    let competition_changed = ctx
        .state
        .as_ref()
        .map(|state| state.race.competition_id != payload.competition_id)
        .unwrap_or(true);
    if competition_changed {
        lifecycle::rehydrate_history(ctx, &payload.competition_id);
    }

    // The old race's unconsumed rewards can no longer be presented; finalize
    // their credits silently so no balance is lost.
    for (event_id, amount) in ctx.ledger.drain_pending() {
        debug!(%event_id, amount, "finalizing orphaned pending reward");
        ctx.publish(Notification::RewardConsumed { event_id, amount });
    }

    let race_index = payload.race_index;
    let required_keys = payload.required_keys;
    let state = RaceState::from_payload(payload, previous_timestamp);

    ctx.scheduler
        .configure_thresholds(&ctx.config.key_thresholds, required_keys);
    ctx.deferred = None;
    ctx.state = Some(state);
    ctx.phase = match ctx.phase.apply(PhaseEvent::RaceInfo) {
        Ok(next) => next,
        Err(invalid) => {
            warn!(error = %invalid, "race_info in unexpected phase, forcing active");
            RacePhase::RaceActive
        }
    };

    info!(race_index, required_keys, "race initialized");
}

/// Apply a `player_progress` push, subject to admission control.
pub fn on_player_progress(ctx: &mut RaceContext, event: PlayerProgressEvent) {
    let Some((clock, local_race_index)) = ctx
        .state
        .as_ref()
        .map(|state| (state.race.authoritative_timestamp, state.race.race_index))
    else {
        error!(zid = %event.zid, "player_progress before any race exists");
        return;
    };

    if event.creation_time < clock {
        warn!(
            zid = %event.zid,
            creation_time = event.creation_time,
            clock,
            "stale player_progress rejected"
        );
        return;
    }

    if event.race_index != local_race_index {
        // The delta still applies so local totals stay right, but the local
        // race index is stale; the resync response fully overwrites state, so
        // the delta cannot be double counted.
        warn!(
            local_race_index,
            server_race_index = event.race_index,
            "race index mismatch, requesting resync"
        );
        ctx.publish(Notification::ResyncRequested {
            local_race_index,
            server_race_index: event.race_index,
        });
    }

    if event.keys_won > 0 {
        award_keys(ctx, &event.zid, event.keys_won);
        raise_key_toasts(ctx, &event);
    }

    if let Some(node) = event.new_node {
        apply_position(ctx, &event.zid, node);
    }
}

/// Credit `amount` keys to a player and stamp the award time.
///
/// Returns the player's new total, or 0 (with an error log) when the player is
/// unknown or no race exists.
pub fn award_keys(ctx: &mut RaceContext, player_id: &str, amount: u32) -> u32 {
    let now = ctx.clock.now_ms();
    let Some(state) = ctx.state.as_mut() else {
        error!(player_id, "cannot award keys before a race exists");
        return 0;
    };
    let Some(progress) = state.registry.get_mut(player_id) else {
        error!(player_id, "cannot award keys to unregistered player");
        return 0;
    };

    progress.keys += amount;
    progress.last_key_at = now;
    let total = progress.keys;

    ctx.publish(Notification::KeysAwarded {
        player_id: player_id.to_string(),
        amount,
        total,
    });
    total
}

/// Raise the toasts a key award can produce, highest priority first.
///
/// The threshold toast is offered before the generic award toast so a single
/// slot never starves a "keys needed to win" crossing.
fn raise_key_toasts(ctx: &mut RaceContext, event: &PlayerProgressEvent) {
    let Some(state) = ctx.state.as_ref() else {
        return;
    };

    if state.team_of(&event.zid) == Some(TeamSide::Home) {
        let team_keys = state.team_keys(TeamSide::Home);
        let required = state.race.required_keys;
        if let Some(remaining) = ctx.scheduler.crossed_threshold(team_keys, required) {
            ctx.dispatch_toast(ToastRequest {
                category: ToastCategory::KeysToWin,
                body: ToastBody {
                    team: Some(TeamSide::Home),
                    remaining_keys: Some(remaining),
                    ..ToastBody::default()
                },
            });
        }
    }

    if let Some(lead) = event.lead.as_deref() {
        let changed = ctx
            .state
            .as_ref()
            .map(|state| state.current_lead.as_deref() != Some(lead))
            .unwrap_or(false);
        if changed {
            if let Some(state) = ctx.state.as_mut() {
                state.current_lead = Some(lead.to_string());
            }
            ctx.dispatch_toast(ToastRequest {
                category: ToastCategory::LeadChange,
                body: ToastBody {
                    player_id: Some(lead.to_string()),
                    ..ToastBody::default()
                },
            });
        }
    }

    ctx.dispatch_toast(ToastRequest {
        category: ToastCategory::KeysAwarded,
        body: ToastBody {
            player_id: Some(event.zid.clone()),
            keys: Some(event.keys_won),
            ..ToastBody::default()
        },
    });
}

/// Apply an authoritative absolute position, deferring the viewing player's
/// story-node landings behind the reward presentation.
fn apply_position(ctx: &mut RaceContext, player_id: &str, node: usize) {
    let is_local = ctx.local_player.as_deref() == Some(player_id);
    let is_story = ctx
        .state
        .as_ref()
        .map(|state| state.board.is_story_node(node))
        .unwrap_or(false);

    if is_local && is_story {
        debug!(player_id, node, "deferring story-node advance until presentation");
        ctx.deferred = Some(DeferredAdvance {
            player_id: player_id.to_string(),
            target_node: node,
        });
        ctx.publish(Notification::AdvanceDeferred {
            player_id: player_id.to_string(),
            node,
        });
        return;
    }

    let Some(state) = ctx.state.as_mut() else {
        return;
    };
    if let Some(from) = state.set_position(player_id, node) {
        let round = state
            .registry
            .get(player_id)
            .map(|progress| progress.round)
            .unwrap_or(0);
        ctx.publish(Notification::PlayerAdvanced {
            player_id: player_id.to_string(),
            from,
            to: node,
            round,
        });
    }
}

/// Release a deferred story-node advance; the UI collaborator calls this when
/// the reward presentation has finished.
///
/// The parked target replays as a relative advance so wrap detection and lap
/// counting run through the same path as ordinary movement. Returns the new
/// position, or `None` when nothing was deferred.
pub fn apply_deferred_advance(ctx: &mut RaceContext) -> Option<usize> {
    let deferred = ctx.deferred.take()?;
    let state = ctx.state.as_mut()?;

    let from = state.registry.get(&deferred.player_id)?.position;
    let total = state.board.total_nodes();
    let delta = if deferred.target_node >= from {
        (deferred.target_node - from) as i64
    } else {
        (total - from + deferred.target_node) as i64
    };

    let to = state.advance_player(&deferred.player_id, delta)?;
    let round = state
        .registry
        .get(&deferred.player_id)
        .map(|progress| progress.round)
        .unwrap_or(0);
    ctx.publish(Notification::PlayerAdvanced {
        player_id: deferred.player_id,
        from,
        to,
        round,
    });
    Some(to)
}

/// Mark the race complete and queue its acknowledgement.
///
/// Duplicate completions for an already-complete race index are dropped. The
/// acknowledgement identifier joins a FIFO so multiple unacknowledged races
/// are consumed in arrival order.
pub fn on_race_complete(ctx: &mut RaceContext, event: RaceCompleteEvent) {
    let Some((local_race_index, already_complete)) = ctx
        .state
        .as_ref()
        .map(|state| (state.race.race_index, state.race.is_complete))
    else {
        error!(event_id = %event.event_id, "race_complete before any race exists");
        return;
    };

    if event.race_index == local_race_index && already_complete {
        warn!(
            race_index = event.race_index,
            event_id = %event.event_id,
            "duplicate race completion dropped"
        );
        return;
    }
    if event.race_index != local_race_index {
        warn!(
            local_race_index,
            server_race_index = event.race_index,
            "race completion for a different race index, proceeding"
        );
    }

    match ctx.phase.apply(PhaseEvent::Completed) {
        Ok(next) => ctx.phase = next,
        Err(invalid) => warn!(error = %invalid, "completion in unexpected phase, proceeding"),
    }
    if let Some(state) = ctx.state.as_mut() {
        state.race.is_complete = true;
    }

    ctx.pending_completions.push_back(event.event_id.clone());
    ctx.publish(Notification::RaceCompleted {
        winner_id: event.winner_zid.clone(),
        home_won: event.has_won,
    });
    ctx.dispatch_toast(ToastRequest {
        category: ToastCategory::RaceComplete,
        body: ToastBody {
            player_id: Some(event.winner_zid),
            ..ToastBody::default()
        },
    });

    lifecycle::record_completion(ctx);
}

/// Acknowledge the oldest pending race completion and request the advance to
/// the next race.
///
/// A mismatch between the dequeued identifier and the caller's expectation is
/// logged but never blocks progress. Returns the acknowledged identifier.
pub fn consume_race_complete(ctx: &mut RaceContext, expected_event_id: &str) -> Option<String> {
    let Some(event_id) = ctx.pending_completions.pop_front() else {
        warn!(expected_event_id, "no pending race completion to consume");
        return None;
    };

    if event_id != expected_event_id {
        warn!(
            expected_event_id,
            dequeued = %event_id,
            "race completion acknowledgement mismatch, proceeding"
        );
    }

    ctx.publish(Notification::AdvanceRaceRequested {
        event_id: event_id.clone(),
    });
    Some(event_id)
}

/// Record a node reward grant and either queue its presentation or finalize it
/// silently when the race can no longer display it.
pub fn on_node_reward(ctx: &mut RaceContext, event: NodeRewardEvent) {
    let amount = event.total_amount();
    record_reward(ctx, &event.event_id, amount, Some(event.node));
}

/// Record a leftover-key conversion reward, same claim flow as node rewards.
pub fn on_token_reward(ctx: &mut RaceContext, event: TokenRewardEvent) {
    let amount = event.total_amount();
    record_reward(ctx, &event.event_id, amount, None);
}

fn record_reward(ctx: &mut RaceContext, event_id: &str, amount: i64, node: Option<usize>) {
    ctx.ledger.record_pending(event_id, amount);
    ctx.publish(Notification::PendingCredit {
        event_id: event_id.to_string(),
        amount,
    });

    if reward_presentable(ctx) {
        ctx.publish(Notification::RewardPresentation {
            event_id: event_id.to_string(),
            amount,
            node,
        });
    } else {
        debug!(event_id, amount, "race not presentable, finalizing reward silently");
        consume_reward(ctx, event_id);
    }
}

/// Remove and finalize the pending credit for `event_id`.
///
/// Idempotent: the first call returns the amount and notifies the economy, any
/// later call returns 0 and has no effect.
pub fn consume_reward(ctx: &mut RaceContext, event_id: &str) -> i64 {
    let amount = ctx.ledger.consume(event_id);
    if amount != 0 {
        ctx.publish(Notification::RewardConsumed {
            event_id: event_id.to_string(),
            amount,
        });
    }
    amount
}

/// Whether a reward presentation can still be meaningfully shown.
fn reward_presentable(ctx: &RaceContext) -> bool {
    let Some(state) = ctx.state.as_ref() else {
        return false;
    };
    let Some(local) = ctx.local_player.as_deref() else {
        return false;
    };
    state.team_of(local).is_some() && state.window_open(ctx.clock.now_ms())
}

/// Apply a `round_complete` push: bump the player's lap counter.
pub fn on_round_complete(ctx: &mut RaceContext, event: RoundCompleteEvent) {
    let Some(state) = ctx.state.as_mut() else {
        error!(zid = %event.zid, "round_complete before any race exists");
        return;
    };
    let Some(progress) = state.registry.get_mut(&event.zid) else {
        error!(zid = %event.zid, "round_complete for unregistered player");
        return;
    };

    progress.round += 1;
    let round = progress.round;
    ctx.publish(Notification::RoundCompleted {
        player_id: event.zid,
        round,
    });
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    };

    use tokio::sync::broadcast::{Receiver, error::TryRecvError};

    use super::*;
    use crate::{
        config::EngineConfig,
        dto::events::{NodeRewardSpec, RewardItem},
        services::toaster::Clock,
    };

    #[derive(Clone)]
    struct ManualClock(Arc<AtomicI64>);

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn context() -> (RaceContext, Receiver<Notification>, Arc<AtomicI64>) {
        let config = EngineConfig {
            key_thresholds: vec![20, 10, 5],
            toaster_cooldown_secs: 30,
            ..EngineConfig::default()
        };
        let time = Arc::new(AtomicI64::new(0));
        let ctx = RaceContext::new(config, Some("z1".into()))
            .with_clock(Box::new(ManualClock(time.clone())));
        let rx = ctx.subscribe();
        (ctx, rx, time)
    }

    fn race_info(race_index: u32, creation_time: i64) -> RaceInfoEvent {
        RaceInfoEvent {
            race_index,
            competition_id: "comp-1".into(),
            total_nodes: 6,
            required_keys: 50,
            start_time: 0,
            end_time: 0,
            home_team: Some(vec!["z1".into(), "z2".into()]),
            away_team: Some(vec!["z3".into(), "z4".into()]),
            node_rewards: Some(vec![
                NodeRewardSpec { reward: 10, is_story: false },
                NodeRewardSpec { reward: 0, is_story: true },
                NodeRewardSpec { reward: 10, is_story: false },
                NodeRewardSpec { reward: 0, is_story: false },
                NodeRewardSpec { reward: 100, is_story: false },
            ]),
            creation_time: Some(creation_time),
        }
    }

    fn progress(zid: &str, race_index: u32, creation_time: i64) -> PlayerProgressEvent {
        PlayerProgressEvent {
            zid: zid.into(),
            new_node: None,
            keys_won: 0,
            race_index,
            creation_time,
            lead: None,
        }
    }

    fn completion(race_index: u32, event_id: &str) -> RaceCompleteEvent {
        RaceCompleteEvent {
            race_index,
            winner_zid: "z1".into(),
            has_won: true,
            required_keys: 50,
            home_team: None,
            away_team: None,
            event_id: event_id.into(),
        }
    }

    fn drain(rx: &mut Receiver<Notification>) -> Vec<Notification> {
        let mut seen = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(notification) => seen.push(notification),
                Err(TryRecvError::Empty) => return seen,
                Err(err) => panic!("notification stream broken: {err:?}"),
            }
        }
    }

    #[test]
    fn race_info_without_nodes_is_a_noop() {
        let (mut ctx, _rx, _time) = context();
        let mut payload = race_info(0, 10);
        payload.node_rewards = None;
        on_new_race(&mut ctx, payload);
        assert_eq!(ctx.phase(), RacePhase::Idle);
        assert!(ctx.state().is_none());
    }

    #[test]
    fn stale_progress_is_rejected_without_state_change() {
        let (mut ctx, _rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));

        let mut late = progress("z1", 0, 5);
        late.keys_won = 7;
        on_player_progress(&mut ctx, late);

        let state = ctx.state().unwrap();
        assert_eq!(state.registry.get("z1").unwrap().keys, 0);
        assert_eq!(state.race.authoritative_timestamp, 10);
    }

    #[test]
    fn admitted_progress_never_advances_the_clock() {
        let (mut ctx, _rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));

        let mut event = progress("z1", 0, 500);
        event.keys_won = 1;
        on_player_progress(&mut ctx, event);

        assert_eq!(ctx.state().unwrap().race.authoritative_timestamp, 10);
    }

    #[test]
    fn stale_race_info_is_rejected() {
        let (mut ctx, _rx, _time) = context();
        on_new_race(&mut ctx, race_info(1, 100));
        on_new_race(&mut ctx, race_info(0, 50));
        assert_eq!(ctx.state().unwrap().race.race_index, 1);
    }

    #[test]
    fn race_index_mismatch_applies_delta_and_requests_resync() {
        let (mut ctx, mut rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));
        drain(&mut rx);

        let mut event = progress("z2", 3, 20);
        event.keys_won = 4;
        on_player_progress(&mut ctx, event);

        assert_eq!(ctx.state().unwrap().registry.get("z2").unwrap().keys, 4);
        let resync = drain(&mut rx).into_iter().find(|n| {
            matches!(n, Notification::ResyncRequested { server_race_index: 3, .. })
        });
        assert!(resync.is_some());
    }

    #[test]
    fn remote_player_advances_immediately_even_on_story_nodes() {
        let (mut ctx, mut rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));
        drain(&mut rx);

        // Node 2 is a story node; z3 is not the viewing player.
        let mut event = progress("z3", 0, 20);
        event.new_node = Some(2);
        on_player_progress(&mut ctx, event);

        assert_eq!(ctx.state().unwrap().registry.get("z3").unwrap().position, 2);
        assert!(ctx.deferred_advance().is_none());
        assert!(
            drain(&mut rx)
                .iter()
                .any(|n| matches!(n, Notification::PlayerAdvanced { to: 2, .. }))
        );
    }

    #[test]
    fn local_story_landing_defers_until_presentation_completes() {
        let (mut ctx, mut rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));
        drain(&mut rx);

        let mut event = progress("z1", 0, 20);
        event.new_node = Some(2);
        on_player_progress(&mut ctx, event);

        assert_eq!(ctx.state().unwrap().registry.get("z1").unwrap().position, 0);
        assert_eq!(
            ctx.deferred_advance(),
            Some(&DeferredAdvance {
                player_id: "z1".into(),
                target_node: 2
            })
        );
        assert!(
            drain(&mut rx)
                .iter()
                .any(|n| matches!(n, Notification::AdvanceDeferred { node: 2, .. }))
        );

        let landed = apply_deferred_advance(&mut ctx).unwrap();
        assert_eq!(landed, 2);
        assert_eq!(ctx.state().unwrap().registry.get("z1").unwrap().position, 2);
        assert!(ctx.deferred_advance().is_none());
        // A second release has nothing to do.
        assert_eq!(apply_deferred_advance(&mut ctx), None);
    }

    #[test]
    fn completions_acknowledge_in_fifo_order() {
        let (mut ctx, mut rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));
        on_race_complete(&mut ctx, completion(0, "evt-a"));
        on_new_race(&mut ctx, race_info(1, 20));
        on_race_complete(&mut ctx, completion(1, "evt-b"));
        drain(&mut rx);

        assert_eq!(consume_race_complete(&mut ctx, "evt-a"), Some("evt-a".into()));
        // Mismatched expectation logs but still consumes the oldest entry.
        assert_eq!(consume_race_complete(&mut ctx, "evt-zzz"), Some("evt-b".into()));
        assert_eq!(consume_race_complete(&mut ctx, "evt-c"), None);

        let acks: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|n| match n {
                Notification::AdvanceRaceRequested { event_id } => Some(event_id),
                _ => None,
            })
            .collect();
        assert_eq!(acks, vec!["evt-a".to_string(), "evt-b".to_string()]);
    }

    #[test]
    fn duplicate_completion_is_dropped() {
        let (mut ctx, mut rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));
        drain(&mut rx);

        on_race_complete(&mut ctx, completion(0, "evt-a"));
        on_race_complete(&mut ctx, completion(0, "evt-a"));

        assert_eq!(ctx.pending_completions().count(), 1);
        let completed = drain(&mut rx)
            .into_iter()
            .filter(|n| matches!(n, Notification::RaceCompleted { .. }))
            .count();
        assert_eq!(completed, 1);
        assert_eq!(ctx.phase(), RacePhase::RaceComplete);
    }

    #[test]
    fn reward_claim_is_idempotent() {
        let (mut ctx, mut rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));
        drain(&mut rx);

        on_node_reward(
            &mut ctx,
            NodeRewardEvent {
                node: 1,
                rewards: vec![RewardItem { amount: 40 }, RewardItem { amount: 60 }],
                event_id: "evt-r".into(),
            },
        );

        let seen = drain(&mut rx);
        assert!(seen.iter().any(|n| matches!(
            n,
            Notification::PendingCredit { amount: 100, .. }
        )));
        assert!(seen.iter().any(|n| matches!(
            n,
            Notification::RewardPresentation { amount: 100, .. }
        )));

        assert_eq!(consume_reward(&mut ctx, "evt-r"), 100);
        assert_eq!(consume_reward(&mut ctx, "evt-r"), 0);

        let consumed = drain(&mut rx)
            .into_iter()
            .filter(|n| matches!(n, Notification::RewardConsumed { .. }))
            .count();
        assert_eq!(consumed, 1);
    }

    #[test]
    fn unpresentable_reward_is_consumed_silently() {
        let (mut ctx, mut rx, _time) = context();
        let mut payload = race_info(0, 10);
        // The viewing player is on neither roster.
        payload.home_team = Some(vec!["z2".into()]);
        on_new_race(&mut ctx, payload);
        drain(&mut rx);

        on_token_reward(
            &mut ctx,
            TokenRewardEvent {
                rewards: vec![RewardItem { amount: 35 }],
                event_id: "evt-t".into(),
            },
        );

        let seen = drain(&mut rx);
        assert!(!seen
            .iter()
            .any(|n| matches!(n, Notification::RewardPresentation { .. })));
        assert!(seen.iter().any(|n| matches!(
            n,
            Notification::RewardConsumed { amount: 35, .. }
        )));
        // Nothing left to claim later.
        assert_eq!(consume_reward(&mut ctx, "evt-t"), 0);
    }

    #[test]
    fn reward_after_window_end_is_consumed_silently() {
        let (mut ctx, mut rx, time) = context();
        let mut payload = race_info(0, 10);
        payload.end_time = 1_000;
        on_new_race(&mut ctx, payload);
        drain(&mut rx);
        time.store(2_000, Ordering::SeqCst);

        on_node_reward(
            &mut ctx,
            NodeRewardEvent {
                node: 1,
                rewards: vec![RewardItem { amount: 10 }],
                event_id: "evt-late".into(),
            },
        );

        let seen = drain(&mut rx);
        assert!(!seen
            .iter()
            .any(|n| matches!(n, Notification::RewardPresentation { .. })));
        assert!(seen
            .iter()
            .any(|n| matches!(n, Notification::RewardConsumed { .. })));
    }

    #[test]
    fn threshold_crossing_fires_once_for_the_lowest_remaining() {
        let (mut ctx, mut rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));
        drain(&mut rx);

        // Home team reaches 30/50: the 20-remaining threshold fires.
        let mut event = progress("z1", 0, 20);
        event.keys_won = 30;
        on_player_progress(&mut ctx, event);
        let toasts: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|n| match n {
                Notification::Toast(request) => Some(request),
                _ => None,
            })
            .collect();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].category, ToastCategory::KeysToWin);
        assert_eq!(toasts[0].body.remaining_keys, Some(20));
        ctx.on_toast_dismissed();

        // 30 -> 45 crosses the 10- and 5-remaining thresholds together; only
        // the 5-remaining one fires and the cursor lands on it.
        let mut event = progress("z2", 0, 21);
        event.keys_won = 15;
        on_player_progress(&mut ctx, event);
        let toasts: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|n| match n {
                Notification::Toast(request) => Some(request),
                _ => None,
            })
            .collect();
        let threshold_toasts: Vec<_> = toasts
            .iter()
            .filter(|t| t.category == ToastCategory::KeysToWin)
            .collect();
        assert_eq!(threshold_toasts.len(), 1);
        assert_eq!(threshold_toasts[0].body.remaining_keys, Some(5));
    }

    #[test]
    fn keys_awarded_toasts_respect_dismissal_cooldown() {
        let (mut ctx, mut rx, time) = context();
        let mut payload = race_info(0, 10);
        payload.required_keys = 1_000; // keep thresholds out of the way
        on_new_race(&mut ctx, payload);
        drain(&mut rx);

        let award = |ctx: &mut RaceContext, ct: i64| {
            let mut event = progress("z3", 0, ct);
            event.keys_won = 1;
            on_player_progress(ctx, event);
        };

        award(&mut ctx, 20);
        ctx.on_toast_dismissed(); // dismissed at t=0

        // Inside the 30s window measured from the dismissal: rejected.
        time.store(10_000, Ordering::SeqCst);
        award(&mut ctx, 21);

        // Outside the window: dispatched again.
        time.store(31_000, Ordering::SeqCst);
        award(&mut ctx, 22);

        let toasts = drain(&mut rx)
            .into_iter()
            .filter(|n| matches!(n, Notification::Toast(_)))
            .count();
        assert_eq!(toasts, 2);
    }

    #[test]
    fn lead_change_raises_a_toast_once_per_leader() {
        let (mut ctx, mut rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));
        drain(&mut rx);
        ctx.on_toast_dismissed();

        let mut event = progress("z3", 0, 20);
        event.keys_won = 2;
        event.lead = Some("z3".into());
        on_player_progress(&mut ctx, event);
        ctx.on_toast_dismissed();

        // Same leader again: no second lead-change toast.
        let mut event = progress("z3", 0, 21);
        event.keys_won = 2;
        event.lead = Some("z3".into());
        on_player_progress(&mut ctx, event);

        let lead_toasts = drain(&mut rx)
            .into_iter()
            .filter(|n| {
                matches!(
                    n,
                    Notification::Toast(ToastRequest {
                        category: ToastCategory::LeadChange,
                        ..
                    })
                )
            })
            .count();
        assert_eq!(lead_toasts, 1);
    }

    #[test]
    fn calls_before_any_race_are_safe_noops() {
        let (mut ctx, mut rx, _time) = context();
        assert_eq!(award_keys(&mut ctx, "z1", 5), 0);
        on_player_progress(&mut ctx, progress("z1", 0, 10));
        on_race_complete(&mut ctx, completion(0, "evt-a"));
        on_round_complete(&mut ctx, RoundCompleteEvent { zid: "z1".into() });
        assert!(drain(&mut rx).is_empty());
        assert_eq!(ctx.phase(), RacePhase::Idle);
    }

    #[test]
    fn round_complete_bumps_the_lap_counter() {
        let (mut ctx, mut rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));
        drain(&mut rx);

        on_round_complete(&mut ctx, RoundCompleteEvent { zid: "z2".into() });
        assert_eq!(ctx.state().unwrap().registry.get("z2").unwrap().round, 1);
        assert!(
            drain(&mut rx)
                .iter()
                .any(|n| matches!(n, Notification::RoundCompleted { round: 1, .. }))
        );
    }

    #[test]
    fn new_race_finalizes_orphaned_rewards() {
        let (mut ctx, mut rx, _time) = context();
        on_new_race(&mut ctx, race_info(0, 10));
        on_node_reward(
            &mut ctx,
            NodeRewardEvent {
                node: 1,
                rewards: vec![RewardItem { amount: 50 }],
                event_id: "evt-old".into(),
            },
        );
        drain(&mut rx);

        on_new_race(&mut ctx, race_info(1, 20));

        assert!(drain(&mut rx).iter().any(|n| matches!(
            n,
            Notification::RewardConsumed { amount: 50, .. }
        )));
        assert_eq!(consume_reward(&mut ctx, "evt-old"), 0);
    }
}
