//! Race lifecycle orchestration: restart, completion history, rehydration.

use tracing::{info, warn};

use crate::{
    dao::history::{CompetitionHistoryEntity, RaceSummaryEntity},
    dto::{events::RaceInfoEvent, notify::Notification},
    error::EngineError,
    services::reconciler,
    state::{RaceContext, players::TeamSide, race::RacePhase},
};

/// Re-run full initialization from `payload` and tell dependent UI to
/// re-render from scratch.
///
/// Unlike an ordinary `race_info`, a reset discards the current race before
/// rebuilding, so even a payload older than the admission clock takes effect.
pub fn reset_feature(ctx: &mut RaceContext, payload: RaceInfoEvent) {
    ctx.state = None;
    ctx.phase = RacePhase::Idle;
    ctx.deferred = None;
    reconciler::on_new_race(ctx, payload);
    ctx.publish(Notification::Restarted);
}

/// Load the persisted history for `competition_id`, tolerating absent or
/// corrupt records by starting with an empty set.
pub fn rehydrate_history(ctx: &mut RaceContext, competition_id: &str) {
    let Some(store) = ctx.store.as_ref() else {
        ctx.history.clear();
        return;
    };

    match store.load(competition_id) {
        Ok(Some(entity)) => {
            info!(
                competition_id,
                races = entity.races.len(),
                "rehydrated race history"
            );
            ctx.history = entity.races;
        }
        Ok(None) => ctx.history.clear(),
        Err(err) => {
            warn!(
                competition_id,
                error = %err,
                "failed to load race history, starting empty"
            );
            ctx.history.clear();
        }
    }
}

/// Read the persisted history for `competition_id` straight from the store,
/// for hosts that render past races.
pub fn stored_history(
    ctx: &RaceContext,
    competition_id: &str,
) -> Result<Option<CompetitionHistoryEntity>, EngineError> {
    let store = ctx.store.as_ref().ok_or(EngineError::Degraded)?;
    Ok(store.load(competition_id)?)
}

/// Append the current race's summary to the rolling history and persist it.
///
/// The history is bounded by the configured cap, evicting oldest first.
/// Persistence failures are logged; they never block race progression.
pub fn record_completion(ctx: &mut RaceContext) {
    let Some(state) = ctx.state.as_ref() else {
        return;
    };

    let summary = RaceSummaryEntity {
        race_index: state.race.race_index,
        home_keys: state.team_keys(TeamSide::Home),
        away_keys: state.team_keys(TeamSide::Away),
        final_positions: state
            .registry
            .iter()
            .map(|progress| (progress.player_id.clone(), progress.position))
            .collect(),
    };
    let competition_id = state.race.competition_id.clone();

    ctx.history.push(summary);
    if ctx.history.len() > ctx.config.history_cap {
        let excess = ctx.history.len() - ctx.config.history_cap;
        ctx.history.drain(..excess);
    }

    let Some(store) = ctx.store.as_ref() else {
        return;
    };
    let entity = CompetitionHistoryEntity {
        competition_id,
        races: ctx.history.clone(),
    };
    if let Err(err) = store.save(&entity) {
        warn!(error = %err, "failed to persist race history");
    }
}
