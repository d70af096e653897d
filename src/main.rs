//! Replay driver: feeds a JSON-lines server event log through the engine and
//! prints the resulting standings.

use std::{
    env,
    fs::File,
    io::{BufRead, BufReader},
};

use anyhow::Context;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quest_race_engine::{
    config::EngineConfig,
    dao::history::FileHistoryStore,
    dto::{events::ServerEvent, notify::Notification},
    services::reconciler,
    state::{RaceContext, players::TeamSide},
};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = env::args().skip(1);
    let log_path = args
        .next()
        .context("usage: quest-race-engine <event-log.jsonl> [local-zid]")?;
    let local_player = args.next();

    let config = EngineConfig::load();
    let store = FileHistoryStore::new(config.history_path.clone());
    let mut ctx = RaceContext::new(config, local_player).with_store(Box::new(store));
    let mut notifications = ctx.subscribe();

    let file = File::open(&log_path).with_context(|| format!("opening {log_path}"))?;
    let mut applied = 0usize;
    for (line_number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {log_path}"))?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ServerEvent>(&line) {
            Ok(event) => {
                reconciler::apply_event(&mut ctx, event);
                applied += 1;
            }
            Err(err) => {
                warn!(line = line_number + 1, error = %err, "skipping malformed event line");
                continue;
            }
        }

        react(&mut ctx, &mut notifications);
    }

    info!(applied, "replay finished");
    print_standings(&ctx);
    Ok(())
}

/// Play the UI collaborator's part: dismiss toasts, release deferred advances,
/// and finalize presented rewards so the claim flow completes.
fn react(ctx: &mut RaceContext, notifications: &mut tokio::sync::broadcast::Receiver<Notification>) {
    loop {
        let notification = match notifications.try_recv() {
            Ok(notification) => notification,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Lagged(missed)) => {
                warn!(missed, "notification stream lagged");
                continue;
            }
            Err(TryRecvError::Closed) => return,
        };

        match notification {
            Notification::Toast(request) => {
                info!(category = ?request.category, "toast dispatched");
                ctx.on_toast_dismissed();
            }
            Notification::RewardPresentation { event_id, amount, .. } => {
                info!(event_id = %event_id, amount, "presenting reward");
                reconciler::consume_reward(ctx, &event_id);
                if ctx.deferred_advance().is_some() {
                    reconciler::apply_deferred_advance(ctx);
                }
            }
            Notification::RaceCompleted { winner_id, home_won } => {
                info!(winner_id = %winner_id, home_won, "race completed");
                let event_id = ctx.pending_completions().next().map(str::to_string);
                if let Some(event_id) = event_id {
                    reconciler::consume_race_complete(ctx, &event_id);
                }
            }
            other => info!(notification = ?other, "notification"),
        }
    }
}

fn print_standings(ctx: &RaceContext) {
    let Some(state) = ctx.state() else {
        println!("no race was initialized");
        return;
    };

    println!(
        "race {} ({}): home {} / away {} of {} keys{}",
        state.race.race_index,
        state.race.competition_id,
        state.team_keys(TeamSide::Home),
        state.team_keys(TeamSide::Away),
        state.race.required_keys,
        if state.race.is_complete { " [complete]" } else { "" },
    );
    for progress in state.registry.iter() {
        println!(
            "  {} @ node {} (round {}, {} keys)",
            progress.player_id, progress.position, progress.round, progress.keys
        );
    }
    println!("{} completed race(s) in history", ctx.history().len());
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
