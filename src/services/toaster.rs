//! Cooldown/priority-gated toaster scheduling.
//!
//! The scheduler turns candidate notifications into at most one outward toast
//! per cooldown window. It never starts OS timers: time arrives through the
//! [`Clock`] abstraction, driven by the host's wall-clock tick.

use tracing::debug;

use crate::dto::notify::ToastCategory;

/// Wall-clock tick abstraction the scheduler measures cooldowns against.
pub trait Clock: Send + Sync {
    /// Current wall-clock time in unix milliseconds.
    fn now_ms(&self) -> i64;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }
}

/// Single-slot, cooldown-gated toast dispatcher plus the key-threshold cursor.
#[derive(Debug)]
pub struct ToastScheduler {
    cooldown_ms: i64,
    in_flight: Option<ToastCategory>,
    last_dismissed_at: Option<i64>,
    /// Break points in earned team keys, ascending. Derived from the
    /// configured remaining-keys thresholds on every new race.
    break_points: Vec<u32>,
    /// Index of the last break point reached, -1 before any.
    cursor: i32,
}

impl ToastScheduler {
    /// Build a scheduler with the given "keys awarded" cooldown.
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown_ms: (cooldown_secs as i64) * 1000,
            in_flight: None,
            last_dismissed_at: None,
            break_points: Vec::new(),
            cursor: -1,
        }
    }

    /// Re-derive the threshold break points for a new race.
    ///
    /// `remaining_thresholds` is the configured list of remaining-keys trigger
    /// values (e.g. `[20, 10, 5]`). Values larger than `required_keys` are
    /// unreachable and filtered out. The cursor resets to -1.
    pub fn configure_thresholds(&mut self, remaining_thresholds: &[u32], required_keys: u32) {
        let mut break_points: Vec<u32> = remaining_thresholds
            .iter()
            .filter(|&&remaining| remaining <= required_keys)
            .map(|&remaining| required_keys - remaining)
            .collect();
        break_points.sort_unstable();
        break_points.dedup();
        self.break_points = break_points;
        self.cursor = -1;
    }

    /// Advance the cursor for a team key total and report the crossing to fire.
    ///
    /// When one update jumps across several break points only the last one
    /// (smallest remaining keys) fires; the cursor advances past all of them so
    /// skipped thresholds never double-fire later.
    pub fn crossed_threshold(&mut self, team_keys: u32, required_keys: u32) -> Option<u32> {
        let mut reached: Option<usize> = None;
        for (index, &break_point) in self.break_points.iter().enumerate() {
            if (index as i32) > self.cursor && team_keys >= break_point {
                reached = Some(index);
            }
        }

        let index = reached?;
        self.cursor = index as i32;
        Some(required_keys.saturating_sub(self.break_points[index]))
    }

    /// Attempt to occupy the toast slot for `category` at `now_ms`.
    ///
    /// Rejected when a toast is already in flight, or when the category is
    /// cooldown-gated and the window since the previous dismissal has not
    /// elapsed. Threshold and lead-change toasts bypass the cooldown but still
    /// respect the single slot.
    pub fn schedule(&mut self, now_ms: i64, category: ToastCategory) -> bool {
        if let Some(current) = self.in_flight {
            debug!(?category, ?current, "toast slot occupied, rejecting");
            return false;
        }

        if matches!(category, ToastCategory::KeysAwarded) {
            if let Some(dismissed_at) = self.last_dismissed_at {
                if now_ms < dismissed_at + self.cooldown_ms {
                    debug!(?category, "toast category on cooldown, rejecting");
                    return false;
                }
            }
        }

        self.in_flight = Some(category);
        true
    }

    /// Clear the in-flight slot and stamp the dismissal time the next cooldown
    /// window is measured from.
    pub fn on_dismissed(&mut self, now_ms: i64) {
        self.in_flight = None;
        self.last_dismissed_at = Some(now_ms);
    }

    /// Category currently occupying the slot, if any.
    pub fn in_flight(&self) -> Option<ToastCategory> {
        self.in_flight
    }

    /// Current threshold cursor (-1 before any break point is reached).
    pub fn cursor(&self) -> i32 {
        self.cursor
    }
}
