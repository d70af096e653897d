//! Stateless service functions operating on a [`RaceContext`].
//!
//! [`RaceContext`]: crate::state::RaceContext

/// Race lifecycle orchestration and history persistence.
pub mod lifecycle;
/// Event reconciliation and the reward-claim protocol.
pub mod reconciler;
/// Cooldown-gated toaster scheduling.
pub mod toaster;
