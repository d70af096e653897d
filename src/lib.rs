//! Library crate for quest-race-engine: the event reconciliation and
//! reward-claim state machine behind the two-team competitive race feature.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod services;
pub mod state;
