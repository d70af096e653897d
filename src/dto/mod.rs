//! Serde payloads crossing the engine boundary: inbound server events and
//! outbound domain notifications.

/// Inbound server event payloads.
pub mod events;
/// Outbound domain notifications and toast payloads.
pub mod notify;
