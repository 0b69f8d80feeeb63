//! Metric name constants.
//!
//! Recorded through the `metrics` facade; no exporter is installed by this
//! crate. Constants live here to avoid typos across modules.

/// Connections registered total (counter).
pub const CONNECTIONS_TOTAL: &str = "chat_connections_total";
/// Orderly disconnections total (counter).
pub const DISCONNECTIONS_TOTAL: &str = "chat_disconnections_total";
/// Active registered connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "chat_connections_active";
/// Broadcasts performed total (counter).
pub const BROADCASTS_TOTAL: &str = "chat_broadcasts_total";
/// Recipients pruned after delivery failure total (counter).
pub const DELIVERY_FAILURES_TOTAL: &str = "chat_delivery_failures_total";
/// Presence snapshots published total (counter).
pub const PRESENCE_UPDATES_TOTAL: &str = "chat_presence_updates_total";
