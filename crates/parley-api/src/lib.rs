pub mod blocks;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod moderation;
pub mod notifications;
pub mod notify;
pub mod rate_limit;
pub mod reports;
pub mod state;

use tracing::warn;
use uuid::Uuid;

/// Ids are written by the application as UUID strings; anything else in the
/// store is corruption, logged and surfaced as the nil id rather than a 500.
pub(crate) fn parse_uuid(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", context, raw, e);
        Uuid::default()
    })
}
