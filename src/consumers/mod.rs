use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::events::EventEnvelope;

// ============================================================================
// Consumers - The Receiving Side of the Relay
// ============================================================================
//
// At-least-once delivery means every consumer must tolerate redelivery of
// the same envelope. Each consumer here keeps a processed-event set keyed by
// the envelope's event_id and no-ops on a duplicate. A failing consumer
// returns an error so the broker's own redelivery machinery kicks in; it
// never silently drops a message.
//
// ============================================================================

mod activity_log;
mod notifications;

pub use activity_log::{ActivityEntry, ActivityLogConsumer};
pub use notifications::{Notification, NotificationConsumer};

/// A handler on the far side of the broker.
#[async_trait]
pub trait Consumer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply the event's effect. Must be idempotent against redelivery.
    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<()>;
}

/// Idempotency guard: remembers which event ids were already applied.
#[derive(Default)]
pub struct ProcessedEvents {
    seen: Mutex<HashSet<Uuid>>,
}

impl ProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` exactly once per event id.
    pub async fn first_delivery(&self, event_id: Uuid) -> bool {
        self.seen.lock().await.insert(event_id)
    }
}

/// "CategoryCreated" -> "category_created". Used for activity-log action
/// names.
pub(crate) fn snake_case(event_type: &str) -> String {
    let mut out = String::with_capacity(event_type.len() + 2);
    for (i, c) in event_type.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
