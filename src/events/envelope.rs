use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire shape of a published event.
///
/// The same envelope is used for broker publishing and for in-process
/// dispatch, so consumers and local handlers see an identical contract.
/// `event_id` is minted when the unit of work serializes the event and is
/// the idempotency key consumers deduplicate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}
