use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::EventEnvelope;

/// Processing status of an outbox record. Only ever moves forward:
/// `pending -> processed`, or `pending -> failed -> ... -> processed | dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Processed,
    Failed,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processed => "processed",
            OutboxStatus::Failed => "failed",
            OutboxStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboxStatus::Pending),
            "processed" => Some(OutboxStatus::Processed),
            "failed" => Some(OutboxStatus::Failed),
            "dead" => Some(OutboxStatus::Dead),
            _ => None,
        }
    }
}

/// An outbox row about to be inserted by the unit of work.
#[derive(Debug, Clone)]
pub struct NewOutboxRecord {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl NewOutboxRecord {
    pub fn from_envelope(envelope: &EventEnvelope) -> Self {
        Self {
            event_id: envelope.event_id,
            event_type: envelope.event_type.clone(),
            aggregate_id: envelope.aggregate_id,
            payload: envelope.payload.to_string(),
            created_at: envelope.occurred_at,
        }
    }
}

/// A durable outbox row.
///
/// `id` is insertion-ordered; the polling query orders by it, which
/// preserves per-aggregate raise order (no cross-aggregate guarantee).
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub id: i64,
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub status: OutboxStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub claimed_until: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Rebuild the wire envelope from the stored columns.
    pub fn envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        Ok(EventEnvelope {
            event_id: self.event_id,
            event_type: self.event_type.clone(),
            aggregate_id: self.aggregate_id,
            occurred_at: self.created_at,
            payload: serde_json::from_str(&self.payload)?,
        })
    }

    /// Eligible for a relay attempt: pending and never attempted, or failed
    /// with an elapsed retry deadline. Claim expiry is checked separately.
    pub fn attempt_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            OutboxStatus::Pending => self
                .next_retry_at
                .map(|at| at <= now)
                .unwrap_or(true),
            OutboxStatus::Failed => self
                .next_retry_at
                .map(|at| at <= now)
                .unwrap_or(false),
            OutboxStatus::Processed | OutboxStatus::Dead => false,
        }
    }

    /// An unexpired claim by another worker blocks this record.
    pub fn claim_free(&self, now: DateTime<Utc>) -> bool {
        self.claimed_until.map(|until| until <= now).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: OutboxStatus) -> OutboxRecord {
        OutboxRecord {
            id: 1,
            event_id: Uuid::new_v4(),
            event_type: "CategoryCreated".to_string(),
            aggregate_id: Uuid::new_v4(),
            payload: r#"{"name":"Docker"}"#.to_string(),
            created_at: Utc::now(),
            status,
            processed_at: None,
            retry_count: 0,
            last_error: None,
            next_retry_at: None,
            claimed_by: None,
            claimed_until: None,
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Processed,
            OutboxStatus::Failed,
            OutboxStatus::Dead,
        ] {
            assert_eq!(OutboxStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OutboxStatus::parse("claimed"), None);
    }

    #[test]
    fn envelope_rebuilds_from_columns() {
        let rec = record(OutboxStatus::Pending);
        let env = rec.envelope().unwrap();
        assert_eq!(env.event_id, rec.event_id);
        assert_eq!(env.payload["name"], "Docker");
    }

    #[test]
    fn eligibility_follows_the_status_machine() {
        let now = Utc::now();

        assert!(record(OutboxStatus::Pending).attempt_eligible(now));
        assert!(!record(OutboxStatus::Processed).attempt_eligible(now));
        assert!(!record(OutboxStatus::Dead).attempt_eligible(now));

        let mut failed = record(OutboxStatus::Failed);
        failed.next_retry_at = Some(now + Duration::seconds(30));
        assert!(!failed.attempt_eligible(now));

        failed.next_retry_at = Some(now - Duration::seconds(1));
        assert!(failed.attempt_eligible(now));
    }

    #[test]
    fn expired_claim_frees_the_record() {
        let now = Utc::now();
        let mut rec = record(OutboxStatus::Pending);

        rec.claimed_by = Some("relay-a".to_string());
        rec.claimed_until = Some(now + Duration::seconds(10));
        assert!(!rec.claim_free(now));

        rec.claimed_until = Some(now - Duration::seconds(1));
        assert!(rec.claim_free(now));
    }
}
