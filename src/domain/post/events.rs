use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{Delivery, DomainEvent};

// ============================================================================
// Post Domain Events
// ============================================================================

/// Union type for all post events.
///
/// `Drafted` is local-only: draft autosave feeds same-process audit and
/// cache handlers and has no cross-process consumers, so it never touches
/// the outbox. Publish and delete are visible platform facts and are
/// relayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PostEvent {
    Drafted(PostDrafted),
    Published(PostPublished),
    Deleted(PostDeleted),
}

impl DomainEvent for PostEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PostEvent::Drafted(_) => "PostDrafted",
            PostEvent::Published(_) => "PostPublished",
            PostEvent::Deleted(_) => "PostDeleted",
        }
    }

    fn delivery(&self) -> Delivery {
        match self {
            PostEvent::Drafted(_) => Delivery::Local,
            PostEvent::Published(_) | PostEvent::Deleted(_) => Delivery::Relay,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDrafted {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPublished {
    pub title: String,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDeleted {
    pub title: String,
}
