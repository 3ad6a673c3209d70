use serde::{Deserialize, Serialize};

use crate::events::{Delivery, DomainEvent};

// ============================================================================
// Category Domain Events
// ============================================================================

/// Union type for all category events.
///
/// Every category event crosses process boundaries (downstream consumers
/// keep activity logs and denormalized navigation in sync), so the whole
/// enum is relay-required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CategoryEvent {
    Created(CategoryCreated),
    Renamed(CategoryRenamed),
    Deleted(CategoryDeleted),
}

impl DomainEvent for CategoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CategoryEvent::Created(_) => "CategoryCreated",
            CategoryEvent::Renamed(_) => "CategoryRenamed",
            CategoryEvent::Deleted(_) => "CategoryDeleted",
        }
    }

    fn delivery(&self) -> Delivery {
        Delivery::Relay
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCreated {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRenamed {
    pub old_name: String,
    pub new_name: String,
    pub new_slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDeleted {
    pub name: String,
}
