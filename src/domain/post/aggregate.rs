use uuid::Uuid;

use crate::events::{DomainEvent, EventSource, PendingEvent};

use super::errors::PostError;
use super::events::{PostDeleted, PostDrafted, PostEvent, PostPublished};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStatus {
    Draft,
    Published,
    Deleted,
}

/// Blog post aggregate.
#[derive(Debug)]
pub struct Post {
    id: Uuid,
    title: String,
    body: String,
    category_id: Option<Uuid>,
    status: PostStatus,
    pending: Vec<PendingEvent>,
}

impl Post {
    pub fn draft(title: &str, body: &str) -> Result<Self, PostError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PostError::EmptyTitle);
        }

        let mut post = Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            body: body.to_string(),
            category_id: None,
            status: PostStatus::Draft,
            pending: Vec::new(),
        };
        post.record(PostEvent::Drafted(PostDrafted {
            title: title.to_string(),
        }));
        Ok(post)
    }

    pub fn assign_category(&mut self, category_id: Uuid) {
        self.category_id = Some(category_id);
    }

    pub fn publish(&mut self) -> Result<(), PostError> {
        if self.status != PostStatus::Draft {
            return Err(PostError::NotADraft(self.status));
        }
        self.status = PostStatus::Published;
        self.record(PostEvent::Published(PostPublished {
            title: self.title.clone(),
            category_id: self.category_id,
        }));
        Ok(())
    }

    pub fn delete(&mut self) -> Result<(), PostError> {
        if self.status == PostStatus::Deleted {
            return Err(PostError::AlreadyDeleted);
        }
        self.status = PostStatus::Deleted;
        self.record(PostEvent::Deleted(PostDeleted {
            title: self.title.clone(),
        }));
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn status(&self) -> PostStatus {
        self.status
    }

    pub fn category_id(&self) -> Option<Uuid> {
        self.category_id
    }

    fn record<E: DomainEvent>(&mut self, event: E) {
        self.pending.push(PendingEvent::new(self.id, event));
    }
}

impl EventSource for Post {
    fn pending_events(&self) -> &[PendingEvent] {
        &self.pending
    }

    fn clear_events(&mut self) {
        self.pending.clear();
    }
}
