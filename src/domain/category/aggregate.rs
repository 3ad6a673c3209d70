use uuid::Uuid;

use crate::events::{DomainEvent, EventSource, PendingEvent};

use super::errors::CategoryError;
use super::events::{CategoryCreated, CategoryDeleted, CategoryEvent, CategoryRenamed};

const MAX_NAME_LEN: usize = 100;

/// Blog category aggregate.
///
/// Raising an event only appends to the pending list; nothing is delivered
/// until the owning unit of work commits.
#[derive(Debug)]
pub struct Category {
    id: Uuid,
    name: String,
    slug: String,
    deleted: bool,
    pending: Vec<PendingEvent>,
}

impl Category {
    pub fn create(name: &str) -> Result<Self, CategoryError> {
        let name = validated_name(name)?;
        let slug = slugify(&name);

        let mut category = Self {
            id: Uuid::new_v4(),
            name: name.clone(),
            slug: slug.clone(),
            deleted: false,
            pending: Vec::new(),
        };
        category.record(CategoryEvent::Created(CategoryCreated { name, slug }));
        Ok(category)
    }

    pub fn rename(&mut self, new_name: &str) -> Result<(), CategoryError> {
        if self.deleted {
            return Err(CategoryError::AlreadyDeleted);
        }
        let new_name = validated_name(new_name)?;

        let old_name = std::mem::replace(&mut self.name, new_name.clone());
        self.slug = slugify(&new_name);
        self.record(CategoryEvent::Renamed(CategoryRenamed {
            old_name,
            new_name,
            new_slug: self.slug.clone(),
        }));
        Ok(())
    }

    pub fn delete(&mut self) -> Result<(), CategoryError> {
        if self.deleted {
            return Err(CategoryError::AlreadyDeleted);
        }
        self.deleted = true;
        self.record(CategoryEvent::Deleted(CategoryDeleted {
            name: self.name.clone(),
        }));
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn record<E: DomainEvent>(&mut self, event: E) {
        self.pending.push(PendingEvent::new(self.id, event));
    }
}

impl EventSource for Category {
    fn pending_events(&self) -> &[PendingEvent] {
        &self.pending
    }

    fn clear_events(&mut self) {
        self.pending.clear();
    }
}

fn validated_name(name: &str) -> Result<String, CategoryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CategoryError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CategoryError::NameTooLong(name.chars().count()));
    }
    Ok(name.to_string())
}

/// URL slug: lowercase, alphanumeric runs joined by single hyphens.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_hyphen = true;
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}
