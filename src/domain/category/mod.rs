mod aggregate;
mod errors;
mod events;

pub use aggregate::Category;
pub use errors::CategoryError;
pub use events::{CategoryCreated, CategoryDeleted, CategoryEvent, CategoryRenamed};
