mod aggregate;
mod errors;
mod events;

pub use aggregate::{Post, PostStatus};
pub use errors::PostError;
pub use events::{PostDeleted, PostDrafted, PostEvent, PostPublished};
