use super::aggregate::PostStatus;

// ============================================================================
// Post Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("Post title cannot be empty")]
    EmptyTitle,

    #[error("Post must be a draft to publish, but is {0:?}")]
    NotADraft(PostStatus),

    #[error("Post is already deleted")]
    AlreadyDeleted,
}
