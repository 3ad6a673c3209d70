// ============================================================================
// Category Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error("Category name cannot be empty")]
    EmptyName,

    #[error("Category name too long: {0} characters (max 100)")]
    NameTooLong(usize),

    #[error("Category is already deleted")]
    AlreadyDeleted,
}
