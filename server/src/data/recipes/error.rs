//! Recipe store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecipeStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_display() {
        let err = RecipeStoreError::InvalidUrl("mysql://x".to_string());
        assert_eq!(err.to_string(), "Invalid database URL: mysql://x");
    }

    #[test]
    fn test_from_sqlx_error() {
        let err: RecipeStoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, RecipeStoreError::Database(_)));
    }
}
