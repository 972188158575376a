//! Shared helpers for the PostgreSQL backends.

use meridian_core::error::StoreError;

/// Maps a sqlx error to `StoreError::Storage`.
pub(crate) fn storage_err(err: sqlx::Error) -> StoreError {
    StoreError::Storage(err.to_string())
}

/// Returns whether an error is a violation of the named unique constraint.
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505") && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}
