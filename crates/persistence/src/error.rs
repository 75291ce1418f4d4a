//! Mapping from database errors to store errors.

use domain::StoreError;
use sqlx::error::ErrorKind;

/// Converts a sqlx error into the domain's store error.
///
/// Unique violations surface as duplicates and check violations as rejected
/// writes; everything else means the database is unavailable.
pub fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => StoreError::Duplicate(db.message().to_string()),
            ErrorKind::CheckViolation | ErrorKind::ForeignKeyViolation => {
                StoreError::Rejected(db.message().to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        },
        _ => StoreError::Unavailable(err.to_string()),
    }
}
