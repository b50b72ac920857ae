use crate::application::repos::RepoError;

/// `undefined_function`: the backend lacks `unnest` or another array helper.
const SQLSTATE_UNDEFINED_FUNCTION: &str = "42883";
/// `wrong_object_type`: the `tags` column is not an array on this backend.
const SQLSTATE_WRONG_OBJECT_TYPE: &str = "42809";
/// `query_canceled`: statement timeout or user cancel.
const SQLSTATE_QUERY_CANCELED: &str = "57014";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepoError::unavailable(err)
        }
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(SQLSTATE_UNDEFINED_FUNCTION | SQLSTATE_WRONG_OBJECT_TYPE) => {
                RepoError::unsupported(db.message())
            }
            Some(SQLSTATE_QUERY_CANCELED) => RepoError::Timeout,
            _ if db
                .message()
                .contains("canceling statement due to user request") =>
            {
                RepoError::Timeout
            }
            _ => RepoError::from_persistence(db.message()),
        },
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => RepoError::InvalidData {
            message: err.to_string(),
        },
        other => RepoError::from_persistence(other),
    }
}
