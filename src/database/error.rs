use thiserror::Error;

/// Storage-layer error with a classified kind so callers can map it to
/// an HTTP status without inspecting sqlx internals.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

#[derive(Debug, Error)]
pub enum DatabaseErrorKind {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("query failed: {message}")]
    Query { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    /// Classify a raw sqlx error.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            },
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                DatabaseErrorKind::Conflict {
                    message: db_err.to_string(),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseErrorKind::Connection {
                    message: err.to_string(),
                }
            }
            _ => DatabaseErrorKind::Query {
                message: err.to_string(),
            },
        };
        Self::new(kind)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_classifies_as_not_found() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn pool_timeout_is_retryable() {
        let err = DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
    }
}
