use thiserror::Error;

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AuditError {
    /// Every store failure is worth a redelivery; malformed events never reach
    /// the store.
    pub fn is_transient(&self) -> bool {
        match self {
            AuditError::Database(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failures_are_transient() {
        let err = AuditError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert!(err.to_string().starts_with("Database error"));
    }
}
