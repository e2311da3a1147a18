use sqlx::PgPool;

/// Runs the SQL query structs in [`crate::entities`] against a pool.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Errors surfaced by the storage traits.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness rule was violated (e.g. a payment tx hash already in use).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
}

impl StoreError {
    /// Map a Postgres unique-violation into [`StoreError::UniqueViolation`].
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_unique_violation()
        {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            return StoreError::UniqueViolation(constraint);
        }
        StoreError::Database(err)
    }
}
