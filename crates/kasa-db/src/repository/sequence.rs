//! # Sequence Repository
//!
//! Monotonic counters behind bill numbers.
//!
//! ```text
//! INSERT INTO bill_sequences (scope, last_value) VALUES ('INV-20260131', 1)
//! ON CONFLICT(scope) DO UPDATE SET last_value = last_value + 1
//! RETURNING last_value
//! ```
//!
//! One statement, so two writers can never read the same value. A value is
//! consumed even if the sale that took it is later deleted or rolled back
//! in a different transaction.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Repository for bill number sequences.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    /// Creates a new SequenceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Last value handed out for `scope`, or 0.
    pub async fn current(&self, scope: &str) -> DbResult<i64> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT last_value FROM bill_sequences WHERE scope = ?1")
                .bind(scope)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.unwrap_or(0))
    }

    /// Advances `scope` outside any transaction.
    pub async fn next_value(&self, scope: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        next_value(&mut conn, scope).await
    }
}

/// Advances `scope` and returns the new value (starting at 1).
pub async fn next_value(conn: &mut SqliteConnection, scope: &str) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO bill_sequences (scope, last_value) VALUES (?1, 1)
        ON CONFLICT(scope) DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(scope)
    .fetch_one(&mut *conn)
    .await?;

    debug!(scope = %scope, value, "Advanced bill sequence");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_sequences_are_per_scope() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let seq = db.sequences();

        assert_eq!(seq.current("INV-20260131").await.unwrap(), 0);
        assert_eq!(seq.next_value("INV-20260131").await.unwrap(), 1);
        assert_eq!(seq.next_value("INV-20260131").await.unwrap(), 2);
        assert_eq!(seq.next_value("INV-20260201").await.unwrap(), 1);
        assert_eq!(seq.current("INV-20260131").await.unwrap(), 2);
    }
}
