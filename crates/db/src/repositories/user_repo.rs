//! Repository for the `users` table.
//!
//! Accounts are managed elsewhere; this service only checks that the
//! caller it was handed exists and can create accounts for tests.

use loadplan_core::types::DbId;
use sqlx::PgPool;

pub struct UserRepo;

impl UserRepo {
    /// Whether a user with this id exists.
    pub async fn exists(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    /// Insert a user, returning its id.
    pub async fn create(pool: &PgPool, username: &str) -> Result<DbId, sqlx::Error> {
        let row: (DbId,) = sqlx::query_as("INSERT INTO users (username) VALUES ($1) RETURNING id")
            .bind(username)
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }
}
