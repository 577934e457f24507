//! Profile roles read straight from Postgres.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{BoxFuture, ProfileStore};

#[derive(Debug, Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_role(&self, user_id: &str) -> Result<Option<String>> {
        // Subjects that are not UUIDs cannot have a row.
        if uuid::Uuid::parse_str(user_id).is_err() {
            return Ok(None);
        }

        let query = "SELECT role FROM profiles WHERE id = $1::uuid LIMIT 1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("Failed to query profile role")?;

        match row {
            Some(row) => row
                .try_get::<Option<String>, _>("role")
                .context("Failed to decode profile role"),
            None => Ok(None),
        }
    }
}

impl ProfileStore for PgProfileStore {
    fn role_for<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(self.fetch_role(user_id))
    }
}
