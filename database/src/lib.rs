use async_trait::async_trait;
use chrono::{DateTime, Utc};
use replybot_core::{CoreError, DatabaseError, Interaction, InteractionLog, NewInteraction};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};


/// SQLite-backed interaction log.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct InteractionRow {
    id: i64,
    post_id: String,
    title: String,
    content: String,
    response: String,
    created_at: i64,
}

impl From<InteractionRow> for Interaction {
    fn from(row: InteractionRow) -> Self {
        Self {
            sequence_id: row.id,
            post_id: row.post_id,
            title: row.title,
            content: row.content,
            response: row.response,
            created_at: DateTime::from_timestamp(row.created_at, 0).unwrap_or_default(),
        }
    }
}

impl Database {
    /// Opens (creating if needed) the database at `connection_string`.
    pub async fn connect(connection_string: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(connection_string)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true);

        // Every in-memory connection is its own database.
        let max_connections = if connection_string.contains(":memory:") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to database at {}", connection_string);
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl InteractionLog for Database {
    async fn exists(&self, post_id: &str) -> Result<bool, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::Sql)?;

        Ok(count > 0)
    }

    async fn append(&self, interaction: NewInteraction) -> Result<Interaction, CoreError> {
        if interaction.response.trim().is_empty() {
            return Err(CoreError::InvalidInput {
                message: format!("empty response for post {}", interaction.post_id),
            });
        }

        // Check and insert in one statement.
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO interactions (post_id, title, content, response, created_at) \
             SELECT ?, ?, ?, ?, ? \
             WHERE NOT EXISTS (SELECT 1 FROM interactions WHERE post_id = ?)",
        )
        .bind(&interaction.post_id)
        .bind(&interaction.title)
        .bind(&interaction.content)
        .bind(&interaction.response)
        .bind(created_at.timestamp())
        .bind(&interaction.post_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::DuplicateKey {
                post_id: interaction.post_id,
            }
            .into());
        }

        let sequence_id = result.last_insert_rowid();
        debug!(
            "Recorded interaction {} for post {}",
            sequence_id, interaction.post_id
        );

        Ok(Interaction {
            sequence_id,
            post_id: interaction.post_id,
            title: interaction.title,
            content: interaction.content,
            response: interaction.response,
            created_at: DateTime::from_timestamp(created_at.timestamp(), 0).unwrap_or(created_at),
        })
    }

    async fn list_all(&self) -> Result<Vec<Interaction>, CoreError> {
        let rows: Vec<InteractionRow> = sqlx::query_as(
            "SELECT id, post_id, title, content, response, created_at \
             FROM interactions ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        Ok(rows.into_iter().map(Interaction::from).collect())
    }
}
