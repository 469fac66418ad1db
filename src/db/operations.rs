use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::db::models::{Question, QuestionRow, QuestionStatus, Reply, User};
use crate::db::store::{QuestionStore, UserStore};
use crate::error::{AppError, DatabaseError};

const QUESTION_COLUMNS: &str = "id, content, status, created_at, votes";
const REPLY_COLUMNS: &str = "id, question_id, content, created_at";
const USER_COLUMNS: &str = "id, username, password_hash, is_admin, created_at";

/// Postgres-backed store.
pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>, DatabaseError> {
        Ok(self.pool.as_ref().begin().await?)
    }

    async fn load_question(&self, row: QuestionRow) -> Result<Question, DatabaseError> {
        let replies = sqlx::query_as::<_, Reply>(&format!(
            "SELECT {} FROM replies WHERE question_id = $1 ORDER BY id ASC",
            REPLY_COLUMNS
        ))
        .bind(row.id)
        .fetch_all(self.pool.as_ref())
        .await?;

        row.into_question(replies)
    }

    async fn load_required(&self, row: Option<QuestionRow>) -> Result<Question, DatabaseError> {
        match row {
            Some(row) => self.load_question(row).await,
            None => Err(DatabaseError::NotFound),
        }
    }
}

#[async_trait]
impl QuestionStore for DbOperations {
    async fn list_questions(&self, skip: i64, limit: i64) -> Result<Vec<Question>, DatabaseError> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {} FROM questions ORDER BY created_at DESC, id DESC OFFSET $1 LIMIT $2",
            QUESTION_COLUMNS
        ))
        .bind(skip)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let replies = sqlx::query_as::<_, Reply>(&format!(
            "SELECT {} FROM replies WHERE question_id = ANY($1) ORDER BY id ASC",
            REPLY_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.into_iter()
            .map(|row| {
                let own = replies.iter().filter(|r| r.question_id == row.id).cloned().collect();
                row.into_question(own)
            })
            .collect()
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>, DatabaseError> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {} FROM questions WHERE id = $1",
            QUESTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_question(row).await?)),
            None => Ok(None),
        }
    }

    async fn create_question(&self, content: &str) -> Result<Question, DatabaseError> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "INSERT INTO questions (content) VALUES ($1) RETURNING {}",
            QUESTION_COLUMNS
        ))
        .bind(content)
        .fetch_one(self.pool.as_ref())
        .await?;

        row.into_question(Vec::new())
    }

    async fn add_reply(&self, question_id: i64, content: &str) -> Result<(Reply, Question), DatabaseError> {
        let mut transaction = self.begin_transaction().await?;

        // Row lock holds off concurrent replies until this one is committed.
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {} FROM questions WHERE id = $1 FOR UPDATE",
            QUESTION_COLUMNS
        ))
        .bind(question_id)
        .fetch_optional(&mut *transaction)
        .await?;

        let row = match row {
            Some(row) => row,
            None => {
                transaction.rollback().await?;
                return Err(DatabaseError::NotFound);
            }
        };

        let reply = sqlx::query_as::<_, Reply>(&format!(
            "INSERT INTO replies (question_id, content) VALUES ($1, $2) RETURNING {}",
            REPLY_COLUMNS
        ))
        .bind(question_id)
        .bind(content)
        .fetch_one(&mut *transaction)
        .await?;

        let replies = sqlx::query_as::<_, Reply>(&format!(
            "SELECT {} FROM replies WHERE question_id = $1 ORDER BY id ASC",
            REPLY_COLUMNS
        ))
        .bind(question_id)
        .fetch_all(&mut *transaction)
        .await?;

        let question = row.into_question(replies)?;
        transaction.commit().await?;
        Ok((reply, question))
    }

    async fn set_status(&self, id: i64, status: QuestionStatus) -> Result<Question, DatabaseError> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "UPDATE questions SET status = $1 WHERE id = $2 RETURNING {}",
            QUESTION_COLUMNS
        ))
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        self.load_required(row).await
    }

    async fn increment_votes(&self, id: i64) -> Result<Question, DatabaseError> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "UPDATE questions SET votes = votes + 1 WHERE id = $1 RETURNING {}",
            QUESTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        self.load_required(row).await
    }
}

#[async_trait]
impl UserStore for DbOperations {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, DatabaseError> {
        let mut transaction = self.begin_transaction().await?;

        // Serialises concurrent signups so exactly one of them sees an empty table.
        sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *transaction)
            .await?;

        let result = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, password_hash, is_admin) \
             VALUES ($1, $2, NOT EXISTS (SELECT 1 FROM users)) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(username)
        .bind(password_hash)
        .fetch_one(&mut *transaction)
        .await;

        match result {
            Ok(user) => {
                transaction.commit().await?;
                Ok(user)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e.into())
            }
        }
    }
}
