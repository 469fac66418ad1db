use async_trait::async_trait;

use crate::db::models::{Question, QuestionStatus, Reply, User};
use crate::error::DatabaseError;

/// Question and reply persistence. Every mutating call returns the
/// committed state, server-assigned fields included.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Newest first.
    async fn list_questions(&self, skip: i64, limit: i64) -> Result<Vec<Question>, DatabaseError>;

    async fn get_question(&self, id: i64) -> Result<Option<Question>, DatabaseError>;

    async fn create_question(&self, content: &str) -> Result<Question, DatabaseError>;

    /// Returns the new reply and its question as committed, all replies
    /// included. Fails with `NotFound` when the question does not exist.
    async fn add_reply(&self, question_id: i64, content: &str) -> Result<(Reply, Question), DatabaseError>;

    async fn set_status(&self, id: i64, status: QuestionStatus) -> Result<Question, DatabaseError>;

    async fn increment_votes(&self, id: i64) -> Result<Question, DatabaseError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError>;

    /// The first user ever stored becomes the admin. A taken username
    /// fails with `Duplicate`.
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, DatabaseError>;
}
