use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::db::models::{Question, QuestionStatus, Reply, User};
use crate::db::store::{QuestionStore, UserStore};
use crate::error::DatabaseError;

#[derive(Debug, Default)]
struct Tables {
    questions: BTreeMap<i64, Question>,
    users: BTreeMap<i64, User>,
    next_question_id: i64,
    next_reply_id: i64,
    next_user_id: i64,
}

/// In-process store with the same commit semantics as Postgres: each call
/// is applied atomically under one write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn list_questions(&self, skip: i64, limit: i64) -> Result<Vec<Question>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut questions: Vec<Question> = tables.questions.values().cloned().collect();
        questions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(questions
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>, DatabaseError> {
        Ok(self.tables.read().await.questions.get(&id).cloned())
    }

    async fn create_question(&self, content: &str) -> Result<Question, DatabaseError> {
        let mut tables = self.tables.write().await;
        tables.next_question_id += 1;

        let question = Question {
            id: tables.next_question_id,
            content: content.to_string(),
            status: QuestionStatus::default(),
            created_at: Utc::now(),
            votes: 0,
            replies: Vec::new(),
        };
        tables.questions.insert(question.id, question.clone());
        Ok(question)
    }

    async fn add_reply(&self, question_id: i64, content: &str) -> Result<(Reply, Question), DatabaseError> {
        let mut tables = self.tables.write().await;
        if !tables.questions.contains_key(&question_id) {
            return Err(DatabaseError::NotFound);
        }

        tables.next_reply_id += 1;
        let reply = Reply {
            id: tables.next_reply_id,
            question_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        let question = tables.questions.get_mut(&question_id).ok_or(DatabaseError::NotFound)?;
        question.replies.push(reply.clone());
        Ok((reply, question.clone()))
    }

    async fn set_status(&self, id: i64, status: QuestionStatus) -> Result<Question, DatabaseError> {
        let mut tables = self.tables.write().await;
        let question = tables.questions.get_mut(&id).ok_or(DatabaseError::NotFound)?;
        question.status = status;
        Ok(question.clone())
    }

    async fn increment_votes(&self, id: i64) -> Result<Question, DatabaseError> {
        let mut tables = self.tables.write().await;
        let question = tables.questions.get_mut(&id).ok_or(DatabaseError::NotFound)?;
        question.votes += 1;
        Ok(question.clone())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == username) {
            return Err(DatabaseError::Duplicate(format!("username '{}' already exists", username)));
        }

        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_admin: tables.users.is_empty(),
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }
}
