use std::sync::Arc;
use tracing::{error, info};

use crate::db::{Question, QuestionStatus, QuestionStore, Reply};
use crate::error::{AppError, DatabaseError};
use crate::websocket::{BroadcastDispatcher, Event};

/// Question mutations with their live-update side effect.
///
/// Each mutation commits first, then broadcasts exactly one event built
/// from the committed state, then returns. Nothing is broadcast when the
/// commit fails.
pub struct QuestionService {
    store: Arc<dyn QuestionStore>,
    dispatcher: Arc<BroadcastDispatcher>,
}

impl QuestionService {
    pub fn new(store: Arc<dyn QuestionStore>, dispatcher: Arc<BroadcastDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Question>, AppError> {
        Ok(self.store.list_questions(skip.max(0), limit.max(0)).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Question, AppError> {
        self.store
            .get_question(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Question".into()))
    }

    pub async fn create(&self, content: &str) -> Result<Question, AppError> {
        let content = require_content(content)?;
        let question = self.store.create_question(content).await?;
        info!("Question {} created", question.id);

        self.publish(Event::NewQuestion(question.clone())).await?;
        Ok(question)
    }

    pub async fn add_reply(&self, question_id: i64, content: &str) -> Result<Reply, AppError> {
        let content = require_content(content)?;
        let (reply, question) = self
            .store
            .add_reply(question_id, content)
            .await
            .map_err(not_found)?;
        info!("Reply {} added to question {} ({} replies)", reply.id, question_id, question.replies.len());

        self.publish(Event::UpdateQuestion(question)).await?;
        Ok(reply)
    }

    pub async fn answer(&self, id: i64) -> Result<Question, AppError> {
        self.change_status(id, QuestionStatus::Answered).await
    }

    pub async fn escalate(&self, id: i64) -> Result<Question, AppError> {
        self.change_status(id, QuestionStatus::Escalated).await
    }

    pub async fn upvote(&self, id: i64) -> Result<Question, AppError> {
        let question = self.store.increment_votes(id).await.map_err(not_found)?;
        self.publish(Event::UpdateQuestion(question.clone())).await?;
        Ok(question)
    }

    async fn change_status(&self, id: i64, status: QuestionStatus) -> Result<Question, AppError> {
        let question = self.store.set_status(id, status).await.map_err(not_found)?;
        info!("Question {} marked {}", id, status);

        self.publish(Event::UpdateQuestion(question.clone())).await?;
        Ok(question)
    }

    /// Encoding failure happens before any send and fails the operation;
    /// delivery failures never do.
    async fn publish(&self, event: Event) -> Result<(), AppError> {
        match self.dispatcher.broadcast(&event).await {
            Ok(report) => {
                info!(
                    "Broadcast {}: {}/{} delivered, {} pruned",
                    event.kind(),
                    report.delivered,
                    report.attempted,
                    report.pruned.len()
                );
                Ok(())
            }
            Err(e) => {
                error!("Could not encode {} event: {}", event.kind(), e);
                Err(e.into())
            }
        }
    }
}

fn require_content(content: &str) -> Result<&str, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::ValidationError("content must not be empty".into()));
    }
    Ok(content)
}

fn not_found(err: DatabaseError) -> AppError {
    match err {
        DatabaseError::NotFound => AppError::NotFound("Question".into()),
        other => other.into(),
    }
}
