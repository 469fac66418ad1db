use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::DatabaseError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuestionStatus {
    #[default]
    Pending,
    Answered,
    Escalated,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Pending => "Pending",
            QuestionStatus::Answered => "Answered",
            QuestionStatus::Escalated => "Escalated",
        }
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(QuestionStatus::Pending),
            "Answered" => Ok(QuestionStatus::Answered),
            "Escalated" => Ok(QuestionStatus::Escalated),
            other => Err(DatabaseError::Corrupt(format!("unknown question status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Reply {
    pub id: i64,
    pub question_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Post-commit snapshot of a question, replies in insertion order.
/// This is the exact shape pushed to live clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub content: String,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
    pub votes: i32,
    #[serde(default)]
    pub replies: Vec<Reply>,
}

/// Raw `questions` row; status is stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub content: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub votes: i32,
}

impl QuestionRow {
    pub fn into_question(self, replies: Vec<Reply>) -> Result<Question, DatabaseError> {
        Ok(Question {
            id: self.id,
            content: self.content,
            status: self.status.parse()?,
            created_at: self.created_at,
            votes: self.votes,
            replies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [QuestionStatus::Pending, QuestionStatus::Answered, QuestionStatus::Escalated] {
            assert_eq!(status.as_str().parse::<QuestionStatus>().unwrap(), status);
        }
        assert!(matches!("Closed".parse::<QuestionStatus>(), Err(DatabaseError::Corrupt(_))));
    }

    #[test]
    fn test_question_wire_shape() {
        let question = Question {
            id: 1,
            content: "Hi".to_string(),
            status: QuestionStatus::default(),
            created_at: Utc::now(),
            votes: 0,
            replies: vec![],
        };

        let value = serde_json::to_value(&question).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["status"], "Pending");
        assert_eq!(value["votes"], 0);
        assert_eq!(value["replies"], serde_json::json!([]));
        assert!(value["created_at"].is_string());
    }

    #[test]
    fn test_user_hides_password_hash() {
        let user = User {
            id: 1,
            username: "admin".to_string(),
            password_hash: "secret".to_string(),
            is_admin: true,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
    }
}
