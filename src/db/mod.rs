//! Database module for the Q&A board
//!
//! Persistence for users, questions and replies behind the `QuestionStore`
//! and `UserStore` traits, with a Postgres and an in-memory implementation.

pub mod memory;
pub mod models;
pub mod operations;
pub mod store;

pub use memory::MemoryStore;
pub use models::{Question, QuestionStatus, Reply, User};
pub use operations::DbOperations;
pub use store::{QuestionStore, UserStore};
