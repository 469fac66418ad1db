//! Question board operations.
//!
//! Every mutation here is an event source for the websocket fan-out.

pub mod handlers;
mod service;

pub use service::QuestionService;
