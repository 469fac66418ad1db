//! Authentication module for the Q&A board
//!
//! Signup and login issuing JWT bearer tokens, plus request extractors
//! that gate the admin-only question transitions.

pub mod handlers;
mod extractor;
mod service;

pub use extractor::{AdminUser, AuthenticatedUser};
pub use service::{hash_password, verify_password, AuthService, Claims};
