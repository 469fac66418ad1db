pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod questions;
pub mod suggestion;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;
use actix_web::{web, HttpResponse};
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::Settings;

pub use auth::AuthService;
pub use db::{DbOperations, MemoryStore, Question, QuestionStore, Reply, User, UserStore};
pub use questions::QuestionService;
pub use suggestion::SuggestionService;
pub use websocket::{BroadcastDispatcher, ConnectionRegistry, Event};

use crate::config::StoreBackend;

/// Health check endpoint handler
/// Returns a JSON response with server status, timestamp and live connection count
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": state.registry.connection_count().await,
    }))
}

pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "message": "System Operational" }))
}

/// Mounts the full HTTP and websocket surface.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    use auth::handlers::{login, signup};
    use questions::handlers::*;

    cfg.route("/", web::get().to(root))
        .route("/health", web::get().to(health_check))
        .service(
            web::scope("/api/v1")
                .service(
                    web::scope("/auth")
                        .route("/signup", web::post().to(signup))
                        .route("/login", web::post().to(login)),
                )
                .service(
                    web::scope("/questions")
                        .route("/ws", web::get().to(websocket::websocket_route))
                        .route("", web::get().to(list_questions))
                        .route("/", web::get().to(list_questions))
                        .route("", web::post().to(create_question))
                        .route("/", web::post().to(create_question))
                        .route("/{question_id}/reply", web::post().to(create_reply))
                        .route("/{question_id}/answer", web::put().to(answer_question))
                        .route("/{question_id}/escalate", web::put().to(escalate_question))
                        .route("/{question_id}/upvote", web::post().to(upvote_question))
                        .route("/{question_id}/suggest", web::get().to(suggest_answer)),
                ),
        );
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<BroadcastDispatcher>,
    pub questions: Arc<QuestionService>,
    pub auth_service: Arc<AuthService>,
    pub suggestions: Arc<SuggestionService>,
    db: Option<Arc<DbOperations>>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        match config.database.backend {
            StoreBackend::Postgres => {
                let db = Arc::new(
                    DbOperations::new_with_options(
                        &config.database.url,
                        config.database.max_connections,
                        Duration::from_secs(5),
                    )
                    .await?,
                );
                db.migrate().await?;
                info!("Using Postgres store");

                let mut state = Self::with_stores(config, db.clone(), db.clone());
                state.db = Some(db);
                Ok(state)
            }
            StoreBackend::Memory => {
                info!("Using in-memory store");
                let store = Arc::new(MemoryStore::new());
                Ok(Self::with_stores(config, store.clone(), store))
            }
        }
    }

    pub fn with_stores(
        config: Settings,
        question_store: Arc<dyn QuestionStore>,
        user_store: Arc<dyn UserStore>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            registry.clone(),
            config.realtime.send_timeout(),
        ));

        Self {
            questions: Arc::new(QuestionService::new(question_store, dispatcher.clone())),
            auth_service: Arc::new(AuthService::new(
                user_store,
                config.auth.jwt_secret.clone(),
                config.auth.token_expiry_minutes,
            )),
            suggestions: Arc::new(SuggestionService::new(&config.suggestion)),
            config: Arc::new(config),
            registry,
            dispatcher,
            db: None,
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(db) = &self.db {
            db.close().await;
        }
        Ok(())
    }
}
