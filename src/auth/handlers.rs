use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use crate::AppState;
use crate::error::AppError;
use tracing::{info, error};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

/// Form-encoded, as sent by OAuth2 password-flow clients.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    fn bearer(access_token: String) -> Self {
        Self { access_token, token_type: "bearer" }
    }
}

pub async fn signup(
    req: web::Json<SignupRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received signup request for username: {}", req.username);
    match state.auth_service.signup(&req.username, &req.password).await {
        Ok(token) => {
            info!("Signup successful for username: {}", req.username);
            Ok(HttpResponse::Ok().json(TokenResponse::bearer(token)))
        }
        Err(e) => {
            error!("Signup failed for username: {}: {}", req.username, e);
            Err(e)
        }
    }
}

pub async fn login(
    req: web::Form<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for username: {}", req.username);
    match state.auth_service.login(&req.username, &req.password).await {
        Ok(token) => {
            info!("Login successful for username: {}", req.username);
            Ok(HttpResponse::Ok().json(TokenResponse::bearer(token)))
        }
        Err(e) => {
            error!("Login failed for username: {}: {}", req.username, e);
            Err(e)
        }
    }
}
