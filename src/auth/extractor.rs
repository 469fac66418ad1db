use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;

use crate::db::User;
use crate::error::{AppError, AuthError};
use crate::AppState;

/// Any caller with a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// A caller with a valid bearer token whose account is an admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

fn bearer_token(req: &HttpRequest) -> Result<String, AppError> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or_else(|| AuthError::MissingToken.into())
}

async fn authenticate(req: HttpRequest) -> Result<User, AppError> {
    let token = bearer_token(&req)?;
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::InternalError("application state missing".into()))?;
    state.auth_service.validate_token(&token).await
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { authenticate(req).await.map(AuthenticatedUser) })
    }
}

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let user = authenticate(req).await?;
            if !user.is_admin {
                return Err(AuthError::Forbidden.into());
            }
            Ok(AdminUser(user))
        })
    }
}
