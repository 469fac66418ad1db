use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::{AdminUser, AuthenticatedUser};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    pub content: String,
}

pub async fn list_questions(
    params: web::Query<ListParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let questions = state.questions.list(params.skip, params.limit).await?;
    Ok(HttpResponse::Ok().json(questions))
}

pub async fn create_question(
    req: web::Json<ContentRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let question = state.questions.create(&req.content).await?;
    Ok(HttpResponse::Ok().json(question))
}

pub async fn create_reply(
    path: web::Path<i64>,
    req: web::Json<ContentRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let reply = state.questions.add_reply(path.into_inner(), &req.content).await?;
    Ok(HttpResponse::Ok().json(reply))
}

pub async fn answer_question(
    path: web::Path<i64>,
    AdminUser(admin): AdminUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    info!("Admin {} answering question {}", admin.username, id);
    state.questions.answer(id).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "ok" })))
}

pub async fn escalate_question(
    path: web::Path<i64>,
    AdminUser(admin): AdminUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    info!("Admin {} escalating question {}", admin.username, id);
    state.questions.escalate(id).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "ok" })))
}

pub async fn upvote_question(
    path: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let question = state.questions.upvote(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "votes": question.votes })))
}

pub async fn suggest_answer(
    path: web::Path<i64>,
    _user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let question = state.questions.get(path.into_inner()).await?;
    let suggestion = state.suggestions.suggest(&question.content).await;
    Ok(HttpResponse::Ok().json(json!({ "suggestion": suggestion })))
}
