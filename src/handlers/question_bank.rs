// src/handlers/question_bank.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        paper::CreatePaperRequest,
        question::{CreateQuestionRequest, QuestionQuery},
        shared::ApiResponse,
        user::Caller,
    },
    services::QuestionBank,
};

/// Requires: Teacher or Admin.
pub async fn create_question(
    State(bank): State<QuestionBank>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = bank.create_question(payload, &caller).await?;
    Ok(ApiResponse::ok(question, "Question created").with_status(StatusCode::CREATED))
}

/// `GET /questions?keyword=..&type=..&knowledge_point_id=..&page=..&page_size=..`
pub async fn search_questions(
    State(bank): State<QuestionBank>,
    Query(query): Query<QuestionQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ApiResponse::ok(bank.search_questions(query).await?, "OK"))
}

pub async fn get_question(
    State(bank): State<QuestionBank>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ApiResponse::ok(bank.get_question(id).await?, "OK"))
}

pub async fn questions_by_knowledge_point(
    State(bank): State<QuestionBank>,
    Path(knowledge_point_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let questions = bank.questions_by_knowledge_point(knowledge_point_id).await?;
    Ok(ApiResponse::ok(questions, "OK"))
}

pub async fn update_question(
    State(bank): State<QuestionBank>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = bank.update_question(id, payload, &caller).await?;
    Ok(ApiResponse::ok(question, "Question updated"))
}

pub async fn delete_question(
    State(bank): State<QuestionBank>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    bank.delete_question(id, &caller).await?;
    Ok(ApiResponse::ok(true, "Question deleted"))
}

/// Requires: Teacher or Admin.
pub async fn create_paper(
    State(bank): State<QuestionBank>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CreatePaperRequest>,
) -> Result<impl IntoResponse, AppError> {
    let paper = bank.create_paper(payload, &caller).await?;
    Ok(ApiResponse::ok(paper, "Paper created").with_status(StatusCode::CREATED))
}

pub async fn list_papers(State(bank): State<QuestionBank>) -> Result<impl IntoResponse, AppError> {
    Ok(ApiResponse::ok(bank.list_papers().await?, "OK"))
}

pub async fn get_paper(
    State(bank): State<QuestionBank>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ApiResponse::ok(bank.get_paper(id).await?, "OK"))
}

/// Fails with 409 once an exam uses the paper.
pub async fn update_paper(
    State(bank): State<QuestionBank>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreatePaperRequest>,
) -> Result<impl IntoResponse, AppError> {
    let paper = bank.update_paper(id, payload, &caller).await?;
    Ok(ApiResponse::ok(paper, "Paper updated"))
}

pub async fn delete_paper(
    State(bank): State<QuestionBank>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    bank.delete_paper(id, &caller).await?;
    Ok(ApiResponse::ok(true, "Paper deleted"))
}
