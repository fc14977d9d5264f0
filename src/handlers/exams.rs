// src/handlers/exams.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        exam::{ChangeExamStatusRequest, CreateExamRequest},
        exam_attempt::{GradeAnswerRequest, SubmitAnswerRequest},
        shared::ApiResponse,
        user::Caller,
    },
    services::ExamAttemptEngine,
};

/// Create a draft exam over an existing paper.
/// Requires: Teacher or Admin.
pub async fn create_exam(
    State(engine): State<ExamAttemptEngine>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exam = engine.create_exam(payload, &caller).await?;
    Ok(ApiResponse::ok(exam, "Exam created").with_status(StatusCode::CREATED))
}

pub async fn list_exams(
    State(engine): State<ExamAttemptEngine>,
) -> Result<impl IntoResponse, AppError> {
    let exams = engine.list_exams().await?;
    Ok(ApiResponse::ok(exams, "OK"))
}

pub async fn get_exam(
    State(engine): State<ExamAttemptEngine>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let exam = engine.get_exam(id).await?;
    Ok(ApiResponse::ok(exam, "OK"))
}

/// Move an exam through its lifecycle.
/// Requires: Teacher or Admin.
pub async fn change_exam_status(
    State(engine): State<ExamAttemptEngine>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangeExamStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exam = engine.change_exam_status(id, payload.status, &caller).await?;
    Ok(ApiResponse::ok(exam, "Exam status updated"))
}

/// Start an exam, or resume the caller's unfinished attempt.
pub async fn start_exam(
    State(engine): State<ExamAttemptEngine>,
    Extension(caller): Extension<Caller>,
    Path(exam_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = engine.start_attempt(exam_id, caller.user_id).await?;
    let message = outcome.message();
    Ok(ApiResponse::ok(outcome.attempt, message))
}

/// Save the answer to one question (last write wins).
pub async fn submit_answer(
    State(engine): State<ExamAttemptEngine>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    engine.submit_answer(&payload, caller.user_id).await?;
    Ok(ApiResponse::ok(true, "Answer saved"))
}

/// Final submit: auto-grades objective answers.
pub async fn submit_exam(
    State(engine): State<ExamAttemptEngine>,
    Extension(caller): Extension<Caller>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = engine.submit_exam(attempt_id, caller.user_id).await?;
    let message = outcome.message();
    Ok(ApiResponse::ok(outcome.attempt, message))
}

pub async fn my_attempts(
    State(engine): State<ExamAttemptEngine>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = engine.user_attempts(caller.user_id).await?;
    Ok(ApiResponse::ok(attempts, "OK"))
}

pub async fn attempt_detail(
    State(engine): State<ExamAttemptEngine>,
    Extension(caller): Extension<Caller>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let detail = engine.attempt_detail(attempt_id, &caller).await?;
    Ok(ApiResponse::ok(detail, "OK"))
}

/// Questions of the attempt without answer keys.
pub async fn attempt_paper(
    State(engine): State<ExamAttemptEngine>,
    Extension(caller): Extension<Caller>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let paper = engine.attempt_paper(attempt_id, &caller).await?;
    Ok(ApiResponse::ok(paper, "OK"))
}

/// Manually grade one answer.
/// Requires: Teacher or Admin.
pub async fn grade_answer(
    State(engine): State<ExamAttemptEngine>,
    Extension(caller): Extension<Caller>,
    Path(answer_id): Path<Uuid>,
    Json(payload): Json<GradeAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = engine.grade_answer(answer_id, &payload, &caller).await?;
    Ok(ApiResponse::ok(attempt, "Answer graded"))
}
