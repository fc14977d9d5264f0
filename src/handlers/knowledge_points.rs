// src/handlers/knowledge_points.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{knowledge_point::KnowledgePointRequest, shared::ApiResponse, user::Caller},
    services::KnowledgeTreeManager,
};

/// All knowledge points, flat, ordered by level then sort order.
pub async fn list_knowledge_points(
    State(tree): State<KnowledgeTreeManager>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ApiResponse::ok(tree.get_all().await?, "OK"))
}

pub async fn list_roots(
    State(tree): State<KnowledgeTreeManager>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ApiResponse::ok(tree.roots().await?, "OK"))
}

pub async fn get_knowledge_point(
    State(tree): State<KnowledgeTreeManager>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ApiResponse::ok(tree.get_by_id(id).await?, "OK"))
}

pub async fn list_children(
    State(tree): State<KnowledgeTreeManager>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ApiResponse::ok(tree.children(id).await?, "OK"))
}

pub async fn get_tree(
    State(tree): State<KnowledgeTreeManager>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ApiResponse::ok(tree.tree(id).await?, "OK"))
}

/// Requires: Teacher or Admin.
pub async fn create_knowledge_point(
    State(tree): State<KnowledgeTreeManager>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<KnowledgePointRequest>,
) -> Result<impl IntoResponse, AppError> {
    let node = tree.create(payload, &caller).await?;
    Ok(ApiResponse::ok(node, "Knowledge point created").with_status(StatusCode::CREATED))
}

/// Rename and/or move a node.
/// Requires: Teacher or Admin.
pub async fn update_knowledge_point(
    State(tree): State<KnowledgeTreeManager>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<KnowledgePointRequest>,
) -> Result<impl IntoResponse, AppError> {
    let node = tree.update(id, payload, &caller).await?;
    Ok(ApiResponse::ok(node, "Knowledge point updated"))
}

/// Requires: Admin.
pub async fn delete_knowledge_point(
    State(tree): State<KnowledgeTreeManager>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    tree.delete(id, &caller).await?;
    Ok(ApiResponse::ok(true, "Knowledge point deleted"))
}

pub async fn link_question(
    State(tree): State<KnowledgeTreeManager>,
    Extension(caller): Extension<Caller>,
    Path((id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    tree.link_question(id, question_id, &caller).await?;
    Ok(ApiResponse::ok(true, "Question linked"))
}

pub async fn unlink_question(
    State(tree): State<KnowledgeTreeManager>,
    Extension(caller): Extension<Caller>,
    Path((id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    tree.unlink_question(id, question_id, &caller).await?;
    Ok(ApiResponse::ok(true, "Question unlinked"))
}
