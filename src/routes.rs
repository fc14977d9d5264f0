// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{exams, knowledge_points, question_bank},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, staff_middleware},
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// Every route requires a bearer token. Authoring routes additionally
/// require a teacher or admin, and deleting a knowledge point requires an admin.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let staff = || middleware::from_fn(staff_middleware);

    let exam_routes = Router::new()
        .route(
            "/",
            get(exams::list_exams).merge(post(exams::create_exam).route_layer(staff())),
        )
        .route("/my-attempts", get(exams::my_attempts))
        .route("/submit-answer", post(exams::submit_answer))
        .route("/{id}", get(exams::get_exam))
        .route("/{id}/start", post(exams::start_exam))
        .route(
            "/{id}/status",
            put(exams::change_exam_status).route_layer(staff()),
        )
        .route("/attempts/{id}", get(exams::attempt_detail))
        .route("/attempts/{id}/paper", get(exams::attempt_paper))
        .route("/attempts/{id}/submit", post(exams::submit_exam))
        .route(
            "/answers/{id}/grade",
            post(exams::grade_answer).route_layer(staff()),
        );

    let knowledge_routes = Router::new()
        .route(
            "/",
            get(knowledge_points::list_knowledge_points)
                .merge(post(knowledge_points::create_knowledge_point).route_layer(staff())),
        )
        .route("/roots", get(knowledge_points::list_roots))
        .route(
            "/{id}",
            get(knowledge_points::get_knowledge_point)
                .merge(put(knowledge_points::update_knowledge_point).route_layer(staff()))
                .merge(
                    delete(knowledge_points::delete_knowledge_point)
                        .route_layer(middleware::from_fn(admin_middleware)),
                ),
        )
        .route("/{id}/children", get(knowledge_points::list_children))
        .route("/{id}/tree", get(knowledge_points::get_tree))
        .route(
            "/{id}/questions/{question_id}",
            post(knowledge_points::link_question)
                .delete(knowledge_points::unlink_question)
                .route_layer(staff()),
        );

    // Questions and papers carry answer keys, so even reads are staff only.
    let bank_routes = Router::new()
        .route(
            "/questions",
            get(question_bank::search_questions).post(question_bank::create_question),
        )
        .route(
            "/questions/{id}",
            get(question_bank::get_question)
                .put(question_bank::update_question)
                .delete(question_bank::delete_question),
        )
        .route(
            "/questions/by-knowledge-point/{id}",
            get(question_bank::questions_by_knowledge_point),
        )
        .route(
            "/papers",
            get(question_bank::list_papers).post(question_bank::create_paper),
        )
        .route(
            "/papers/{id}",
            get(question_bank::get_paper)
                .put(question_bank::update_paper)
                .delete(question_bank::delete_paper),
        )
        .route_layer(staff());

    let api = Router::new()
        .nest("/exams", exam_routes)
        .nest("/knowledge-points", knowledge_routes)
        .merge(bank_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", api)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
