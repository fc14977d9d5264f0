// tests/api_tests.rs

use std::sync::Arc;

use axum::{body::Body, http::Request};
use chrono::{TimeZone, Utc};
use question_bank::{
    config::Config,
    models::user::Role,
    routes,
    services::FixedClock,
    state::AppState,
    utils::jwt::sign_jwt,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test_secret_for_integration_tests";

fn test_state() -> AppState {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
    ));
    AppState::in_memory(clock, Config::for_tests(SECRET))
}

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    let app = routes::create_router(test_state());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn token(role: Role) -> String {
    let config = Config::for_tests(SECRET);
    sign_jwt(Uuid::new_v4(), role, &config.jwt_secret, config.jwt_expiration)
        .expect("Failed to sign token")
}

struct Api {
    address: String,
    client: reqwest::Client,
}

impl Api {
    async fn new() -> Self {
        Self {
            address: spawn_app().await,
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, method: reqwest::Method, path: &str, token: &str, body: Option<Value>) -> (u16, Value) {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.address, path))
            .bearer_auth(token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.expect("Failed to execute request");
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str, token: &str) -> (u16, Value) {
        self.send(reqwest::Method::GET, path, token, None).await
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::POST, path, token, Some(body)).await
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::PUT, path, token, Some(body)).await
    }

    async fn delete(&self, path: &str, token: &str) -> (u16, Value) {
        self.send(reqwest::Method::DELETE, path, token, None).await
    }
}

#[tokio::test]
async fn unknown_path_is_404() {
    let api = Api::new().await;
    let response = api
        .client
        .get(format!("{}/random_path_that_does_not_exist", api.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn missing_token_is_401_with_envelope() {
    let app = routes::create_router(test_state());
    let response = app
        .oneshot(Request::builder().uri("/api/exams").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn students_cannot_author_content() {
    let api = Api::new().await;
    let (status, body) = api
        .post(
            "/api/questions",
            &token(Role::Student),
            json!({"type": "single_choice", "content": "?", "options": ["A"], "correct_answer": "A"}),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn exam_flow_over_http() {
    let api = Api::new().await;
    let teacher = token(Role::Teacher);
    let student = token(Role::Student);

    // Arrange: two questions and a paper
    let (status, q1) = api
        .post(
            "/api/questions",
            &teacher,
            json!({"type": "single_choice", "content": "Pick A", "options": ["A", "B"], "correct_answer": "A"}),
        )
        .await;
    assert_eq!(status, 201);
    let (_, q2) = api
        .post(
            "/api/questions",
            &teacher,
            json!({"type": "multiple_choice", "content": "Pick A and C", "options": ["A", "B", "C"], "correct_answer": "A,C"}),
        )
        .await;
    let q1 = q1["data"]["id"].as_str().unwrap().to_string();
    let q2 = q2["data"]["id"].as_str().unwrap().to_string();

    let (status, paper) = api
        .post(
            "/api/papers",
            &teacher,
            json!({
                "title": "Quiz",
                "duration": 30,
                "questions": [
                    {"question_id": q1, "question_order": 1, "score": 5},
                    {"question_id": q2, "question_order": 2, "score": 10}
                ]
            }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(paper["data"]["total_score"], 15);
    let paper_id = paper["data"]["id"].as_str().unwrap().to_string();

    let (status, exam) = api
        .post("/api/exams", &teacher, json!({"title": "Quiz exam", "paper_id": paper_id, "duration": 30}))
        .await;
    assert_eq!(status, 201);
    assert_eq!(exam["data"]["status"], "draft");
    let exam_id = exam["data"]["id"].as_str().unwrap().to_string();

    // Draft exams cannot be started
    let (status, _) = api.post(&format!("/api/exams/{}/start", exam_id), &student, json!({})).await;
    assert_eq!(status, 400);

    let (status, _) = api
        .put(&format!("/api/exams/{}/status", exam_id), &teacher, json!({"status": "published"}))
        .await;
    assert_eq!(status, 200);

    // Act: start, answer, submit
    let (status, started) = api.post(&format!("/api/exams/{}/start", exam_id), &student, json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(started["message"], "Exam started");
    let attempt_id = started["data"]["id"].as_str().unwrap().to_string();

    let (status, paper_view) = api.get(&format!("/api/exams/attempts/{}/paper", attempt_id), &student).await;
    assert_eq!(status, 200);
    assert_eq!(paper_view["data"]["questions"].as_array().unwrap().len(), 2);

    for (question_id, answer) in [(&q1, "a"), (&q2, "C,A")] {
        let (status, _) = api
            .post(
                "/api/exams/submit-answer",
                &student,
                json!({"exam_attempt_id": attempt_id, "question_id": question_id, "user_answer": answer}),
            )
            .await;
        assert_eq!(status, 200);
    }

    let (status, submitted) = api
        .post(&format!("/api/exams/attempts/{}/submit", attempt_id), &student, json!({}))
        .await;

    // Assert
    assert_eq!(status, 200);
    assert_eq!(submitted["data"]["is_graded"], true);
    assert_eq!(submitted["data"]["total_score"], 15);
    assert_eq!(submitted["data"]["exam_title"], "Quiz exam");

    let (status, again) = api
        .post(&format!("/api/exams/attempts/{}/submit", attempt_id), &student, json!({}))
        .await;
    assert_eq!(status, 409);
    assert_eq!(again["success"], false);

    let (_, mine) = api.get("/api/exams/my-attempts", &student).await;
    assert_eq!(mine["data"].as_array().unwrap().len(), 1);

    // Someone else's attempt
    let (status, _) = api
        .get(&format!("/api/exams/attempts/{}", attempt_id), &token(Role::Student))
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn knowledge_tree_over_http() {
    let api = Api::new().await;
    let teacher = token(Role::Teacher);
    let admin = token(Role::Admin);

    let (status, root) = api.post("/api/knowledge-points", &teacher, json!({"name": "Math"})).await;
    assert_eq!(status, 201);
    assert_eq!(root["data"]["level"], 1);
    let root_id = root["data"]["id"].as_str().unwrap().to_string();

    let (_, child) = api
        .post("/api/knowledge-points", &teacher, json!({"name": "Algebra", "parent_id": root_id}))
        .await;
    assert_eq!(child["data"]["level"], 2);
    let child_id = child["data"]["id"].as_str().unwrap().to_string();

    // Cycle
    let (status, _) = api
        .put(
            &format!("/api/knowledge-points/{}", root_id),
            &teacher,
            json!({"name": "Math", "parent_id": child_id}),
        )
        .await;
    assert_eq!(status, 400);

    let (_, tree) = api.get(&format!("/api/knowledge-points/{}/tree", root_id), &teacher).await;
    assert_eq!(tree["data"]["children"][0]["name"], "Algebra");

    // Teachers may not delete; admins may, once the node has no children
    let (status, _) = api.delete(&format!("/api/knowledge-points/{}", child_id), &teacher).await;
    assert_eq!(status, 403);

    let (status, _) = api.delete(&format!("/api/knowledge-points/{}", root_id), &admin).await;
    assert_eq!(status, 409);

    let (status, _) = api.delete(&format!("/api/knowledge-points/{}", child_id), &admin).await;
    assert_eq!(status, 200);

    let (status, _) = api.get(&format!("/api/knowledge-points/{}", child_id), &teacher).await;
    assert_eq!(status, 404);

    let (_, roots) = api.get("/api/knowledge-points/roots", &teacher).await;
    assert_eq!(roots["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn question_bank_over_http() {
    let api = Api::new().await;
    let teacher = token(Role::Teacher);
    let student = token(Role::Student);

    let (_, kp) = api.post("/api/knowledge-points", &teacher, json!({"name": "Logic"})).await;
    let kp_id = kp["data"]["id"].as_str().unwrap().to_string();

    let (status, question) = api
        .post(
            "/api/questions",
            &teacher,
            json!({
                "type": "true_false",
                "content": "Every square is a rectangle",
                "options": ["T", "F"],
                "correct_answer": "T",
                "knowledge_point_ids": [kp_id]
            }),
        )
        .await;
    assert_eq!(status, 201);
    let question_id = question["data"]["id"].as_str().unwrap().to_string();

    let (status, found) = api.get("/api/questions?keyword=SQUARE&type=true_false", &teacher).await;
    assert_eq!(status, 200);
    assert_eq!(found["data"]["total_count"], 1);

    let (_, tagged) = api
        .get(&format!("/api/questions/by-knowledge-point/{}", kp_id), &teacher)
        .await;
    assert_eq!(tagged["data"][0]["id"], question_id.as_str());

    // Answer keys are not for students
    let (status, _) = api.get(&format!("/api/questions/{}", question_id), &student).await;
    assert_eq!(status, 403);

    let (status, paper) = api
        .post(
            "/api/papers",
            &teacher,
            json!({
                "title": "Logic quiz",
                "duration": 10,
                "questions": [{"question_id": question_id, "question_order": 1, "score": 4}]
            }),
        )
        .await;
    assert_eq!(status, 201);
    let paper_id = paper["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = api.delete(&format!("/api/questions/{}", question_id), &teacher).await;
    assert_eq!(status, 409);

    let (status, _) = api
        .post("/api/exams", &teacher, json!({"title": "Logic exam", "paper_id": paper_id, "duration": 10}))
        .await;
    assert_eq!(status, 201);

    let (status, body) = api.delete(&format!("/api/papers/{}", paper_id), &teacher).await;
    assert_eq!(status, 409);
    assert_eq!(body["success"], false);

    let (_, papers) = api.get("/api/papers", &teacher).await;
    assert_eq!(papers["data"].as_array().unwrap().len(), 1);
}
