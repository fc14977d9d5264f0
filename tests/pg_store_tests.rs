// tests/pg_store_tests.rs
//
// Runs against a real Postgres when DATABASE_URL is set; otherwise every
// test returns early.

use std::sync::Arc;

use chrono::Utc;
use question_bank::{
    error::AppError,
    models::{
        exam::{AnswerDisplayMode, Exam, ExamStatus},
        exam_attempt::{Answer, ExamAttempt},
        knowledge_point::KnowledgePointRequest,
        paper::{CreatePaperRequest, PaperEntryRequest},
        question::{CreateQuestionRequest, QuestionQuery, QuestionType},
        user::{Caller, Role},
    },
    repositories::{ExamStore, PgStore},
    services::{
        ExamAttemptEngine, KnowledgeTreeManager, QuestionBank, SystemClock, grading::GradingOutcome,
    },
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn store() -> Option<PgStore> {
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(PgStore::new(pool))
}

fn teacher() -> Caller {
    Caller::new(Uuid::new_v4(), Role::Teacher)
}

async fn seeded_exam(store: &PgStore) -> Exam {
    let store = Arc::new(store.clone());
    let bank = QuestionBank::new(store.clone(), store.clone(), Arc::new(SystemClock));
    let author = teacher();

    let question = bank
        .create_question(
            CreateQuestionRequest {
                question_type: QuestionType::SingleChoice,
                content: "Pick A".into(),
                options: vec!["A".into(), "B".into()],
                correct_answer: "A".into(),
                explanation: None,
                score: 1,
                knowledge_point_ids: vec![],
            },
            &author,
        )
        .await
        .unwrap();

    let paper = bank
        .create_paper(
            CreatePaperRequest {
                title: "Pg paper".into(),
                description: None,
                duration: 30,
                questions: vec![PaperEntryRequest {
                    question_id: question.id,
                    question_order: 1,
                    score: 5,
                }],
            },
            &author,
        )
        .await
        .unwrap();

    let now = Utc::now();
    let exam = Exam {
        id: Uuid::new_v4(),
        title: "Pg exam".into(),
        description: None,
        paper_id: paper.paper.id,
        creator_id: author.user_id,
        status: ExamStatus::Published,
        start_time: None,
        end_time: None,
        duration: 30,
        max_attempts: 2,
        answer_display_mode: AnswerDisplayMode::AfterSubmit,
        allow_pause: false,
        shuffle_questions: false,
        shuffle_options: false,
        require_full_screen: false,
        disable_copy_paste: true,
        created_at: now,
        updated_at: now,
    };
    store.insert_exam(&exam).await.unwrap();
    exam
}

#[tokio::test]
async fn attempt_lifecycle_round_trips_through_postgres() {
    let Some(store) = store().await else { return };
    let exam = seeded_exam(&store).await;
    let engine = ExamAttemptEngine::new(Arc::new(store.clone()), Arc::new(SystemClock));
    let user = Uuid::new_v4();

    let started = engine.start_attempt(exam.id, user).await.unwrap();
    let resumed = engine.start_attempt(exam.id, user).await.unwrap();
    assert_eq!(started.attempt.attempt.id, resumed.attempt.attempt.id);

    let answers = store.answers_for_attempt(started.attempt.attempt.id).await.unwrap();
    assert_eq!(answers.len(), 1);

    let outcome = engine.submit_exam(started.attempt.attempt.id, user).await.unwrap();
    assert!(outcome.attempt.attempt.is_graded);
    assert_eq!(outcome.attempt.attempt.total_score, Some(0));
    assert_eq!(outcome.attempt.exam_title, "Pg exam");

    let resubmit = store
        .submit_and_grade(started.attempt.attempt.id, Utc::now(), &|_: &[Answer]| {
            GradingOutcome::default()
        })
        .await
        .unwrap();
    assert!(resubmit.is_none());
}

#[tokio::test]
async fn second_open_attempt_is_a_conflict() {
    let Some(store) = store().await else { return };
    let exam = seeded_exam(&store).await;
    let user = Uuid::new_v4();
    let now = Utc::now();

    let attempt = |number| ExamAttempt {
        id: Uuid::new_v4(),
        exam_id: exam.id,
        user_id: user,
        attempt_number: number,
        start_time: now,
        submit_time: None,
        total_score: None,
        is_submitted: false,
        is_graded: false,
        created_at: now,
        updated_at: now,
    };

    // An answer row for an unknown question fails the whole insert.
    let first = attempt(1);
    store
        .create_attempt(&first, &[Answer::empty(first.id, Uuid::new_v4(), now)])
        .await
        .unwrap_err();

    // Nothing was left behind, so the same attempt can now be stored.
    store.create_attempt(&first, &[]).await.unwrap();
    let err = store.create_attempt(&attempt(2), &[]).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn soft_deleted_knowledge_points_disappear() {
    let Some(store) = store().await else { return };
    let tree = KnowledgeTreeManager::new(Arc::new(store), Arc::new(SystemClock));
    let admin = Caller::new(Uuid::new_v4(), Role::Admin);

    let root = tree
        .create(
            KnowledgePointRequest {
                name: format!("root-{}", Uuid::new_v4()),
                description: None,
                parent_id: None,
            },
            &admin,
        )
        .await
        .unwrap();

    tree.delete(root.id, &admin).await.unwrap();
    assert!(matches!(tree.get_by_id(root.id).await, Err(AppError::NotFound(_))));
    assert!(tree.get_all().await.unwrap().iter().all(|n| n.id != root.id));
}

#[tokio::test]
async fn papers_and_questions_in_use_stay_put() {
    let Some(store) = store().await else { return };
    let exam = seeded_exam(&store).await;
    let shared = Arc::new(store.clone());
    let bank = QuestionBank::new(shared.clone(), shared, Arc::new(SystemClock));
    let author = teacher();

    let err = bank.delete_paper(exam.paper_id, &author).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let paper = bank.get_paper(exam.paper_id).await.unwrap();
    let question_id = paper.questions[0].question_id;
    let err = bank.delete_question(question_id, &author).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let found = bank
        .search_questions(QuestionQuery {
            keyword: Some("pick".into()),
            question_type: Some(QuestionType::SingleChoice),
            ..QuestionQuery::default()
        })
        .await
        .unwrap();
    assert!(found.items.iter().any(|q| q.id == question_id));
}
