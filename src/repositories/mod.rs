// src/repositories/mod.rs

//! Persistence interfaces consumed by the services.
//!
//! Every read returns a fully populated value; nothing is lazily loaded.
//! Soft-deleted rows are invisible to every read in both implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        exam::{Exam, ExamStatus},
        exam_attempt::{Answer, AnswerGrade, AttemptSummary, ExamAttempt},
        knowledge_point::KnowledgePoint,
        paper::{Paper, PaperWithQuestions},
        question::{Question, QuestionQuery},
    },
    services::grading::GradingOutcome,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Papers, questions, exams, attempts and answers.
#[async_trait]
pub trait ExamStore: Send + Sync {
    /// Inserts a question and its knowledge point links.
    async fn insert_question(
        &self,
        question: &Question,
        knowledge_point_ids: &[Uuid],
    ) -> Result<(), AppError>;

    async fn find_question(&self, id: Uuid) -> Result<Option<Question>, AppError>;

    /// Ids of the knowledge points a question is linked to.
    async fn question_knowledge_point_ids(&self, question_id: Uuid) -> Result<Vec<Uuid>, AppError>;

    /// Questions for the given ids; missing ids are simply absent.
    async fn questions_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Question>, AppError>;

    /// One page of matching questions, newest first, and the number of matches.
    async fn search_questions(&self, query: &QuestionQuery) -> Result<(Vec<Question>, i64), AppError>;

    /// Questions linked to one knowledge point, newest first.
    async fn questions_for_knowledge_point(
        &self,
        knowledge_point_id: Uuid,
    ) -> Result<Vec<Question>, AppError>;

    /// Overwrites a question and replaces its knowledge point links.
    async fn update_question(
        &self,
        question: &Question,
        knowledge_point_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn soft_delete_question(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), AppError>;

    /// Live papers that contain the question.
    async fn count_papers_with_question(&self, question_id: Uuid) -> Result<i64, AppError>;

    /// Inserts a paper and all of its entries in one transaction.
    async fn insert_paper(&self, paper: &PaperWithQuestions) -> Result<(), AppError>;

    /// Paper with entries ordered by `question_order`.
    async fn paper_with_questions(
        &self,
        paper_id: Uuid,
    ) -> Result<Option<PaperWithQuestions>, AppError>;

    /// All papers, newest first, without their entries.
    async fn list_papers(&self) -> Result<Vec<Paper>, AppError>;

    /// Overwrites a paper and replaces all of its entries in one transaction.
    async fn replace_paper(&self, paper: &PaperWithQuestions, now: DateTime<Utc>) -> Result<(), AppError>;

    async fn soft_delete_paper(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), AppError>;

    /// Live exams built on the paper.
    async fn count_exams_for_paper(&self, paper_id: Uuid) -> Result<i64, AppError>;

    async fn insert_exam(&self, exam: &Exam) -> Result<(), AppError>;

    async fn find_exam(&self, id: Uuid) -> Result<Option<Exam>, AppError>;

    /// All exams, newest first.
    async fn list_exams(&self) -> Result<Vec<Exam>, AppError>;

    async fn update_exam_status(
        &self,
        id: Uuid,
        status: ExamStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Attempts of one user on one exam, submitted or not.
    async fn count_attempts(&self, exam_id: Uuid, user_id: Uuid) -> Result<i64, AppError>;

    /// The unsubmitted attempt of one user on one exam, if any.
    async fn find_open_attempt(
        &self,
        exam_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ExamAttempt>, AppError>;

    /// Persists an attempt and its answer rows atomically.
    async fn create_attempt(
        &self,
        attempt: &ExamAttempt,
        answers: &[Answer],
    ) -> Result<(), AppError>;

    async fn find_attempt(&self, id: Uuid) -> Result<Option<ExamAttempt>, AppError>;

    /// Attempts of one user with exam titles, newest first.
    async fn list_attempts_for_user(&self, user_id: Uuid) -> Result<Vec<AttemptSummary>, AppError>;

    async fn find_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
    ) -> Result<Option<Answer>, AppError>;

    async fn find_answer_by_id(&self, id: Uuid) -> Result<Option<Answer>, AppError>;

    async fn answers_for_attempt(&self, attempt_id: Uuid) -> Result<Vec<Answer>, AppError>;

    /// Overwrites the answer text (last write wins).
    async fn save_user_answer(
        &self,
        answer_id: Uuid,
        user_answer: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Submits an attempt and stores its auto-grading in one transaction.
    ///
    /// Flips `is_submitted` only if it is still false, runs `grade` over the
    /// attempt's answers and writes the grades together with
    /// `final_total()`. Returns `None` and writes nothing when the attempt
    /// was already submitted. On error nothing is written either.
    async fn submit_and_grade(
        &self,
        attempt_id: Uuid,
        now: DateTime<Utc>,
        grade: &(dyn for<'a> Fn(&'a [Answer]) -> GradingOutcome + Send + Sync),
    ) -> Result<Option<GradingOutcome>, AppError>;

    async fn record_manual_grade(
        &self,
        grade: AnswerGrade,
        teacher_comment: Option<&str>,
        graded_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Marks the attempt graded with the given total.
    async fn complete_grading(
        &self,
        attempt_id: Uuid,
        total_score: i32,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;
}

/// Knowledge points and the question link table.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn find_knowledge_point(&self, id: Uuid) -> Result<Option<KnowledgePoint>, AppError>;

    /// All knowledge points ordered by level, then sort order.
    async fn list_knowledge_points(&self) -> Result<Vec<KnowledgePoint>, AppError>;

    /// Direct children of `parent_id` (roots when `None`), by sort order.
    async fn list_children(&self, parent_id: Option<Uuid>) -> Result<Vec<KnowledgePoint>, AppError>;

    /// Direct children of any of `parent_ids`, by sort order.
    async fn children_of(&self, parent_ids: &[Uuid]) -> Result<Vec<KnowledgePoint>, AppError>;

    async fn max_sort_order(&self, parent_id: Option<Uuid>) -> Result<Option<i32>, AppError>;

    async fn insert_knowledge_point(&self, kp: &KnowledgePoint) -> Result<(), AppError>;

    /// Persists name, description, parent, level and timestamp.
    async fn update_knowledge_point(&self, kp: &KnowledgePoint) -> Result<(), AppError>;

    async fn count_children(&self, id: Uuid) -> Result<i64, AppError>;

    /// Links to questions that are not deleted.
    async fn count_question_links(&self, id: Uuid) -> Result<i64, AppError>;

    async fn soft_delete_knowledge_point(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), AppError>;

    async fn question_exists(&self, question_id: Uuid) -> Result<bool, AppError>;

    /// Idempotent.
    async fn link_question(&self, id: Uuid, question_id: Uuid) -> Result<(), AppError>;

    /// Returns whether a link was removed.
    async fn unlink_question(&self, id: Uuid, question_id: Uuid) -> Result<bool, AppError>;
}
