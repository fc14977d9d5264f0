// src/models/exam_attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::question::PublicQuestion;

/// Represents the 'exam_attempts' table in the database.
/// One user's one pass through an exam.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub user_id: Uuid,
    /// 1-based, sequential per (user, exam).
    pub attempt_number: i32,
    pub start_time: DateTime<Utc>,
    pub submit_time: Option<DateTime<Utc>>,
    /// Null until every answer is graded.
    pub total_score: Option<i32>,
    pub is_submitted: bool,
    pub is_graded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Represents the 'answers' table. Pre-created empty for every paper question.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub exam_attempt_id: Uuid,
    pub question_id: Uuid,
    pub user_answer: Option<String>,
    pub score: Option<i32>,
    pub is_correct: Option<bool>,
    pub teacher_comment: Option<String>,
    pub graded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Answer {
    pub fn empty(exam_attempt_id: Uuid, question_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            exam_attempt_id,
            question_id,
            user_answer: None,
            score: None,
            is_correct: None,
            teacher_comment: None,
            graded_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Score and correctness decided for one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerGrade {
    pub answer_id: Uuid,
    pub score: i32,
    pub is_correct: bool,
}

/// Attempt joined with its exam title.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttemptSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attempt: ExamAttempt,
    pub exam_title: String,
}

/// Attempt with all of its answers, ordered by paper position.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptDetail {
    #[serde(flatten)]
    pub summary: AttemptSummary,
    pub answers: Vec<Answer>,
}

/// One question as a candidate sees it during an attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptQuestion {
    #[serde(flatten)]
    pub question: PublicQuestion,
    pub question_order: i32,
    pub score: i32,
    pub user_answer: Option<String>,
}

/// Question list of an attempt, in the order the candidate should see it.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptPaper {
    pub exam_attempt_id: Uuid,
    pub duration: i32,
    pub questions: Vec<AttemptQuestion>,
}

/// DTO for saving one answer.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub exam_attempt_id: Uuid,
    pub question_id: Uuid,
    #[validate(length(max = 20000))]
    pub user_answer: String,
}

/// DTO for manually grading one answer.
#[derive(Debug, Deserialize, Validate)]
pub struct GradeAnswerRequest {
    #[validate(range(min = 0))]
    pub score: i32,
    #[validate(length(max = 2000))]
    pub teacher_comment: Option<String>,
}
