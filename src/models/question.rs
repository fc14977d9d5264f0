// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use uuid::Uuid;
use validator::Validate;

/// Question kinds. Discriminants match the stored integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum QuestionType {
    SingleChoice = 1,
    MultipleChoice = 2,
    TrueFalse = 3,
    FillBlank = 4,
    ShortAnswer = 5,
    Material = 6,
}

impl QuestionType {
    /// Objective questions are graded by string comparison on submit.
    pub fn is_objective(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice | QuestionType::MultipleChoice | QuestionType::TrueFalse
        )
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,

    /// Mapped from the database column 'type' since `type` is a reserved keyword in Rust.
    #[sqlx(rename = "type")]
    pub question_type: QuestionType,

    /// The text content of the question (sanitized HTML).
    pub content: String,

    /// List of options (e.g., ["A. ...", "B. ..."]), empty for subjective questions.
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// The correct answer. Multiple-choice keys are comma separated ("A,C").
    pub correct_answer: String,

    pub explanation: Option<String>,

    /// Default score; a paper may override it per question.
    pub score: i32,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The slice of a question that grading needs.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionKey {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    pub question_type: QuestionType,
    pub correct_answer: String,
}

impl From<&Question> for QuestionKey {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_type: q.question_type,
            correct_answer: q.correct_answer.clone(),
        }
    }
}

/// DTO for sending question to a candidate (excludes answer and explanation).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub content: String,
    pub options: Vec<String>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            question_type: q.question_type,
            content: q.content,
            options: q.options.0,
        }
    }
}

/// A question with the ids of its knowledge points.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub knowledge_point_ids: Vec<Uuid>,
}

/// DTO for creating a new question, also used to replace one wholesale.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
    #[serde(default)]
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 2000))]
    pub correct_answer: String,
    #[validate(length(max = 10000))]
    pub explanation: Option<String>,
    #[validate(range(min = 0, max = 1000))]
    #[serde(default = "default_score")]
    pub score: i32,
    #[serde(default)]
    pub knowledge_point_ids: Vec<Uuid>,
}

fn default_score() -> i32 {
    1
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// Query string of the question search. Every filter is optional.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuestionQuery {
    /// Matched case-insensitively against content and explanation.
    #[validate(length(max = 200))]
    pub keyword: Option<String>,
    #[serde(rename = "type")]
    pub question_type: Option<QuestionType>,
    pub knowledge_point_id: Option<Uuid>,
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: i64,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: i64,
}

impl Default for QuestionQuery {
    fn default() -> Self {
        Self {
            keyword: None,
            question_type: None,
            knowledge_point_id: None,
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl QuestionQuery {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    /// Same predicate as the SQL search, for stores filtering in memory.
    pub fn matches(&self, question: &Question) -> bool {
        if self.question_type.is_some_and(|t| t != question.question_type) {
            return false;
        }
        match self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            None => true,
            Some(keyword) => {
                let keyword = keyword.to_lowercase();
                question.content.to_lowercase().contains(&keyword)
                    || question
                        .explanation
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().contains(&keyword))
            }
        }
    }
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}
