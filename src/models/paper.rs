// src/models/paper.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Represents the 'papers' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Paper {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Sum of the per-question scores below.
    pub total_score: i32,
    pub duration: i32,
    pub creator_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One (question, order, score-in-this-paper) entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaperQuestion {
    pub paper_id: Uuid,
    pub question_id: Uuid,
    pub question_order: i32,
    pub score: i32,
}

/// A paper with all of its entries, ordered by `question_order`.
#[derive(Debug, Clone, Serialize)]
pub struct PaperWithQuestions {
    #[serde(flatten)]
    pub paper: Paper,
    pub questions: Vec<PaperQuestion>,
}

impl PaperWithQuestions {
    pub fn entry_for(&self, question_id: Uuid) -> Option<&PaperQuestion> {
        self.questions.iter().find(|pq| pq.question_id == question_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaperEntryRequest {
    pub question_id: Uuid,
    pub question_order: i32,
    #[validate(range(min = 0, max = 1000))]
    pub score: i32,
}

/// DTO for creating a paper, also used to replace one wholesale.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaperRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 1440))]
    pub duration: i32,
    #[validate(length(min = 1), nested)]
    pub questions: Vec<PaperEntryRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(score: i32) -> CreatePaperRequest {
        CreatePaperRequest {
            title: "Quiz".into(),
            description: None,
            duration: 30,
            questions: vec![PaperEntryRequest {
                question_id: Uuid::new_v4(),
                question_order: 1,
                score,
            }],
        }
    }

    #[test]
    fn entries_are_validated_with_the_paper() {
        assert!(request(5).validate().is_ok());

        let errors = request(-1).validate().unwrap_err();
        assert!(errors.errors().contains_key("questions"));
    }

    #[test]
    fn paper_needs_at_least_one_entry() {
        let mut req = request(5);
        req.questions.clear();
        assert!(req.validate().is_err());
    }
}
