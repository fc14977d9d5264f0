// src/services/grading.rs

//! Answer comparison and auto-grading of objective questions.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{
    exam_attempt::{Answer, AnswerGrade},
    paper::PaperWithQuestions,
    question::{QuestionKey, QuestionType},
};

/// Result of auto-grading one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradingOutcome {
    /// One entry per objective answer.
    pub grades: Vec<AnswerGrade>,
    /// Sum of the objective scores awarded.
    pub objective_total: i32,
    /// At least one answer needs a human grader.
    pub has_subjective: bool,
}

impl GradingOutcome {
    /// Total to persist: only when nothing is left for manual grading.
    pub fn final_total(&self) -> Option<i32> {
        (!self.has_subjective).then_some(self.objective_total)
    }
}

fn normalize(answer: &str) -> String {
    answer.trim().to_uppercase()
}

/// Comma-separated selection, trimmed and sorted. Duplicates are kept.
fn selection(answer: &str) -> Vec<String> {
    let mut keys: Vec<String> = answer.split(',').map(|k| k.trim().to_string()).collect();
    keys.sort();
    keys
}

/// Compares a non-empty user answer with the answer key.
/// Case and surrounding whitespace never matter; for multiple choice the
/// order of selected keys does not matter either.
pub fn answers_match(question_type: QuestionType, user_answer: &str, correct_answer: &str) -> bool {
    let user = normalize(user_answer);
    let correct = normalize(correct_answer);
    match question_type {
        QuestionType::MultipleChoice => selection(&user) == selection(&correct),
        _ => user == correct,
    }
}

/// Grades one objective answer against the paper-specific score.
pub fn grade_objective(
    question_type: QuestionType,
    user_answer: Option<&str>,
    correct_answer: &str,
    paper_score: i32,
) -> (i32, bool) {
    match user_answer {
        None | Some("") => (0, false),
        Some(answer) => {
            let is_correct = answers_match(question_type, answer, correct_answer);
            (if is_correct { paper_score } else { 0 }, is_correct)
        }
    }
}

/// Auto-grades every objective answer of an attempt.
///
/// The score for a correct answer comes from the paper entry, not from the
/// question's default score. Answers without a paper entry or a question
/// row are skipped.
pub fn grade_attempt(
    answers: &[Answer],
    paper: &PaperWithQuestions,
    questions: &HashMap<Uuid, QuestionKey>,
) -> GradingOutcome {
    let mut outcome = GradingOutcome::default();

    for answer in answers {
        let (Some(entry), Some(question)) = (
            paper.entry_for(answer.question_id),
            questions.get(&answer.question_id),
        ) else {
            continue;
        };

        if !question.question_type.is_objective() {
            outcome.has_subjective = true;
            continue;
        }

        let (score, is_correct) = grade_objective(
            question.question_type,
            answer.user_answer.as_deref(),
            &question.correct_answer,
            entry.score,
        );
        outcome.objective_total += score;
        outcome.grades.push(AnswerGrade {
            answer_id: answer.id,
            score,
            is_correct,
        });
    }

    outcome
}
