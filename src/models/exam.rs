// src/models/exam.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Stored exam lifecycle state. Advisory: eligibility also depends on the
/// time window and attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ExamStatus {
    Draft = 0,
    Published = 1,
    InProgress = 2,
    Ended = 3,
    Cancelled = 4,
}

impl ExamStatus {
    /// Whether an admin may move an exam from `self` to `next`.
    pub fn can_transition_to(self, next: ExamStatus) -> bool {
        use ExamStatus::*;
        match (self, next) {
            (Draft, Published) => true,
            (Published, InProgress) => true,
            (Published | InProgress, Ended) => true,
            (Draft | Published | InProgress, Cancelled) => true,
            _ => false,
        }
    }
}

/// When correct answers are revealed to candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum AnswerDisplayMode {
    AfterSubmit = 1,
    AfterExamEnd = 2,
    Never = 3,
}

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub paper_id: Uuid,
    pub creator_id: Uuid,
    pub status: ExamStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Allowed answering time in whole minutes.
    pub duration: i32,
    pub max_attempts: i32,
    pub answer_display_mode: AnswerDisplayMode,
    pub allow_pause: bool,
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    pub require_full_screen: bool,
    pub disable_copy_paste: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Exam {
    /// Status as seen at `now`: a published exam whose window has opened
    /// reads as in progress, and one whose end time has passed reads as ended.
    pub fn computed_status(&self, now: DateTime<Utc>) -> ExamStatus {
        match self.status {
            ExamStatus::Published | ExamStatus::InProgress => {
                if self.end_time.is_some_and(|end| end < now) {
                    ExamStatus::Ended
                } else if self.status == ExamStatus::Published
                    && self.start_time.is_some_and(|start| start <= now)
                {
                    ExamStatus::InProgress
                } else {
                    self.status
                }
            }
            other => other,
        }
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time.is_none_or(|start| start <= now)
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_time.is_some_and(|end| end < now)
    }
}

/// Exam as returned to clients, with the status computed at read time.
#[derive(Debug, Clone, Serialize)]
pub struct ExamResponse {
    #[serde(flatten)]
    pub exam: Exam,
    pub computed_status: ExamStatus,
}

/// DTO for creating an exam.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub paper_id: Uuid,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 1440, message = "Duration must be between 1 and 1440 minutes"))]
    pub duration: i32,
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 100, message = "Max attempts must be between 1 and 100"))]
    pub max_attempts: i32,
    #[serde(default = "default_display_mode")]
    pub answer_display_mode: AnswerDisplayMode,
    #[serde(default)]
    pub allow_pause: bool,
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub shuffle_options: bool,
    #[serde(default)]
    pub require_full_screen: bool,
    #[serde(default = "default_true")]
    pub disable_copy_paste: bool,
}

fn default_max_attempts() -> i32 {
    1
}

fn default_display_mode() -> AnswerDisplayMode {
    AnswerDisplayMode::AfterSubmit
}

fn default_true() -> bool {
    true
}

/// DTO for changing an exam's stored status.
#[derive(Debug, Deserialize)]
pub struct ChangeExamStatusRequest {
    pub status: ExamStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn exam(status: ExamStatus, start: Option<i64>, end: Option<i64>) -> Exam {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        Exam {
            id: Uuid::new_v4(),
            title: "Midterm".into(),
            description: None,
            paper_id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            status,
            start_time: start.map(|m| base + Duration::minutes(m)),
            end_time: end.map(|m| base + Duration::minutes(m)),
            duration: 60,
            max_attempts: 1,
            answer_display_mode: AnswerDisplayMode::AfterSubmit,
            allow_pause: false,
            shuffle_questions: false,
            shuffle_options: false,
            require_full_screen: false,
            disable_copy_paste: true,
            created_at: base,
            updated_at: base,
        }
    }

    #[test]
    fn published_exam_reads_in_progress_once_window_opens() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let e = exam(ExamStatus::Published, Some(0), Some(120));
        assert_eq!(e.computed_status(now), ExamStatus::InProgress);
    }

    #[test]
    fn past_end_time_reads_ended() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let e = exam(ExamStatus::InProgress, Some(0), Some(60));
        assert_eq!(e.computed_status(now), ExamStatus::Ended);
    }

    #[test]
    fn unbounded_published_exam_stays_published() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let e = exam(ExamStatus::Published, None, None);
        assert_eq!(e.computed_status(now), ExamStatus::Published);
        assert!(e.has_started(now));
        assert!(!e.has_ended(now));
    }

    #[test]
    fn cancelled_is_terminal() {
        assert!(!ExamStatus::Cancelled.can_transition_to(ExamStatus::Published));
        assert!(!ExamStatus::Ended.can_transition_to(ExamStatus::Cancelled));
        assert!(ExamStatus::InProgress.can_transition_to(ExamStatus::Cancelled));
    }
}
