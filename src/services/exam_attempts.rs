// src/services/exam_attempts.rs

//! Exam Attempt Engine: start -> answer -> submit -> grade.

use std::{collections::HashMap, sync::Arc};

use chrono::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        exam::{CreateExamRequest, Exam, ExamResponse, ExamStatus},
        exam_attempt::{
            Answer, AnswerGrade, AttemptDetail, AttemptPaper, AttemptQuestion, AttemptSummary,
            ExamAttempt, GradeAnswerRequest, SubmitAnswerRequest,
        },
        paper::PaperWithQuestions,
        question::{PublicQuestion, QuestionKey},
        user::Caller,
    },
    repositories::ExamStore,
    services::{
        clock::Clock,
        grading,
        shuffle::{seed_for, shuffle},
    },
    utils::html::clean_html,
};

/// Result of `start_attempt`.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub attempt: AttemptSummary,
    /// An unsubmitted attempt already existed and was returned unchanged.
    pub resumed: bool,
}

impl StartOutcome {
    pub fn message(&self) -> &'static str {
        if self.resumed {
            "Resuming unfinished attempt"
        } else {
            "Exam started"
        }
    }
}

/// Result of `submit_exam`.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub attempt: AttemptSummary,
    /// Subjective answers are waiting for a human grader.
    pub pending_manual_grading: bool,
}

impl SubmitOutcome {
    pub fn message(&self) -> &'static str {
        if self.pending_manual_grading {
            "Exam submitted; objective questions auto-graded, subjective questions pending grading"
        } else {
            "Exam submitted and fully graded"
        }
    }
}

#[derive(Clone)]
pub struct ExamAttemptEngine {
    store: Arc<dyn ExamStore>,
    clock: Arc<dyn Clock>,
}

impl ExamAttemptEngine {
    pub fn new(store: Arc<dyn ExamStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn respond(&self, exam: Exam) -> ExamResponse {
        let computed_status = exam.computed_status(self.clock.now());
        ExamResponse {
            exam,
            computed_status,
        }
    }

    async fn load_exam(&self, id: Uuid) -> Result<Exam, AppError> {
        self.store
            .find_exam(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))
    }

    async fn load_paper(&self, paper_id: Uuid) -> Result<PaperWithQuestions, AppError> {
        self.store
            .paper_with_questions(paper_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Paper not found".to_string()))
    }

    async fn load_attempt(&self, id: Uuid) -> Result<ExamAttempt, AppError> {
        self.store
            .find_attempt(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Exam attempt not found".to_string()))
    }

    /// Loads an attempt and checks that `user_id` owns it and that it is still open.
    async fn load_open_attempt(&self, id: Uuid, user_id: Uuid) -> Result<ExamAttempt, AppError> {
        let attempt = self.load_attempt(id).await?;

        if attempt.user_id != user_id {
            tracing::warn!("User {} tried to act on attempt {} owned by {}", user_id, id, attempt.user_id);
            return Err(AppError::Forbidden(
                "You are not allowed to operate on this exam attempt".to_string(),
            ));
        }

        if attempt.is_submitted {
            return Err(AppError::AlreadySubmitted(
                "Exam attempt has already been submitted".to_string(),
            ));
        }

        Ok(attempt)
    }

    fn summarize(attempt: ExamAttempt, exam: &Exam) -> AttemptSummary {
        AttemptSummary {
            attempt,
            exam_title: exam.title.clone(),
        }
    }

    fn resume(open: ExamAttempt, exam: &Exam) -> StartOutcome {
        tracing::info!("User {} resumed attempt {} of exam {}", open.user_id, open.id, exam.id);
        StartOutcome {
            attempt: Self::summarize(open, exam),
            resumed: true,
        }
    }

    /// Creates a draft exam over an existing paper.
    pub async fn create_exam(
        &self,
        req: CreateExamRequest,
        creator: &Caller,
    ) -> Result<ExamResponse, AppError> {
        creator.require_staff()?;
        req.validate()?;

        if let (Some(start), Some(end)) = (req.start_time, req.end_time) {
            if end <= start {
                return Err(AppError::BadRequest(
                    "End time must be after start time".to_string(),
                ));
            }
        }

        self.load_paper(req.paper_id).await?;

        let now = self.clock.now();
        let exam = Exam {
            id: Uuid::new_v4(),
            title: req.title,
            description: req.description.as_deref().map(clean_html),
            paper_id: req.paper_id,
            creator_id: creator.user_id,
            status: ExamStatus::Draft,
            start_time: req.start_time,
            end_time: req.end_time,
            duration: req.duration,
            max_attempts: req.max_attempts,
            answer_display_mode: req.answer_display_mode,
            allow_pause: req.allow_pause,
            shuffle_questions: req.shuffle_questions,
            shuffle_options: req.shuffle_options,
            require_full_screen: req.require_full_screen,
            disable_copy_paste: req.disable_copy_paste,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_exam(&exam).await?;
        tracing::info!("Exam {} created by {}", exam.id, creator.user_id);

        Ok(self.respond(exam))
    }

    pub async fn get_exam(&self, id: Uuid) -> Result<ExamResponse, AppError> {
        let exam = self.load_exam(id).await?;
        Ok(self.respond(exam))
    }

    /// All exams, newest first.
    pub async fn list_exams(&self) -> Result<Vec<ExamResponse>, AppError> {
        let exams = self.store.list_exams().await?;
        Ok(exams.into_iter().map(|e| self.respond(e)).collect())
    }

    pub async fn change_exam_status(
        &self,
        id: Uuid,
        status: ExamStatus,
        caller: &Caller,
    ) -> Result<ExamResponse, AppError> {
        caller.require_staff()?;
        let mut exam = self.load_exam(id).await?;

        if !exam.status.can_transition_to(status) {
            return Err(AppError::InvalidOperation(format!(
                "Cannot change exam status from {:?} to {:?}",
                exam.status, status
            )));
        }

        let now = self.clock.now();
        self.store.update_exam_status(id, status, now).await?;
        tracing::info!("Exam {} status {:?} -> {:?}", id, exam.status, status);

        exam.status = status;
        exam.updated_at = now;
        Ok(self.respond(exam))
    }

    /// Starts (or resumes) the caller's attempt at an exam.
    ///
    /// Eligibility: exam exists, its computed status is published or in
    /// progress, now is inside the optional window, and the user has attempts
    /// left. An unsubmitted attempt is returned unchanged instead of creating
    /// a new one, including when a concurrent start created it first.
    ///
    /// A missing exam is reported as `NotEligible`, not `NotFound`: callers
    /// see every reason they cannot start as the same 400 class.
    pub async fn start_attempt(&self, exam_id: Uuid, user_id: Uuid) -> Result<StartOutcome, AppError> {
        let now = self.clock.now();

        let exam = self
            .store
            .find_exam(exam_id)
            .await?
            .ok_or_else(|| AppError::NotEligible("Exam not found".to_string()))?;

        match exam.computed_status(now) {
            ExamStatus::Published | ExamStatus::InProgress => {}
            ExamStatus::Ended => {
                return Err(AppError::NotEligible("Exam has ended".to_string()));
            }
            ExamStatus::Draft => {
                return Err(AppError::NotEligible("Exam has not been published".to_string()));
            }
            ExamStatus::Cancelled => {
                return Err(AppError::NotEligible("Exam has been cancelled".to_string()));
            }
        }

        if !exam.has_started(now) {
            return Err(AppError::NotEligible("Exam has not started yet".to_string()));
        }

        if exam.has_ended(now) {
            return Err(AppError::NotEligible("Exam has ended".to_string()));
        }

        if let Some(open) = self.store.find_open_attempt(exam_id, user_id).await? {
            return Ok(Self::resume(open, &exam));
        }

        let attempt_count = self.store.count_attempts(exam_id, user_id).await?;
        if attempt_count >= i64::from(exam.max_attempts) {
            // The counted attempt may be one a concurrent start just opened.
            if let Some(open) = self.store.find_open_attempt(exam_id, user_id).await? {
                return Ok(Self::resume(open, &exam));
            }
            return Err(AppError::NotEligible(format!(
                "Maximum number of attempts ({}) exceeded",
                exam.max_attempts
            )));
        }

        let paper = self.load_paper(exam.paper_id).await?;

        let attempt = ExamAttempt {
            id: Uuid::new_v4(),
            exam_id,
            user_id,
            attempt_number: attempt_count as i32 + 1,
            start_time: now,
            submit_time: None,
            total_score: None,
            is_submitted: false,
            is_graded: false,
            created_at: now,
            updated_at: now,
        };

        let answers: Vec<Answer> = paper
            .questions
            .iter()
            .map(|pq| Answer::empty(attempt.id, pq.question_id, now))
            .collect();

        match self.store.create_attempt(&attempt, &answers).await {
            Ok(()) => {}
            Err(err @ AppError::Conflict(_)) => {
                // Another start for the same user and exam won the race.
                return match self.store.find_open_attempt(exam_id, user_id).await? {
                    Some(open) => Ok(Self::resume(open, &exam)),
                    None => Err(err),
                };
            }
            Err(err) => return Err(err),
        }
        tracing::info!(
            "User {} started attempt #{} ({}) of exam {}",
            user_id,
            attempt.attempt_number,
            attempt.id,
            exam_id
        );

        Ok(StartOutcome {
            attempt: Self::summarize(attempt, &exam),
            resumed: false,
        })
    }

    /// Saves the caller's answer to one question. Last write wins; no scoring here.
    pub async fn submit_answer(&self, req: &SubmitAnswerRequest, user_id: Uuid) -> Result<(), AppError> {
        req.validate()?;
        let attempt = self.load_open_attempt(req.exam_attempt_id, user_id).await?;
        let exam = self.load_exam(attempt.exam_id).await?;

        let now = self.clock.now();
        if now - attempt.start_time > Duration::minutes(i64::from(exam.duration)) {
            return Err(AppError::TimeExpired("Exam time is over".to_string()));
        }

        let answer = self
            .store
            .find_answer(attempt.id, req.question_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Answer record not found".to_string()))?;

        self.store
            .save_user_answer(answer.id, &req.user_answer, now)
            .await?;

        Ok(())
    }

    /// Submits the attempt and auto-grades its objective answers.
    ///
    /// Late submits are accepted. The attempt becomes graded only when no
    /// subjective answer remains; otherwise the total stays unset. The
    /// submit and the grades are stored together, so a failed submit leaves
    /// the attempt open for a retry.
    pub async fn submit_exam(&self, attempt_id: Uuid, user_id: Uuid) -> Result<SubmitOutcome, AppError> {
        let attempt = self.load_open_attempt(attempt_id, user_id).await?;
        let exam = self.load_exam(attempt.exam_id).await?;
        let paper = self.load_paper(exam.paper_id).await?;

        let question_ids: Vec<Uuid> = paper.questions.iter().map(|pq| pq.question_id).collect();
        let questions: HashMap<Uuid, QuestionKey> = self
            .store
            .questions_by_ids(&question_ids)
            .await?
            .iter()
            .map(|q| (q.id, QuestionKey::from(q)))
            .collect();

        let now = self.clock.now();
        let grade = |answers: &[Answer]| grading::grade_attempt(answers, &paper, &questions);
        let outcome = self
            .store
            .submit_and_grade(attempt.id, now, &grade)
            .await?
            .ok_or_else(|| {
                AppError::AlreadySubmitted("Exam attempt has already been submitted".to_string())
            })?;

        tracing::info!(
            "Attempt {} submitted: objective score {}, pending manual grading: {}",
            attempt.id,
            outcome.objective_total,
            outcome.has_subjective
        );

        let attempt = self.load_attempt(attempt.id).await?;
        Ok(SubmitOutcome {
            attempt: Self::summarize(attempt, &exam),
            pending_manual_grading: outcome.has_subjective,
        })
    }

    /// Every attempt of the user, newest first.
    pub async fn user_attempts(&self, user_id: Uuid) -> Result<Vec<AttemptSummary>, AppError> {
        self.store.list_attempts_for_user(user_id).await
    }

    /// Questions of an attempt without answer keys, with the caller's saved
    /// answers. Shuffled per attempt when the exam asks for it.
    pub async fn attempt_paper(&self, attempt_id: Uuid, caller: &Caller) -> Result<AttemptPaper, AppError> {
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.user_id != caller.user_id {
            return Err(AppError::Forbidden(
                "You are not allowed to view this exam attempt".to_string(),
            ));
        }

        let exam = self.load_exam(attempt.exam_id).await?;
        let paper = self.load_paper(exam.paper_id).await?;
        let answers = self.store.answers_for_attempt(attempt.id).await?;

        let ids: Vec<Uuid> = paper.questions.iter().map(|pq| pq.question_id).collect();
        let mut questions: HashMap<Uuid, PublicQuestion> = self
            .store
            .questions_by_ids(&ids)
            .await?
            .into_iter()
            .map(|q| (q.id, PublicQuestion::from(q)))
            .collect();

        let items: Vec<AttemptQuestion> = paper
            .questions
            .iter()
            .filter_map(|pq| {
                let question = questions.remove(&pq.question_id)?;
                let user_answer = answers
                    .iter()
                    .find(|a| a.question_id == pq.question_id)
                    .and_then(|a| a.user_answer.clone());
                Some(AttemptQuestion {
                    question,
                    question_order: pq.question_order,
                    score: pq.score,
                    user_answer,
                })
            })
            .collect();

        let items = if exam.shuffle_questions {
            shuffle(seed_for(attempt.id), items)
        } else {
            items
        };

        Ok(AttemptPaper {
            exam_attempt_id: attempt.id,
            duration: exam.duration,
            questions: items,
        })
    }

    /// Attempt with its answers in paper order. Owner or staff only.
    pub async fn attempt_detail(&self, attempt_id: Uuid, caller: &Caller) -> Result<AttemptDetail, AppError> {
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.user_id != caller.user_id && !caller.role.is_staff() {
            return Err(AppError::Forbidden(
                "You are not allowed to view this exam attempt".to_string(),
            ));
        }

        let exam = self.load_exam(attempt.exam_id).await?;
        let paper = self.load_paper(exam.paper_id).await?;
        let mut answers = self.store.answers_for_attempt(attempt.id).await?;
        answers.sort_by_key(|a| {
            paper
                .entry_for(a.question_id)
                .map_or(i32::MAX, |pq| pq.question_order)
        });

        Ok(AttemptDetail {
            summary: Self::summarize(attempt, &exam),
            answers,
        })
    }

    /// Manually grades one answer of a submitted attempt. Once every answer
    /// on the paper has a score the attempt becomes graded with their sum.
    pub async fn grade_answer(
        &self,
        answer_id: Uuid,
        req: &GradeAnswerRequest,
        grader: &Caller,
    ) -> Result<AttemptSummary, AppError> {
        grader.require_staff()?;
        req.validate()?;

        let answer = self
            .store
            .find_answer_by_id(answer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Answer not found".to_string()))?;

        let attempt = self.load_attempt(answer.exam_attempt_id).await?;
        if !attempt.is_submitted {
            return Err(AppError::InvalidOperation(
                "Cannot grade an attempt that has not been submitted".to_string(),
            ));
        }

        let exam = self.load_exam(attempt.exam_id).await?;
        let paper = self.load_paper(exam.paper_id).await?;
        let entry = paper
            .entry_for(answer.question_id)
            .ok_or_else(|| AppError::NotFound("Question is not part of this paper".to_string()))?;

        if req.score > entry.score {
            return Err(AppError::BadRequest(format!(
                "Score must be between 0 and {}",
                entry.score
            )));
        }

        let now = self.clock.now();
        let comment = req.teacher_comment.as_deref().map(clean_html);
        self.store
            .record_manual_grade(
                AnswerGrade {
                    answer_id,
                    score: req.score,
                    is_correct: req.score == entry.score,
                },
                comment.as_deref(),
                grader.user_id,
                now,
            )
            .await?;
        tracing::info!("Answer {} graded {} by {}", answer_id, req.score, grader.user_id);

        let answers = self.store.answers_for_attempt(attempt.id).await?;
        let on_paper: Vec<&Answer> = answers
            .iter()
            .filter(|a| paper.entry_for(a.question_id).is_some())
            .collect();

        if on_paper.iter().all(|a| a.score.is_some()) {
            let total: i32 = on_paper.iter().filter_map(|a| a.score).sum();
            self.store.complete_grading(attempt.id, total, now).await?;
            tracing::info!("Attempt {} fully graded: {}", attempt.id, total);
        }

        let attempt = self.load_attempt(attempt.id).await?;
        Ok(Self::summarize(attempt, &exam))
    }
}
