// src/repositories/memory.rs

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
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
    repositories::{ExamStore, KnowledgeStore},
    services::grading::GradingOutcome,
};

#[derive(Default)]
struct Tables {
    questions: Vec<Question>,
    deleted_questions: HashSet<Uuid>,
    /// (question_id, knowledge_point_id)
    question_links: Vec<(Uuid, Uuid)>,
    papers: Vec<PaperWithQuestions>,
    deleted_papers: HashSet<Uuid>,
    exams: Vec<Exam>,
    attempts: Vec<ExamAttempt>,
    answers: Vec<Answer>,
    knowledge_points: Vec<KnowledgePoint>,
    deleted_knowledge_points: HashSet<Uuid>,
}

impl Tables {
    /// Every knowledge point read goes through here.
    fn live_knowledge_points(&self) -> impl Iterator<Item = &KnowledgePoint> {
        self.knowledge_points
            .iter()
            .filter(|kp| !self.deleted_knowledge_points.contains(&kp.id))
    }

    fn live_questions(&self) -> impl Iterator<Item = &Question> {
        self.questions
            .iter()
            .filter(|q| !self.deleted_questions.contains(&q.id))
    }

    fn live_papers(&self) -> impl Iterator<Item = &PaperWithQuestions> {
        self.papers
            .iter()
            .filter(|p| !self.deleted_papers.contains(&p.paper.id))
    }

    fn is_linked(&self, question_id: Uuid, knowledge_point_id: Uuid) -> bool {
        self.question_links.contains(&(question_id, knowledge_point_id))
    }

    fn attempt_mut(&mut self, id: Uuid) -> Result<&mut ExamAttempt, AppError> {
        self.attempts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound("Exam attempt not found".to_string()))
    }

    fn answer_mut(&mut self, id: Uuid) -> Result<&mut Answer, AppError> {
        self.answers
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound("Answer not found".to_string()))
    }
}

/// In-process store with the same semantics as `PgStore`.
/// Backs the test suite and local demos; all state is lost on drop.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first; among equal timestamps the most recently inserted wins.
fn newest_first<T: Clone>(rows: impl DoubleEndedIterator<Item = T>, key: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut rows: Vec<T> = rows.rev().collect();
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn insert_question(
        &self,
        question: &Question,
        knowledge_point_ids: &[Uuid],
    ) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        t.questions.push(question.clone());
        for kp_id in knowledge_point_ids {
            if !t.question_links.contains(&(question.id, *kp_id)) {
                t.question_links.push((question.id, *kp_id));
            }
        }
        Ok(())
    }

    async fn find_question(&self, id: Uuid) -> Result<Option<Question>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.live_questions().find(|q| q.id == id).cloned())
    }

    async fn question_knowledge_point_ids(&self, question_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.question_links
            .iter()
            .filter(|(q, _)| *q == question_id)
            .map(|(_, kp)| *kp)
            .collect())
    }

    async fn questions_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Question>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.live_questions()
            .filter(|q| ids.contains(&q.id))
            .cloned()
            .collect())
    }

    async fn search_questions(&self, query: &QuestionQuery) -> Result<(Vec<Question>, i64), AppError> {
        let t = self.tables.lock().await;
        let matching = t.live_questions().filter(|q| {
            query.matches(q)
                && query
                    .knowledge_point_id
                    .is_none_or(|kp_id| t.is_linked(q.id, kp_id))
        });
        let matching: Vec<Question> = matching.cloned().collect();
        let matching = newest_first(matching.into_iter(), |q| q.created_at);
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .collect();
        Ok((page, total))
    }

    async fn questions_for_knowledge_point(
        &self,
        knowledge_point_id: Uuid,
    ) -> Result<Vec<Question>, AppError> {
        let t = self.tables.lock().await;
        let linked: Vec<Question> = t
            .live_questions()
            .filter(|q| t.is_linked(q.id, knowledge_point_id))
            .cloned()
            .collect();
        Ok(newest_first(linked.into_iter(), |q| q.created_at))
    }

    async fn update_question(
        &self,
        question: &Question,
        knowledge_point_ids: &[Uuid],
        _now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        if let Some(row) = t.questions.iter_mut().find(|q| q.id == question.id) {
            *row = Question {
                created_at: row.created_at,
                ..question.clone()
            };
        }
        t.question_links.retain(|(q, _)| *q != question.id);
        for kp_id in knowledge_point_ids {
            if !t.is_linked(question.id, *kp_id) {
                t.question_links.push((question.id, *kp_id));
            }
        }
        Ok(())
    }

    async fn soft_delete_question(&self, id: Uuid, _now: DateTime<Utc>) -> Result<(), AppError> {
        self.tables.lock().await.deleted_questions.insert(id);
        Ok(())
    }

    async fn count_papers_with_question(&self, question_id: Uuid) -> Result<i64, AppError> {
        let t = self.tables.lock().await;
        Ok(t.live_papers()
            .filter(|p| p.entry_for(question_id).is_some())
            .count() as i64)
    }

    async fn insert_paper(&self, paper: &PaperWithQuestions) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        let mut paper = paper.clone();
        paper.questions.sort_by_key(|pq| pq.question_order);
        t.papers.push(paper);
        Ok(())
    }

    async fn paper_with_questions(
        &self,
        paper_id: Uuid,
    ) -> Result<Option<PaperWithQuestions>, AppError> {
        let t = self.tables.lock().await;
        let Some(paper) = t.live_papers().find(|p| p.paper.id == paper_id) else {
            return Ok(None);
        };
        let mut paper = paper.clone();
        paper
            .questions
            .retain(|pq| !t.deleted_questions.contains(&pq.question_id));
        Ok(Some(paper))
    }

    async fn list_papers(&self) -> Result<Vec<Paper>, AppError> {
        let t = self.tables.lock().await;
        let papers: Vec<Paper> = t.live_papers().map(|p| p.paper.clone()).collect();
        Ok(newest_first(papers.into_iter(), |p| p.created_at))
    }

    async fn replace_paper(&self, paper: &PaperWithQuestions, _now: DateTime<Utc>) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        if let Some(row) = t.papers.iter_mut().find(|p| p.paper.id == paper.paper.id) {
            let mut paper = paper.clone();
            paper.paper.created_at = row.paper.created_at;
            paper.questions.sort_by_key(|pq| pq.question_order);
            *row = paper;
        }
        Ok(())
    }

    async fn soft_delete_paper(&self, id: Uuid, _now: DateTime<Utc>) -> Result<(), AppError> {
        self.tables.lock().await.deleted_papers.insert(id);
        Ok(())
    }

    async fn count_exams_for_paper(&self, paper_id: Uuid) -> Result<i64, AppError> {
        let t = self.tables.lock().await;
        Ok(t.exams.iter().filter(|e| e.paper_id == paper_id).count() as i64)
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), AppError> {
        self.tables.lock().await.exams.push(exam.clone());
        Ok(())
    }

    async fn find_exam(&self, id: Uuid) -> Result<Option<Exam>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.exams.iter().find(|e| e.id == id).cloned())
    }

    async fn list_exams(&self) -> Result<Vec<Exam>, AppError> {
        let t = self.tables.lock().await;
        Ok(newest_first(t.exams.iter().cloned(), |e| e.created_at))
    }

    async fn update_exam_status(
        &self,
        id: Uuid,
        status: ExamStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        if let Some(exam) = t.exams.iter_mut().find(|e| e.id == id) {
            exam.status = status;
            exam.updated_at = now;
        }
        Ok(())
    }

    async fn count_attempts(&self, exam_id: Uuid, user_id: Uuid) -> Result<i64, AppError> {
        let t = self.tables.lock().await;
        Ok(t.attempts
            .iter()
            .filter(|a| a.exam_id == exam_id && a.user_id == user_id)
            .count() as i64)
    }

    async fn find_open_attempt(
        &self,
        exam_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ExamAttempt>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.attempts
            .iter()
            .find(|a| a.exam_id == exam_id && a.user_id == user_id && !a.is_submitted)
            .cloned())
    }

    async fn create_attempt(
        &self,
        attempt: &ExamAttempt,
        answers: &[Answer],
    ) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        let open_exists = t.attempts.iter().any(|a| {
            a.exam_id == attempt.exam_id && a.user_id == attempt.user_id && !a.is_submitted
        });
        if open_exists {
            return Err(AppError::Conflict(
                "An unsubmitted attempt for this exam already exists".to_string(),
            ));
        }
        t.attempts.push(attempt.clone());
        t.answers.extend(answers.iter().cloned());
        Ok(())
    }

    async fn find_attempt(&self, id: Uuid) -> Result<Option<ExamAttempt>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.attempts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_attempts_for_user(&self, user_id: Uuid) -> Result<Vec<AttemptSummary>, AppError> {
        let t = self.tables.lock().await;
        let rows = t
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter_map(|a| {
                let exam = t.exams.iter().find(|e| e.id == a.exam_id)?;
                Some(AttemptSummary {
                    attempt: a.clone(),
                    exam_title: exam.title.clone(),
                })
            })
            .collect::<Vec<_>>();
        Ok(newest_first(rows.into_iter(), |s| s.attempt.created_at))
    }

    async fn find_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
    ) -> Result<Option<Answer>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.answers
            .iter()
            .find(|a| a.exam_attempt_id == attempt_id && a.question_id == question_id)
            .cloned())
    }

    async fn find_answer_by_id(&self, id: Uuid) -> Result<Option<Answer>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.answers.iter().find(|a| a.id == id).cloned())
    }

    async fn answers_for_attempt(&self, attempt_id: Uuid) -> Result<Vec<Answer>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.answers
            .iter()
            .filter(|a| a.exam_attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn save_user_answer(
        &self,
        answer_id: Uuid,
        user_answer: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        let answer = t.answer_mut(answer_id)?;
        answer.user_answer = Some(user_answer.to_string());
        answer.updated_at = now;
        Ok(())
    }

    async fn submit_and_grade(
        &self,
        attempt_id: Uuid,
        now: DateTime<Utc>,
        grade: &(dyn for<'a> Fn(&'a [Answer]) -> GradingOutcome + Send + Sync),
    ) -> Result<Option<GradingOutcome>, AppError> {
        let mut t = self.tables.lock().await;
        if t.attempt_mut(attempt_id)?.is_submitted {
            return Ok(None);
        }

        let answers: Vec<Answer> = t
            .answers
            .iter()
            .filter(|a| a.exam_attempt_id == attempt_id)
            .cloned()
            .collect();
        let outcome = grade(&answers);

        // Check every write up front so a failure leaves the tables untouched.
        if let Some(stray) = outcome
            .grades
            .iter()
            .find(|g| !answers.iter().any(|a| a.id == g.answer_id))
        {
            return Err(AppError::NotFound(format!(
                "Answer {} does not belong to attempt {}",
                stray.answer_id, attempt_id
            )));
        }

        for g in &outcome.grades {
            let answer = t.answer_mut(g.answer_id)?;
            answer.score = Some(g.score);
            answer.is_correct = Some(g.is_correct);
            answer.updated_at = now;
        }

        let total_score = outcome.final_total();
        let attempt = t.attempt_mut(attempt_id)?;
        attempt.is_submitted = true;
        attempt.submit_time = Some(now);
        attempt.total_score = total_score;
        attempt.is_graded = total_score.is_some();
        attempt.updated_at = now;

        Ok(Some(outcome))
    }

    async fn record_manual_grade(
        &self,
        grade: AnswerGrade,
        teacher_comment: Option<&str>,
        graded_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        let answer = t.answer_mut(grade.answer_id)?;
        answer.score = Some(grade.score);
        answer.is_correct = Some(grade.is_correct);
        answer.teacher_comment = teacher_comment.map(str::to_string);
        answer.graded_by = Some(graded_by);
        answer.updated_at = now;
        Ok(())
    }

    async fn complete_grading(
        &self,
        attempt_id: Uuid,
        total_score: i32,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        let attempt = t.attempt_mut(attempt_id)?;
        attempt.total_score = Some(total_score);
        attempt.is_graded = true;
        attempt.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn find_knowledge_point(&self, id: Uuid) -> Result<Option<KnowledgePoint>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.live_knowledge_points().find(|kp| kp.id == id).cloned())
    }

    async fn list_knowledge_points(&self) -> Result<Vec<KnowledgePoint>, AppError> {
        let t = self.tables.lock().await;
        let mut kps: Vec<KnowledgePoint> = t.live_knowledge_points().cloned().collect();
        kps.sort_by_key(|kp| (kp.level, kp.sort_order));
        Ok(kps)
    }

    async fn list_children(&self, parent_id: Option<Uuid>) -> Result<Vec<KnowledgePoint>, AppError> {
        let t = self.tables.lock().await;
        let mut kps: Vec<KnowledgePoint> = t
            .live_knowledge_points()
            .filter(|kp| kp.parent_id == parent_id)
            .cloned()
            .collect();
        kps.sort_by_key(|kp| kp.sort_order);
        Ok(kps)
    }

    async fn children_of(&self, parent_ids: &[Uuid]) -> Result<Vec<KnowledgePoint>, AppError> {
        let t = self.tables.lock().await;
        let mut kps: Vec<KnowledgePoint> = t
            .live_knowledge_points()
            .filter(|kp| kp.parent_id.is_some_and(|p| parent_ids.contains(&p)))
            .cloned()
            .collect();
        kps.sort_by_key(|kp| kp.sort_order);
        Ok(kps)
    }

    async fn max_sort_order(&self, parent_id: Option<Uuid>) -> Result<Option<i32>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.live_knowledge_points()
            .filter(|kp| kp.parent_id == parent_id)
            .map(|kp| kp.sort_order)
            .max())
    }

    async fn insert_knowledge_point(&self, kp: &KnowledgePoint) -> Result<(), AppError> {
        self.tables.lock().await.knowledge_points.push(kp.clone());
        Ok(())
    }

    async fn update_knowledge_point(&self, kp: &KnowledgePoint) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        if let Some(row) = t.knowledge_points.iter_mut().find(|row| row.id == kp.id) {
            row.name = kp.name.clone();
            row.description = kp.description.clone();
            row.parent_id = kp.parent_id;
            row.level = kp.level;
            row.updated_at = kp.updated_at;
        }
        Ok(())
    }

    async fn count_children(&self, id: Uuid) -> Result<i64, AppError> {
        let t = self.tables.lock().await;
        Ok(t.live_knowledge_points()
            .filter(|kp| kp.parent_id == Some(id))
            .count() as i64)
    }

    async fn count_question_links(&self, id: Uuid) -> Result<i64, AppError> {
        let t = self.tables.lock().await;
        Ok(t.question_links
            .iter()
            .filter(|(q, kp)| *kp == id && !t.deleted_questions.contains(q))
            .count() as i64)
    }

    async fn soft_delete_knowledge_point(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        if let Some(row) = t.knowledge_points.iter_mut().find(|row| row.id == id) {
            row.updated_at = now;
        }
        t.deleted_knowledge_points.insert(id);
        Ok(())
    }

    async fn question_exists(&self, question_id: Uuid) -> Result<bool, AppError> {
        let t = self.tables.lock().await;
        Ok(t.live_questions().any(|q| q.id == question_id))
    }

    async fn link_question(&self, id: Uuid, question_id: Uuid) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        if !t.question_links.contains(&(question_id, id)) {
            t.question_links.push((question_id, id));
        }
        Ok(())
    }

    async fn unlink_question(&self, id: Uuid, question_id: Uuid) -> Result<bool, AppError> {
        let mut t = self.tables.lock().await;
        let before = t.question_links.len();
        t.question_links.retain(|link| *link != (question_id, id));
        Ok(t.question_links.len() != before)
    }
}
