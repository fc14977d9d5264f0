// src/repositories/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        exam::{Exam, ExamStatus},
        exam_attempt::{Answer, AnswerGrade, AttemptSummary, ExamAttempt},
        knowledge_point::KnowledgePoint,
        paper::{Paper, PaperQuestion, PaperWithQuestions},
        question::{Question, QuestionQuery},
    },
    repositories::{ExamStore, KnowledgeStore},
    services::grading::GradingOutcome,
};

const QUESTION_COLUMNS: &str =
    "id, type, content, options, correct_answer, explanation, score, created_at";

const PAPER_COLUMNS: &str = "id, title, description, total_score, duration, creator_id, created_at";

const EXAM_COLUMNS: &str = "\
    id, title, description, paper_id, creator_id, status, start_time, end_time, duration, \
    max_attempts, answer_display_mode, allow_pause, shuffle_questions, shuffle_options, \
    require_full_screen, disable_copy_paste, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "\
    id, exam_id, user_id, attempt_number, start_time, submit_time, total_score, \
    is_submitted, is_graded, created_at, updated_at";

const ANSWER_COLUMNS: &str = "\
    id, exam_attempt_id, question_id, user_answer, score, is_correct, teacher_comment, \
    graded_by, created_at, updated_at";

const KNOWLEDGE_POINT_COLUMNS: &str =
    "id, name, description, parent_id, level, sort_order, created_at, updated_at";

/// The single entry point for reads of a soft-deletable table.
/// Callers append further predicates with `AND`.
fn live(table: &str, columns: &str) -> String {
    format!("SELECT {columns} FROM {table} WHERE is_deleted = FALSE")
}

/// Appends the search filters shared by the page query and the count query.
fn push_question_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &QuestionQuery) {
    if let Some(keyword) = query.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        let pattern = format!("%{keyword}%");
        builder
            .push(" AND (content ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR explanation ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(question_type) = query.question_type {
        builder.push(" AND type = ").push_bind(question_type);
    }
    if let Some(kp_id) = query.knowledge_point_id {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM question_knowledge_points qkp \
                 WHERE qkp.question_id = questions.id AND qkp.knowledge_point_id = ",
            )
            .push_bind(kp_id)
            .push(")");
    }
}

/// Inserts paper entries with one multi-row statement.
async fn insert_paper_entries(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    entries: &[PaperQuestion],
) -> Result<(), AppError> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO paper_questions (paper_id, question_id, question_order, score) ",
    );
    builder.push_values(entries, |mut b, pq| {
        b.push_bind(pq.paper_id)
            .push_bind(pq.question_id)
            .push_bind(pq.question_order)
            .push_bind(pq.score);
    });
    builder.build().execute(&mut **tx).await?;
    Ok(())
}

/// Postgres-backed implementation of both store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamStore for PgStore {
    async fn insert_question(
        &self,
        question: &Question,
        knowledge_point_ids: &[Uuid],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO questions (id, type, content, options, correct_answer, explanation, score, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)",
        )
        .bind(question.id)
        .bind(question.question_type)
        .bind(&question.content)
        .bind(question.options.clone())
        .bind(&question.correct_answer)
        .bind(&question.explanation)
        .bind(question.score)
        .bind(question.created_at)
        .execute(&mut *tx)
        .await?;

        for kp_id in knowledge_point_ids {
            sqlx::query(
                "INSERT INTO question_knowledge_points (question_id, knowledge_point_id)
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(question.id)
            .bind(kp_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_question(&self, id: Uuid) -> Result<Option<Question>, AppError> {
        let question = sqlx::query_as::<_, Question>(&format!(
            "{} AND id = $1",
            live("questions", QUESTION_COLUMNS)
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(question)
    }

    async fn question_knowledge_point_ids(&self, question_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar(
            "SELECT knowledge_point_id FROM question_knowledge_points WHERE question_id = $1",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn questions_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Question>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let questions = sqlx::query_as::<_, Question>(&format!(
            "{} AND id = ANY($1)",
            live("questions", QUESTION_COLUMNS)
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn search_questions(&self, query: &QuestionQuery) -> Result<(Vec<Question>, i64), AppError> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM questions WHERE is_deleted = FALSE",
        );
        push_question_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut page = QueryBuilder::<Postgres>::new(live("questions", QUESTION_COLUMNS));
        push_question_filters(&mut page, query);
        page.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(query.page_size)
            .push(" OFFSET ")
            .push_bind(query.offset());
        let questions = page.build_query_as::<Question>().fetch_all(&self.pool).await?;

        Ok((questions, total))
    }

    async fn questions_for_knowledge_point(
        &self,
        knowledge_point_id: Uuid,
    ) -> Result<Vec<Question>, AppError> {
        let questions = sqlx::query_as::<_, Question>(&format!(
            "{} AND id IN (SELECT question_id FROM question_knowledge_points WHERE knowledge_point_id = $1)
             ORDER BY created_at DESC",
            live("questions", QUESTION_COLUMNS)
        ))
        .bind(knowledge_point_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn update_question(
        &self,
        question: &Question,
        knowledge_point_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE questions
             SET type = $1, content = $2, options = $3, correct_answer = $4, explanation = $5,
                 score = $6, updated_at = $7
             WHERE id = $8 AND is_deleted = FALSE",
        )
        .bind(question.question_type)
        .bind(&question.content)
        .bind(question.options.clone())
        .bind(&question.correct_answer)
        .bind(&question.explanation)
        .bind(question.score)
        .bind(now)
        .bind(question.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM question_knowledge_points WHERE question_id = $1")
            .bind(question.id)
            .execute(&mut *tx)
            .await?;

        for kp_id in knowledge_point_ids {
            sqlx::query(
                "INSERT INTO question_knowledge_points (question_id, knowledge_point_id)
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(question.id)
            .bind(kp_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn soft_delete_question(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE questions SET is_deleted = TRUE, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_papers_with_question(&self, question_id: Uuid) -> Result<i64, AppError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM paper_questions pq
             JOIN papers p ON p.id = pq.paper_id AND p.is_deleted = FALSE
             WHERE pq.question_id = $1",
        )
        .bind(question_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_paper(&self, paper: &PaperWithQuestions) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let p = &paper.paper;

        sqlx::query(
            "INSERT INTO papers (id, title, description, total_score, duration, creator_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)",
        )
        .bind(p.id)
        .bind(&p.title)
        .bind(&p.description)
        .bind(p.total_score)
        .bind(p.duration)
        .bind(p.creator_id)
        .bind(p.created_at)
        .execute(&mut *tx)
        .await?;

        insert_paper_entries(&mut tx, &paper.questions).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn paper_with_questions(
        &self,
        paper_id: Uuid,
    ) -> Result<Option<PaperWithQuestions>, AppError> {
        let paper = sqlx::query_as::<_, Paper>(&format!(
            "{} AND id = $1",
            live("papers", PAPER_COLUMNS)
        ))
        .bind(paper_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(paper) = paper else {
            return Ok(None);
        };

        let questions = sqlx::query_as::<_, PaperQuestion>(
            "SELECT pq.paper_id, pq.question_id, pq.question_order, pq.score
             FROM paper_questions pq
             JOIN questions q ON q.id = pq.question_id AND q.is_deleted = FALSE
             WHERE pq.paper_id = $1
             ORDER BY pq.question_order",
        )
        .bind(paper_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(PaperWithQuestions { paper, questions }))
    }

    async fn list_papers(&self) -> Result<Vec<Paper>, AppError> {
        let papers = sqlx::query_as::<_, Paper>(&format!(
            "{} ORDER BY created_at DESC",
            live("papers", PAPER_COLUMNS)
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(papers)
    }

    async fn replace_paper(&self, paper: &PaperWithQuestions, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let p = &paper.paper;

        sqlx::query(
            "UPDATE papers
             SET title = $1, description = $2, total_score = $3, duration = $4, updated_at = $5
             WHERE id = $6 AND is_deleted = FALSE",
        )
        .bind(&p.title)
        .bind(&p.description)
        .bind(p.total_score)
        .bind(p.duration)
        .bind(now)
        .bind(p.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM paper_questions WHERE paper_id = $1")
            .bind(p.id)
            .execute(&mut *tx)
            .await?;

        insert_paper_entries(&mut tx, &paper.questions).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn soft_delete_paper(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE papers SET is_deleted = TRUE, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_exams_for_paper(&self, paper_id: Uuid) -> Result<i64, AppError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM exams WHERE is_deleted = FALSE AND paper_id = $1",
        )
        .bind(paper_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO exams ({EXAM_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
        ))
        .bind(exam.id)
        .bind(&exam.title)
        .bind(&exam.description)
        .bind(exam.paper_id)
        .bind(exam.creator_id)
        .bind(exam.status)
        .bind(exam.start_time)
        .bind(exam.end_time)
        .bind(exam.duration)
        .bind(exam.max_attempts)
        .bind(exam.answer_display_mode)
        .bind(exam.allow_pause)
        .bind(exam.shuffle_questions)
        .bind(exam.shuffle_options)
        .bind(exam.require_full_screen)
        .bind(exam.disable_copy_paste)
        .bind(exam.created_at)
        .bind(exam.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_exam(&self, id: Uuid) -> Result<Option<Exam>, AppError> {
        let exam = sqlx::query_as::<_, Exam>(&format!("{} AND id = $1", live("exams", EXAM_COLUMNS)))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(exam)
    }

    async fn list_exams(&self) -> Result<Vec<Exam>, AppError> {
        let exams = sqlx::query_as::<_, Exam>(&format!(
            "{} ORDER BY created_at DESC",
            live("exams", EXAM_COLUMNS)
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(exams)
    }

    async fn update_exam_status(
        &self,
        id: Uuid,
        status: ExamStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE exams SET status = $1, updated_at = $2 WHERE id = $3 AND is_deleted = FALSE",
        )
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_attempts(&self, exam_id: Uuid, user_id: Uuid) -> Result<i64, AppError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM exam_attempts
             WHERE is_deleted = FALSE AND exam_id = $1 AND user_id = $2",
        )
        .bind(exam_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn find_open_attempt(
        &self,
        exam_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ExamAttempt>, AppError> {
        let attempt = sqlx::query_as::<_, ExamAttempt>(&format!(
            "{} AND exam_id = $1 AND user_id = $2 AND is_submitted = FALSE",
            live("exam_attempts", ATTEMPT_COLUMNS)
        ))
        .bind(exam_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn create_attempt(
        &self,
        attempt: &ExamAttempt,
        answers: &[Answer],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO exam_attempts ({ATTEMPT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(attempt.id)
        .bind(attempt.exam_id)
        .bind(attempt.user_id)
        .bind(attempt.attempt_number)
        .bind(attempt.start_time)
        .bind(attempt.submit_time)
        .bind(attempt.total_score)
        .bind(attempt.is_submitted)
        .bind(attempt.is_graded)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return AppError::Conflict(
                        "An unsubmitted attempt for this exam already exists".to_string(),
                    );
                }
            }
            AppError::from(e)
        })?;

        if !answers.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO answers (id, exam_attempt_id, question_id, created_at, updated_at) ",
            );
            builder.push_values(answers, |mut b, a| {
                b.push_bind(a.id)
                    .push_bind(a.exam_attempt_id)
                    .push_bind(a.question_id)
                    .push_bind(a.created_at)
                    .push_bind(a.updated_at);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_attempt(&self, id: Uuid) -> Result<Option<ExamAttempt>, AppError> {
        let attempt = sqlx::query_as::<_, ExamAttempt>(&format!(
            "{} AND id = $1",
            live("exam_attempts", ATTEMPT_COLUMNS)
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn list_attempts_for_user(&self, user_id: Uuid) -> Result<Vec<AttemptSummary>, AppError> {
        let attempts = sqlx::query_as::<_, AttemptSummary>(
            "SELECT a.id, a.exam_id, a.user_id, a.attempt_number, a.start_time, a.submit_time,
                    a.total_score, a.is_submitted, a.is_graded, a.created_at, a.updated_at,
                    e.title AS exam_title
             FROM exam_attempts a
             JOIN exams e ON e.id = a.exam_id
             WHERE a.is_deleted = FALSE AND a.user_id = $1
             ORDER BY a.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn find_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
    ) -> Result<Option<Answer>, AppError> {
        let answer = sqlx::query_as::<_, Answer>(&format!(
            "{} AND exam_attempt_id = $1 AND question_id = $2",
            live("answers", ANSWER_COLUMNS)
        ))
        .bind(attempt_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(answer)
    }

    async fn find_answer_by_id(&self, id: Uuid) -> Result<Option<Answer>, AppError> {
        let answer = sqlx::query_as::<_, Answer>(&format!(
            "{} AND id = $1",
            live("answers", ANSWER_COLUMNS)
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(answer)
    }

    async fn answers_for_attempt(&self, attempt_id: Uuid) -> Result<Vec<Answer>, AppError> {
        let answers = sqlx::query_as::<_, Answer>(&format!(
            "{} AND exam_attempt_id = $1 ORDER BY created_at, id",
            live("answers", ANSWER_COLUMNS)
        ))
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    async fn save_user_answer(
        &self,
        answer_id: Uuid,
        user_answer: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE answers SET user_answer = $1, updated_at = $2 WHERE id = $3")
            .bind(user_answer)
            .bind(now)
            .bind(answer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn submit_and_grade(
        &self,
        attempt_id: Uuid,
        now: DateTime<Utc>,
        grade: &(dyn for<'a> Fn(&'a [Answer]) -> GradingOutcome + Send + Sync),
    ) -> Result<Option<GradingOutcome>, AppError> {
        let mut tx = self.pool.begin().await?;

        // The conditional flip also locks the attempt row until commit.
        let flipped = sqlx::query(
            "UPDATE exam_attempts
             SET is_submitted = TRUE, submit_time = $1, updated_at = $1
             WHERE id = $2 AND is_submitted = FALSE AND is_deleted = FALSE",
        )
        .bind(now)
        .bind(attempt_id)
        .execute(&mut *tx)
        .await?;
        if flipped.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let answers = sqlx::query_as::<_, Answer>(&format!(
            "{} AND exam_attempt_id = $1 ORDER BY created_at, id",
            live("answers", ANSWER_COLUMNS)
        ))
        .bind(attempt_id)
        .fetch_all(&mut *tx)
        .await?;
        let outcome = grade(&answers);

        for g in &outcome.grades {
            let updated = sqlx::query(
                "UPDATE answers SET score = $1, is_correct = $2, updated_at = $3
                 WHERE id = $4 AND exam_attempt_id = $5",
            )
            .bind(g.score)
            .bind(g.is_correct)
            .bind(now)
            .bind(g.answer_id)
            .bind(attempt_id)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                return Err(AppError::NotFound(format!(
                    "Answer {} does not belong to attempt {}",
                    g.answer_id, attempt_id
                )));
            }
        }

        let total_score = outcome.final_total();
        sqlx::query(
            "UPDATE exam_attempts SET total_score = $1, is_graded = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(total_score)
        .bind(total_score.is_some())
        .bind(now)
        .bind(attempt_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(outcome))
    }

    async fn record_manual_grade(
        &self,
        grade: AnswerGrade,
        teacher_comment: Option<&str>,
        graded_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE answers
             SET score = $1, is_correct = $2, teacher_comment = $3, graded_by = $4, updated_at = $5
             WHERE id = $6",
        )
        .bind(grade.score)
        .bind(grade.is_correct)
        .bind(teacher_comment)
        .bind(graded_by)
        .bind(now)
        .bind(grade.answer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_grading(
        &self,
        attempt_id: Uuid,
        total_score: i32,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE exam_attempts SET total_score = $1, is_graded = TRUE, updated_at = $2 WHERE id = $3",
        )
        .bind(total_score)
        .bind(now)
        .bind(attempt_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl KnowledgeStore for PgStore {
    async fn find_knowledge_point(&self, id: Uuid) -> Result<Option<KnowledgePoint>, AppError> {
        let kp = sqlx::query_as::<_, KnowledgePoint>(&format!(
            "{} AND id = $1",
            live("knowledge_points", KNOWLEDGE_POINT_COLUMNS)
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(kp)
    }

    async fn list_knowledge_points(&self) -> Result<Vec<KnowledgePoint>, AppError> {
        let kps = sqlx::query_as::<_, KnowledgePoint>(&format!(
            "{} ORDER BY level, sort_order",
            live("knowledge_points", KNOWLEDGE_POINT_COLUMNS)
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(kps)
    }

    async fn list_children(&self, parent_id: Option<Uuid>) -> Result<Vec<KnowledgePoint>, AppError> {
        let kps = sqlx::query_as::<_, KnowledgePoint>(&format!(
            "{} AND parent_id IS NOT DISTINCT FROM $1 ORDER BY sort_order",
            live("knowledge_points", KNOWLEDGE_POINT_COLUMNS)
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(kps)
    }

    async fn children_of(&self, parent_ids: &[Uuid]) -> Result<Vec<KnowledgePoint>, AppError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let kps = sqlx::query_as::<_, KnowledgePoint>(&format!(
            "{} AND parent_id = ANY($1) ORDER BY sort_order",
            live("knowledge_points", KNOWLEDGE_POINT_COLUMNS)
        ))
        .bind(parent_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(kps)
    }

    async fn max_sort_order(&self, parent_id: Option<Uuid>) -> Result<Option<i32>, AppError> {
        let max = sqlx::query_scalar(
            "SELECT MAX(sort_order) FROM knowledge_points
             WHERE is_deleted = FALSE AND parent_id IS NOT DISTINCT FROM $1",
        )
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(max)
    }

    async fn insert_knowledge_point(&self, kp: &KnowledgePoint) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO knowledge_points ({KNOWLEDGE_POINT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(kp.id)
        .bind(&kp.name)
        .bind(&kp.description)
        .bind(kp.parent_id)
        .bind(kp.level)
        .bind(kp.sort_order)
        .bind(kp.created_at)
        .bind(kp.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_knowledge_point(&self, kp: &KnowledgePoint) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE knowledge_points
             SET name = $1, description = $2, parent_id = $3, level = $4, updated_at = $5
             WHERE id = $6 AND is_deleted = FALSE",
        )
        .bind(&kp.name)
        .bind(&kp.description)
        .bind(kp.parent_id)
        .bind(kp.level)
        .bind(kp.updated_at)
        .bind(kp.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_children(&self, id: Uuid) -> Result<i64, AppError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM knowledge_points WHERE is_deleted = FALSE AND parent_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_question_links(&self, id: Uuid) -> Result<i64, AppError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM question_knowledge_points qkp
             JOIN questions q ON q.id = qkp.question_id AND q.is_deleted = FALSE
             WHERE qkp.knowledge_point_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn soft_delete_knowledge_point(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE knowledge_points SET is_deleted = TRUE, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn question_exists(&self, question_id: Uuid) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM questions WHERE is_deleted = FALSE AND id = $1)",
        )
        .bind(question_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn link_question(&self, id: Uuid, question_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO question_knowledge_points (question_id, knowledge_point_id)
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(question_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unlink_question(&self, id: Uuid, question_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM question_knowledge_points WHERE question_id = $1 AND knowledge_point_id = $2",
        )
        .bind(question_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
