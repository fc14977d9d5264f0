// src/services/question_bank.rs

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        paper::{CreatePaperRequest, Paper, PaperQuestion, PaperWithQuestions},
        question::{CreateQuestionRequest, Question, QuestionDetail, QuestionQuery},
        shared::Page,
        user::Caller,
    },
    repositories::{ExamStore, KnowledgeStore},
    services::clock::Clock,
    utils::html::clean_html,
};

/// Questions and papers: the content the exam engine reads from.
#[derive(Clone)]
pub struct QuestionBank {
    exams: Arc<dyn ExamStore>,
    knowledge: Arc<dyn KnowledgeStore>,
    clock: Arc<dyn Clock>,
}

impl QuestionBank {
    pub fn new(
        exams: Arc<dyn ExamStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            exams,
            knowledge,
            clock,
        }
    }

    async fn load_question(&self, id: Uuid) -> Result<Question, AppError> {
        self.exams
            .find_question(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
    }

    /// Checks a question request and turns it into a sanitized row.
    async fn build_question(
        &self,
        req: CreateQuestionRequest,
        id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<Question, AppError> {
        req.validate()?;

        if req.question_type.is_objective() && req.options.is_empty() {
            return Err(AppError::BadRequest(
                "Objective questions need at least one option".to_string(),
            ));
        }

        for kp_id in &req.knowledge_point_ids {
            if self.knowledge.find_knowledge_point(*kp_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Knowledge point {} not found", kp_id)));
            }
        }

        Ok(Question {
            id,
            question_type: req.question_type,
            content: clean_html(&req.content),
            options: Json(req.options.iter().map(|o| clean_html(o)).collect()),
            correct_answer: req.correct_answer.trim().to_string(),
            explanation: req.explanation.as_deref().map(clean_html),
            score: req.score,
            created_at,
        })
    }

    pub async fn create_question(
        &self,
        req: CreateQuestionRequest,
        caller: &Caller,
    ) -> Result<Question, AppError> {
        caller.require_staff()?;
        let kp_ids = req.knowledge_point_ids.clone();
        let question = self
            .build_question(req, Uuid::new_v4(), self.clock.now())
            .await?;

        self.exams.insert_question(&question, &kp_ids).await?;
        tracing::info!("Question {} ({:?}) created by {}", question.id, question.question_type, caller.user_id);

        Ok(question)
    }

    pub async fn get_question(&self, id: Uuid) -> Result<QuestionDetail, AppError> {
        let question = self.load_question(id).await?;
        let knowledge_point_ids = self.exams.question_knowledge_point_ids(id).await?;
        Ok(QuestionDetail {
            question,
            knowledge_point_ids,
        })
    }

    /// Filtered, paged listing, newest first.
    pub async fn search_questions(&self, query: QuestionQuery) -> Result<Page<Question>, AppError> {
        query.validate()?;
        let (items, total_count) = self.exams.search_questions(&query).await?;
        Ok(Page {
            items,
            total_count,
            page: query.page,
            page_size: query.page_size,
        })
    }

    pub async fn questions_by_knowledge_point(
        &self,
        knowledge_point_id: Uuid,
    ) -> Result<Vec<Question>, AppError> {
        if self
            .knowledge
            .find_knowledge_point(knowledge_point_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound("Knowledge point not found".to_string()));
        }
        self.exams
            .questions_for_knowledge_point(knowledge_point_id)
            .await
    }

    /// Replaces every field of a question, knowledge point links included.
    pub async fn update_question(
        &self,
        id: Uuid,
        req: CreateQuestionRequest,
        caller: &Caller,
    ) -> Result<QuestionDetail, AppError> {
        caller.require_staff()?;
        let existing = self.load_question(id).await?;
        let kp_ids = req.knowledge_point_ids.clone();
        let question = self.build_question(req, id, existing.created_at).await?;

        self.exams
            .update_question(&question, &kp_ids, self.clock.now())
            .await?;
        tracing::info!("Question {} updated by {}", id, caller.user_id);

        Ok(QuestionDetail {
            question,
            knowledge_point_ids: kp_ids,
        })
    }

    /// Soft-deletes a question that no paper uses.
    pub async fn delete_question(&self, id: Uuid, caller: &Caller) -> Result<(), AppError> {
        caller.require_staff()?;
        self.load_question(id).await?;

        if self.exams.count_papers_with_question(id).await? > 0 {
            return Err(AppError::Conflict(
                "Question is used by a paper and cannot be deleted".to_string(),
            ));
        }

        self.exams.soft_delete_question(id, self.clock.now()).await?;
        tracing::info!("Question {} deleted by {}", id, caller.user_id);
        Ok(())
    }

    /// Checks a paper request and builds the paper with sorted entries.
    /// The total score is the sum of the entry scores.
    async fn build_paper(
        &self,
        req: CreatePaperRequest,
        paper_id: Uuid,
        creator_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<PaperWithQuestions, AppError> {
        req.validate()?;

        let mut seen = HashSet::new();
        if !req.questions.iter().all(|e| seen.insert(e.question_id)) {
            return Err(AppError::BadRequest(
                "A question can appear only once per paper".to_string(),
            ));
        }

        let ids: Vec<Uuid> = req.questions.iter().map(|e| e.question_id).collect();
        let found: HashSet<Uuid> = self
            .exams
            .questions_by_ids(&ids)
            .await?
            .into_iter()
            .map(|q| q.id)
            .collect();
        if let Some(missing) = ids.iter().find(|id| !found.contains(*id)) {
            return Err(AppError::NotFound(format!("Question {} not found", missing)));
        }

        let mut questions: Vec<PaperQuestion> = req
            .questions
            .iter()
            .map(|e| PaperQuestion {
                paper_id,
                question_id: e.question_id,
                question_order: e.question_order,
                score: e.score,
            })
            .collect();
        questions.sort_by_key(|pq| pq.question_order);

        Ok(PaperWithQuestions {
            paper: Paper {
                id: paper_id,
                title: clean_html(&req.title),
                description: req.description.as_deref().map(clean_html),
                total_score: questions.iter().map(|pq| pq.score).sum(),
                duration: req.duration,
                creator_id,
                created_at,
            },
            questions,
        })
    }

    pub async fn create_paper(
        &self,
        req: CreatePaperRequest,
        caller: &Caller,
    ) -> Result<PaperWithQuestions, AppError> {
        caller.require_staff()?;
        let paper = self
            .build_paper(req, Uuid::new_v4(), caller.user_id, self.clock.now())
            .await?;

        self.exams.insert_paper(&paper).await?;
        tracing::info!(
            "Paper {} created with {} questions, total score {}",
            paper.paper.id,
            paper.questions.len(),
            paper.paper.total_score
        );

        Ok(paper)
    }

    pub async fn get_paper(&self, id: Uuid) -> Result<PaperWithQuestions, AppError> {
        self.exams
            .paper_with_questions(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Paper not found".to_string()))
    }

    /// All papers, newest first.
    pub async fn list_papers(&self) -> Result<Vec<Paper>, AppError> {
        self.exams.list_papers().await
    }

    /// Papers an exam is built on are frozen.
    async fn ensure_unreferenced(&self, paper_id: Uuid, action: &str) -> Result<(), AppError> {
        if self.exams.count_exams_for_paper(paper_id).await? > 0 {
            return Err(AppError::Conflict(format!(
                "Paper is used by an exam and cannot be {}",
                action
            )));
        }
        Ok(())
    }

    /// Replaces a paper's details and entries. Refused once an exam uses it.
    pub async fn update_paper(
        &self,
        id: Uuid,
        req: CreatePaperRequest,
        caller: &Caller,
    ) -> Result<PaperWithQuestions, AppError> {
        caller.require_staff()?;
        let existing = self.get_paper(id).await?;
        self.ensure_unreferenced(id, "changed").await?;

        let paper = self
            .build_paper(req, id, existing.paper.creator_id, existing.paper.created_at)
            .await?;
        self.exams.replace_paper(&paper, self.clock.now()).await?;
        tracing::info!("Paper {} replaced by {}, total score {}", id, caller.user_id, paper.paper.total_score);

        Ok(paper)
    }

    /// Soft-deletes a paper no exam uses.
    pub async fn delete_paper(&self, id: Uuid, caller: &Caller) -> Result<(), AppError> {
        caller.require_staff()?;
        self.get_paper(id).await?;
        self.ensure_unreferenced(id, "deleted").await?;

        self.exams.soft_delete_paper(id, self.clock.now()).await?;
        tracing::info!("Paper {} deleted by {}", id, caller.user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            exam::{AnswerDisplayMode, CreateExamRequest},
            knowledge_point::KnowledgePointRequest,
            paper::PaperEntryRequest,
            question::QuestionType,
            user::Role,
        },
        repositories::MemoryStore,
        services::{ExamAttemptEngine, KnowledgeTreeManager, clock::SystemClock},
    };

    fn bank() -> QuestionBank {
        let store = Arc::new(MemoryStore::new());
        QuestionBank::new(store.clone(), store, Arc::new(SystemClock))
    }

    struct Fixture {
        bank: QuestionBank,
        tree: KnowledgeTreeManager,
        engine: ExamAttemptEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(SystemClock);
        Fixture {
            bank: QuestionBank::new(store.clone(), store.clone(), clock.clone()),
            tree: KnowledgeTreeManager::new(store.clone(), clock.clone()),
            engine: ExamAttemptEngine::new(store, clock),
        }
    }

    async fn knowledge_point(tree: &KnowledgeTreeManager, name: &str) -> Uuid {
        let request = KnowledgePointRequest {
            name: name.into(),
            description: None,
            parent_id: None,
        };
        tree.create(request, &teacher()).await.unwrap().id
    }

    fn paper_request(question_ids: &[Uuid]) -> CreatePaperRequest {
        CreatePaperRequest {
            title: "Quiz".into(),
            description: None,
            duration: 30,
            questions: question_ids
                .iter()
                .enumerate()
                .map(|(i, id)| PaperEntryRequest {
                    question_id: *id,
                    question_order: i as i32 + 1,
                    score: 5,
                })
                .collect(),
        }
    }

    fn teacher() -> Caller {
        Caller::new(Uuid::new_v4(), Role::Teacher)
    }

    fn single_choice() -> CreateQuestionRequest {
        CreateQuestionRequest {
            question_type: QuestionType::SingleChoice,
            content: "2 + 2 = ?".into(),
            options: vec!["A. 4".into(), "B. 5".into()],
            correct_answer: "A".into(),
            explanation: None,
            score: 2,
            knowledge_point_ids: vec![],
        }
    }

    #[tokio::test]
    async fn paper_total_is_sum_of_entry_scores() {
        let bank = bank();
        let q1 = bank.create_question(single_choice(), &teacher()).await.unwrap();
        let q2 = bank.create_question(single_choice(), &teacher()).await.unwrap();

        let paper = bank
            .create_paper(
                CreatePaperRequest {
                    title: "Quiz".into(),
                    description: None,
                    duration: 30,
                    questions: vec![
                        PaperEntryRequest { question_id: q2.id, question_order: 2, score: 7 },
                        PaperEntryRequest { question_id: q1.id, question_order: 1, score: 3 },
                    ],
                },
                &teacher(),
            )
            .await
            .unwrap();

        assert_eq!(paper.paper.total_score, 10);
        assert_eq!(paper.questions[0].question_id, q1.id);

        let loaded = bank.get_paper(paper.paper.id).await.unwrap();
        assert_eq!(loaded.questions.len(), 2);
    }

    #[tokio::test]
    async fn paper_with_unknown_question_is_not_found() {
        let err = bank()
            .create_paper(
                CreatePaperRequest {
                    title: "Quiz".into(),
                    description: None,
                    duration: 30,
                    questions: vec![PaperEntryRequest {
                        question_id: Uuid::new_v4(),
                        question_order: 1,
                        score: 1,
                    }],
                },
                &teacher(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn question_with_unknown_knowledge_point_is_not_found() {
        let mut req = single_choice();
        req.knowledge_point_ids = vec![Uuid::new_v4()];
        let err = bank().create_question(req, &teacher()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn students_cannot_author_questions() {
        let student = Caller::new(Uuid::new_v4(), Role::Student);
        let err = bank().create_question(single_choice(), &student).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn search_filters_by_keyword_type_and_knowledge_point() {
        let f = fixture();
        let algebra = knowledge_point(&f.tree, "Algebra").await;

        let mut linked = single_choice();
        linked.content = "Solve the EQUATION x + 1 = 2".into();
        linked.knowledge_point_ids = vec![algebra];
        let linked = f.bank.create_question(linked, &teacher()).await.unwrap();

        let mut essay = single_choice();
        essay.question_type = QuestionType::ShortAnswer;
        essay.options = vec![];
        essay.explanation = Some("About equations in general".into());
        f.bank.create_question(essay, &teacher()).await.unwrap();
        f.bank.create_question(single_choice(), &teacher()).await.unwrap();

        let by_keyword = f
            .bank
            .search_questions(QuestionQuery {
                keyword: Some("equation".into()),
                ..QuestionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_keyword.total_count, 2);

        let by_type = f
            .bank
            .search_questions(QuestionQuery {
                keyword: Some("equation".into()),
                question_type: Some(QuestionType::SingleChoice),
                ..QuestionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_type.items.len(), 1);
        assert_eq!(by_type.items[0].id, linked.id);

        let by_point = f
            .bank
            .search_questions(QuestionQuery {
                knowledge_point_id: Some(algebra),
                ..QuestionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_point.total_count, 1);

        let second_page = f
            .bank
            .search_questions(QuestionQuery {
                page: 2,
                page_size: 2,
                ..QuestionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(second_page.total_count, 3);
        assert_eq!(second_page.items.len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_fields_and_knowledge_points() {
        let f = fixture();
        let algebra = knowledge_point(&f.tree, "Algebra").await;
        let geometry = knowledge_point(&f.tree, "Geometry").await;

        let mut req = single_choice();
        req.knowledge_point_ids = vec![algebra];
        let question = f.bank.create_question(req, &teacher()).await.unwrap();

        let mut change = single_choice();
        change.content = "3 + 3 = ?".into();
        change.correct_answer = " b ".into();
        change.knowledge_point_ids = vec![geometry];
        let updated = f
            .bank
            .update_question(question.id, change, &teacher())
            .await
            .unwrap();
        assert_eq!(updated.question.correct_answer, "b");
        assert_eq!(updated.question.created_at, question.created_at);

        let loaded = f.bank.get_question(question.id).await.unwrap();
        assert_eq!(loaded.question.content, "3 + 3 = ?");
        assert_eq!(loaded.knowledge_point_ids, vec![geometry]);

        assert!(f.bank.questions_by_knowledge_point(algebra).await.unwrap().is_empty());
        let tagged = f.bank.questions_by_knowledge_point(geometry).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, question.id);
    }

    #[tokio::test]
    async fn questions_on_a_paper_cannot_be_deleted() {
        let f = fixture();
        let on_paper = f.bank.create_question(single_choice(), &teacher()).await.unwrap();
        f.bank
            .create_paper(paper_request(&[on_paper.id]), &teacher())
            .await
            .unwrap();

        let err = f.bank.delete_question(on_paper.id, &teacher()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleted_question_disappears_and_frees_its_knowledge_point() {
        let f = fixture();
        let algebra = knowledge_point(&f.tree, "Algebra").await;
        let mut req = single_choice();
        req.knowledge_point_ids = vec![algebra];
        let question = f.bank.create_question(req, &teacher()).await.unwrap();

        f.bank.delete_question(question.id, &teacher()).await.unwrap();

        assert!(matches!(
            f.bank.get_question(question.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(f.bank.questions_by_knowledge_point(algebra).await.unwrap().is_empty());
        assert_eq!(f.bank.search_questions(QuestionQuery::default()).await.unwrap().total_count, 0);

        let admin = Caller::new(Uuid::new_v4(), Role::Admin);
        f.tree.delete(algebra, &admin).await.unwrap();
    }

    #[tokio::test]
    async fn paper_update_replaces_entries_and_recomputes_total() {
        let f = fixture();
        let q1 = f.bank.create_question(single_choice(), &teacher()).await.unwrap();
        let q2 = f.bank.create_question(single_choice(), &teacher()).await.unwrap();
        let paper = f
            .bank
            .create_paper(paper_request(&[q1.id]), &teacher())
            .await
            .unwrap();

        let updated = f
            .bank
            .update_paper(paper.paper.id, paper_request(&[q2.id, q1.id]), &teacher())
            .await
            .unwrap();
        assert_eq!(updated.paper.total_score, 10);
        assert_eq!(updated.paper.creator_id, paper.paper.creator_id);

        let loaded = f.bank.get_paper(paper.paper.id).await.unwrap();
        let order: Vec<Uuid> = loaded.questions.iter().map(|pq| pq.question_id).collect();
        assert_eq!(order, vec![q2.id, q1.id]);
    }

    #[tokio::test]
    async fn papers_used_by_an_exam_are_frozen() {
        let f = fixture();
        let q = f.bank.create_question(single_choice(), &teacher()).await.unwrap();
        let used = f.bank.create_paper(paper_request(&[q.id]), &teacher()).await.unwrap();
        let unused = f.bank.create_paper(paper_request(&[q.id]), &teacher()).await.unwrap();

        f.engine
            .create_exam(
                CreateExamRequest {
                    title: "Final".into(),
                    description: None,
                    paper_id: used.paper.id,
                    start_time: None,
                    end_time: None,
                    duration: 30,
                    max_attempts: 1,
                    answer_display_mode: AnswerDisplayMode::AfterSubmit,
                    allow_pause: false,
                    shuffle_questions: false,
                    shuffle_options: false,
                    require_full_screen: false,
                    disable_copy_paste: true,
                },
                &teacher(),
            )
            .await
            .unwrap();

        let err = f.bank.delete_paper(used.paper.id, &teacher()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = f
            .bank
            .update_paper(used.paper.id, paper_request(&[q.id]), &teacher())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        f.bank.delete_paper(unused.paper.id, &teacher()).await.unwrap();
        assert!(matches!(
            f.bank.get_paper(unused.paper.id).await,
            Err(AppError::NotFound(_))
        ));
        let listed: Vec<Uuid> = f.bank.list_papers().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(listed, vec![used.paper.id]);
    }
}
