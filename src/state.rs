// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{
    config::Config,
    repositories::{ExamStore, KnowledgeStore, MemoryStore, PgStore},
    services::{Clock, ExamAttemptEngine, KnowledgeTreeManager, QuestionBank, SystemClock},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub exams: ExamAttemptEngine,
    pub knowledge: KnowledgeTreeManager,
    pub bank: QuestionBank,
}

impl AppState {
    /// Wires every service to the same store and clock.
    pub fn new<S>(store: S, clock: Arc<dyn Clock>, config: Config) -> Self
    where
        S: ExamStore + KnowledgeStore + 'static,
    {
        let store = Arc::new(store);
        let exam_store: Arc<dyn ExamStore> = store.clone();
        let knowledge_store: Arc<dyn KnowledgeStore> = store;

        Self {
            exams: ExamAttemptEngine::new(exam_store.clone(), clock.clone()),
            knowledge: KnowledgeTreeManager::new(knowledge_store.clone(), clock.clone())
                .with_tree_depth(config.tree_depth),
            bank: QuestionBank::new(exam_store, knowledge_store, clock),
            config,
        }
    }

    /// Production wiring: Postgres and the wall clock.
    pub fn postgres(pool: PgPool, config: Config) -> Self {
        Self::new(PgStore::new(pool), Arc::new(SystemClock), config)
    }

    /// Everything in memory; nothing survives a restart.
    pub fn in_memory(clock: Arc<dyn Clock>, config: Config) -> Self {
        Self::new(MemoryStore::new(), clock, config)
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for ExamAttemptEngine {
    fn from_ref(state: &AppState) -> Self {
        state.exams.clone()
    }
}

impl FromRef<AppState> for KnowledgeTreeManager {
    fn from_ref(state: &AppState) -> Self {
        state.knowledge.clone()
    }
}

impl FromRef<AppState> for QuestionBank {
    fn from_ref(state: &AppState) -> Self {
        state.bank.clone()
    }
}
