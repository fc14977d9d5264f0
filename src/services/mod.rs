// src/services/mod.rs

pub mod clock;
pub mod exam_attempts;
pub mod grading;
pub mod knowledge_tree;
pub mod question_bank;
pub mod shuffle;

pub use clock::{Clock, FixedClock, SystemClock};
pub use exam_attempts::{ExamAttemptEngine, StartOutcome, SubmitOutcome};
pub use knowledge_tree::KnowledgeTreeManager;
pub use question_bank::QuestionBank;
